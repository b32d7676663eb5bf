//! PCM decoding and the fade-in envelope.

use std::io::Cursor;

use crate::error::SpeechError;

/// Decode a synthesis body into mono i16 samples and their sample rate.
///
/// A body starting with `RIFF` is parsed as WAV and must be mono 16-bit
/// integer PCM; its header rate wins over `assumed_rate`. Anything else is
/// raw little-endian i16 at `assumed_rate`.
pub fn decode_body(bytes: &[u8], assumed_rate: u32) -> Result<(Vec<i16>, u32), SpeechError> {
    if bytes.starts_with(b"RIFF") {
        decode_wav(bytes)
    } else {
        decode_raw_i16_le(bytes).map(|samples| (samples, assumed_rate))
    }
}

/// Raw little-endian i16 samples. An odd byte count means the body is not
/// 16-bit PCM.
pub fn decode_raw_i16_le(bytes: &[u8]) -> Result<Vec<i16>, SpeechError> {
    if bytes.len() % 2 != 0 {
        return Err(SpeechError::Decode(format!(
            "body of {} bytes is not 16-bit PCM",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect())
}

fn decode_wav(bytes: &[u8]) -> Result<(Vec<i16>, u32), SpeechError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| SpeechError::Decode(format!("invalid WAV: {e}")))?;
    let spec = reader.spec();

    if spec.channels != 1 {
        return Err(SpeechError::Decode(format!(
            "expected mono audio, got {} channels",
            spec.channels
        )));
    }
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(SpeechError::Decode(format!(
            "expected 16-bit integer PCM, got {} bits {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }

    let samples = reader
        .into_samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SpeechError::Decode(format!("truncated WAV data: {e}")))?;
    Ok((samples, spec.sample_rate))
}

/// Scale the first `fade_len` samples by a linear ramp from 0 to 1.
///
/// Sample `i` is multiplied by `i / (fade_len - 1)`, so the first sample is
/// silenced and the last faded sample is untouched. Clips no longer than
/// the window are left alone.
pub fn apply_fade_in(samples: &mut [i16], fade_len: usize) {
    if fade_len == 0 || samples.len() <= fade_len {
        return;
    }
    let denom = fade_len.saturating_sub(1).max(1) as f64;
    for (i, sample) in samples[..fade_len].iter_mut().enumerate() {
        let gain = i as f64 / denom;
        *sample = (*sample as f64 * gain) as i16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(channels: u16, bits: u16, rate: u32, samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: bits,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                if bits == 16 {
                    writer.write_sample(s).unwrap();
                } else {
                    writer.write_sample(s as i32).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_raw_little_endian() {
        let bytes = [0x01, 0x00, 0xff, 0xff, 0x00, 0x80];
        assert_eq!(decode_raw_i16_le(&bytes).unwrap(), vec![1, -1, i16::MIN]);
    }

    #[test]
    fn test_raw_odd_length_is_decode_error() {
        let err = decode_raw_i16_le(&[0, 1, 2]).unwrap_err();
        assert!(matches!(err, SpeechError::Decode(_)));
    }

    #[test]
    fn test_wav_header_rate_wins() {
        let bytes = wav_bytes(1, 16, 24_000, &[5, -5, 7]);
        let (samples, rate) = decode_body(&bytes, 44_100).unwrap();
        assert_eq!(samples, vec![5, -5, 7]);
        assert_eq!(rate, 24_000);
    }

    #[test]
    fn test_wav_stereo_rejected() {
        let bytes = wav_bytes(2, 16, 44_100, &[1, 2, 3, 4]);
        assert!(matches!(
            decode_body(&bytes, 44_100),
            Err(SpeechError::Decode(_))
        ));
    }

    #[test]
    fn test_wav_24_bit_rejected() {
        let bytes = wav_bytes(1, 24, 44_100, &[1, 2]);
        assert!(matches!(
            decode_body(&bytes, 44_100),
            Err(SpeechError::Decode(_))
        ));
    }

    #[test]
    fn test_fade_in_ramp() {
        let mut samples = vec![10_000i16; 1000];
        apply_fade_in(&mut samples, 441);

        assert_eq!(samples[0], 0);
        assert_eq!(samples[440], 10_000);
        let expected_mid = (10_000.0 * 220.0 / 440.0) as i16;
        assert_eq!(samples[220], expected_mid);
        for pair in samples[..441].windows(2) {
            assert!(pair[0] <= pair[1], "ramp must not decrease");
        }
        assert!(samples[441..].iter().all(|&s| s == 10_000));
    }

    #[test]
    fn test_fade_in_preserves_sign() {
        let mut samples = vec![-20_000i16; 500];
        apply_fade_in(&mut samples, 441);
        assert_eq!(samples[0], 0);
        assert!(samples[1..441].iter().all(|&s| s <= 0));
        assert_eq!(samples[440], -20_000);
    }

    #[test]
    fn test_fade_in_skips_short_clip() {
        let mut samples = vec![1234i16; 441];
        apply_fade_in(&mut samples, 441);
        assert!(samples.iter().all(|&s| s == 1234));
    }
}
