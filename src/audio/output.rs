//! Audio output devices.
//!
//! The playback engine only needs a blocking "write this chunk" primitive.
//! [`RodioBackend`] provides it on top of rodio/cpal: chunks go into a
//! small ring buffer that a rodio [`Source`] drains from the mixer thread,
//! and `write` blocks while the ring is full.

use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use tracing::{debug, info, warn};

use super::ring_buffer::{playback_ring_buffer, PlaybackConsumer, PlaybackProducer, Pop};
use crate::error::SpeechError;

/// Ring capacity in samples (~23 ms at 44.1 kHz).
const RING_CAPACITY: usize = 1024;

/// How long a write may make no progress before the device is considered
/// dead.
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Opens output devices. Shared across playbacks; each playback opens its
/// own device on its own thread.
pub trait OutputBackend: Send + Sync {
    /// Open a mono 16-bit output at `sample_rate`.
    fn open(&self, sample_rate: u32) -> Result<Box<dyn OutputDevice>, SpeechError>;

    fn name(&self) -> String;
}

/// An open output stream. Lives on the playback thread only.
pub trait OutputDevice {
    /// Block until the whole chunk has been accepted by the device.
    fn write(&mut self, chunk: &[i16]) -> Result<(), SpeechError>;

    /// Block until everything written has been played, then release the
    /// device.
    fn drain(self: Box<Self>) -> Result<(), SpeechError>;

    /// Stop immediately and release the device.
    fn abort(self: Box<Self>);
}

/// List available output device names.
pub fn list_output_devices() -> Vec<String> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    if let Ok(devices) = host.output_devices() {
        for dev in devices {
            if let Ok(name) = dev.name() {
                names.push(name);
            }
        }
    }
    names
}

/// Open the audio output stream for a named or default device.
fn open_output_stream(
    output_device_name: Option<&str>,
) -> Result<(OutputStream, OutputStreamHandle), SpeechError> {
    if let Some(name) = output_device_name {
        let host = cpal::default_host();
        let device = host
            .output_devices()
            .map_err(|e| {
                SpeechError::AudioDevice(format!("failed to enumerate output devices: {e}"))
            })?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false));

        match device {
            Some(dev) => {
                info!(device = %name, "Using configured output device");
                return OutputStream::try_from_device(&dev).map_err(|e| {
                    SpeechError::AudioDevice(format!("failed to open output device '{name}': {e}"))
                });
            }
            None => {
                warn!(
                    device = %name,
                    "Configured output device not found, falling back to default"
                );
            }
        }
    }

    OutputStream::try_default()
        .map_err(|e| SpeechError::AudioDevice(format!("no audio output device available: {e}")))
}

/// rodio/cpal output backend.
#[derive(Debug, Clone)]
pub struct RodioBackend {
    device_name: Option<String>,
    volume: f32,
}

impl RodioBackend {
    pub fn new(device_name: Option<String>, volume: f32) -> Self {
        Self {
            device_name,
            volume: volume.clamp(0.0, 2.0),
        }
    }
}

impl OutputBackend for RodioBackend {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn OutputDevice>, SpeechError> {
        let (stream, handle) = open_output_stream(self.device_name.as_deref())?;
        let sink = Sink::try_new(&handle)
            .map_err(|e| SpeechError::AudioDevice(format!("failed to create audio sink: {e}")))?;
        sink.set_volume(self.volume);

        let (producer, consumer) = playback_ring_buffer(RING_CAPACITY);
        sink.append(RingSource {
            consumer,
            sample_rate,
        });

        debug!(sample_rate, "Output stream opened");
        Ok(Box::new(RodioDevice {
            _stream: stream,
            sink,
            producer,
        }))
    }

    fn name(&self) -> String {
        match &self.device_name {
            Some(name) => format!("rodio ({name})"),
            None => "rodio (default device)".to_string(),
        }
    }
}

struct RodioDevice {
    // Dropping the stream closes the device.
    _stream: OutputStream,
    sink: Sink,
    producer: PlaybackProducer,
}

impl OutputDevice for RodioDevice {
    fn write(&mut self, chunk: &[i16]) -> Result<(), SpeechError> {
        let mut remaining = chunk;
        let mut last_progress = Instant::now();

        while !remaining.is_empty() {
            let n = self.producer.push_slice(remaining);
            if n > 0 {
                remaining = &remaining[n..];
                last_progress = Instant::now();
                continue;
            }
            if last_progress.elapsed() > STALL_TIMEOUT {
                return Err(SpeechError::AudioDevice(
                    "output device stopped consuming samples".to_string(),
                ));
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }

    fn drain(self: Box<Self>) -> Result<(), SpeechError> {
        self.producer.close();
        self.sink.sleep_until_end();
        Ok(())
    }

    fn abort(self: Box<Self>) {
        self.producer.close();
        self.sink.stop();
    }
}

/// rodio source fed from the playback ring. Plays silence on underrun and
/// ends once the producer has closed and the ring is empty.
struct RingSource {
    consumer: PlaybackConsumer,
    sample_rate: u32,
}

impl Iterator for RingSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        match self.consumer.pop() {
            Pop::Sample(s) => Some(s),
            Pop::Underrun => Some(0),
            Pop::Done => None,
        }
    }
}

impl Source for RingSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ring_buffer::playback_ring_buffer;

    #[test]
    fn test_ring_source_plays_silence_until_closed() {
        let (mut producer, consumer) = playback_ring_buffer(16);
        let mut source = RingSource {
            consumer,
            sample_rate: 44_100,
        };
        assert_eq!(source.channels(), 1);
        assert_eq!(source.sample_rate(), 44_100);

        assert_eq!(source.next(), Some(0), "underrun yields silence");
        producer.push_slice(&[3, 4]);
        producer.close();
        assert_eq!(source.next(), Some(3));
        assert_eq!(source.next(), Some(4));
        assert_eq!(source.next(), None);
    }
}
