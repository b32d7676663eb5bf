//! Client for a local VOICEVOX-style synthesis server.
//!
//! Two requests per utterance:
//! 1. `POST /audio_query?text=<T>&speaker=<id>` returns JSON describing how
//!    to vocalize the text.
//! 2. `POST /synthesis?text=<T>&speaker=<id>` with that JSON as body returns
//!    the audio (raw 16-bit PCM or a WAV file).
//!
//! No retry happens here; callers decide what to do with a failure.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tracing::{debug, info};

use super::pcm::{apply_fade_in, decode_body};
use super::{SynthesizedAudio, Synthesizer};
use crate::config::SpeechConfig;
use crate::error::SpeechError;

/// Synthesis server client. Cheap to clone; the HTTP connection pool is
/// shared.
#[derive(Debug, Clone)]
pub struct VoiceServerClient {
    base_url: String,
    config: SpeechConfig,
    client: reqwest::Client,
}

impl VoiceServerClient {
    /// Build a client for the server and voice named in `config`. Both HTTP
    /// calls are bounded by `config.request_timeout()`.
    pub fn new(config: &SpeechConfig) -> Result<Self, SpeechError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SpeechError::network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url(),
            config: config.clone(),
            client,
        })
    }

    pub fn speaker(&self) -> u64 {
        self.config.speaker
    }

    /// Step 1: fetch the audio query for `text`.
    pub async fn audio_query(&self, text: &str) -> Result<Value, SpeechError> {
        let speaker = self.config.speaker.to_string();
        let resp = self
            .client
            .post(format!("{}/audio_query", self.base_url))
            .query(&[("text", text), ("speaker", speaker.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SpeechError::status(
                status.as_u16(),
                format!("audio_query rejected: {body}"),
            ));
        }

        let query: Value = resp.json().await?;
        if !query.is_object() {
            return Err(SpeechError::Decode(
                "audio_query response is not a JSON object".to_string(),
            ));
        }
        Ok(query)
    }

    /// Step 2: submit the (negotiated) query and decode the returned audio.
    pub async fn synthesis(
        &self,
        text: &str,
        mut query: Value,
    ) -> Result<SynthesizedAudio, SpeechError> {
        self.negotiate_format(&mut query);

        let speaker = self.config.speaker.to_string();
        let resp = self
            .client
            .post(format!("{}/synthesis", self.base_url))
            .query(&[("text", text), ("speaker", speaker.as_str())])
            .json(&query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SpeechError::status(
                status.as_u16(),
                format!("synthesis rejected: {body}"),
            ));
        }

        let bytes = resp.bytes().await?;
        let (samples, sample_rate) = decode_body(&bytes, self.config.sample_rate)?;
        if sample_rate != self.config.sample_rate {
            debug!(
                requested = self.config.sample_rate,
                actual = sample_rate,
                "Server returned a different sample rate"
            );
        }
        Ok(SynthesizedAudio::new(samples, sample_rate))
    }

    /// Ask the server for mono output at our sample rate when the query
    /// exposes those knobs.
    fn negotiate_format(&self, query: &mut Value) {
        if let Some(obj) = query.as_object_mut() {
            if obj.contains_key("outputSamplingRate") {
                obj.insert(
                    "outputSamplingRate".to_string(),
                    Value::from(self.config.sample_rate),
                );
            }
            if obj.contains_key("outputStereo") {
                obj.insert("outputStereo".to_string(), Value::Bool(false));
            }
        }
    }

    /// Full synthesis: query, synthesis, decode, fade-in.
    pub async fn synthesize_text(&self, text: &str) -> Result<SynthesizedAudio, SpeechError> {
        if text.trim().is_empty() {
            return Ok(SynthesizedAudio::empty(self.config.sample_rate));
        }

        info!(
            speaker = self.config.speaker,
            text_len = text.chars().count(),
            "Synthesis request"
        );

        let query = self.audio_query(text).await?;
        let mut audio = self.synthesis(text, query).await?;

        let fade_len = self.config.fade_in_samples(audio.sample_rate);
        apply_fade_in(&mut audio.samples, fade_len);

        info!(
            samples = audio.total_samples(),
            sample_rate = audio.sample_rate,
            duration_secs = format!("{:.2}", audio.duration().as_secs_f64()),
            "Synthesis complete"
        );
        Ok(audio)
    }
}

impl Synthesizer for VoiceServerClient {
    fn synthesize(
        &self,
        text: &str,
    ) -> Pin<Box<dyn Future<Output = Result<SynthesizedAudio, SpeechError>> + Send + '_>> {
        let text = text.to_string();
        Box::pin(async move { self.synthesize_text(&text).await })
    }

    fn name(&self) -> String {
        format!("voice server ({}, speaker {})", self.base_url, self.config.speaker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[derive(Debug, Clone)]
    struct Recorded {
        request_line: String,
        content_type: Option<String>,
        body: Vec<u8>,
    }

    #[derive(Clone)]
    struct Canned {
        query_status: u16,
        query_body: Vec<u8>,
        synthesis_status: u16,
        synthesis_body: Vec<u8>,
    }

    async fn read_request(stream: &mut TcpStream) -> Option<Recorded> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let head_end = loop {
            let n = stream.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let mut lines = head.lines();
        let request_line = lines.next()?.to_string();
        let mut content_length = 0usize;
        let mut content_type = None;
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                let name = name.trim().to_ascii_lowercase();
                if name == "content-length" {
                    content_length = value.trim().parse().unwrap_or(0);
                } else if name == "content-type" {
                    content_type = Some(value.trim().to_string());
                }
            }
        }

        let mut body = buf[head_end..].to_vec();
        while body.len() < content_length {
            let n = stream.read(&mut chunk).await.ok()?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }

        Some(Recorded {
            request_line,
            content_type,
            body,
        })
    }

    /// Minimal HTTP/1.1 responder answering /audio_query and /synthesis.
    async fn spawn_server(canned: Canned) -> (u16, Arc<Mutex<Vec<Recorded>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_task = Arc::clone(&log);

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let canned = canned.clone();
                let log = Arc::clone(&log_task);
                tokio::spawn(async move {
                    let Some(req) = read_request(&mut stream).await else {
                        return;
                    };
                    let (status, body) = if req.request_line.contains("/audio_query") {
                        (canned.query_status, canned.query_body)
                    } else {
                        (canned.synthesis_status, canned.synthesis_body)
                    };
                    log.lock().unwrap().push(req);
                    let head = format!(
                        "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = stream.write_all(head.as_bytes()).await;
                    let _ = stream.write_all(&body).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        (port, log)
    }

    fn config_for(port: u16) -> SpeechConfig {
        SpeechConfig {
            port,
            speaker: 7,
            request_timeout_secs: 5,
            ..SpeechConfig::default()
        }
    }

    fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[tokio::test]
    async fn test_two_step_protocol() {
        let query = serde_json::json!({
            "speedScale": 1.0,
            "outputSamplingRate": 24000,
            "outputStereo": true,
        });
        let samples: Vec<i16> = vec![1000; 1000];
        let (port, log) = spawn_server(Canned {
            query_status: 200,
            query_body: serde_json::to_vec(&query).unwrap(),
            synthesis_status: 200,
            synthesis_body: pcm_bytes(&samples),
        })
        .await;

        let client = VoiceServerClient::new(&config_for(port)).unwrap();
        let audio = client.synthesize_text("hello").await.unwrap();

        assert_eq!(audio.sample_rate, 44_100);
        assert_eq!(audio.total_samples(), 1000);
        assert_eq!(audio.samples[0], 0, "fade-in starts from silence");
        assert_eq!(audio.samples[440], 1000);
        assert_eq!(audio.samples[999], 1000);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert!(log[0].request_line.starts_with("POST /audio_query?"));
        assert!(log[0].request_line.contains("text=hello"));
        assert!(log[0].request_line.contains("speaker=7"));
        assert!(log[1].request_line.starts_with("POST /synthesis?"));
        assert!(log[1].request_line.contains("speaker=7"));
        assert_eq!(log[1].content_type.as_deref(), Some("application/json"));

        let sent: Value = serde_json::from_slice(&log[1].body).unwrap();
        assert_eq!(sent["speedScale"], 1.0);
        assert_eq!(sent["outputSamplingRate"], 44_100);
        assert_eq!(sent["outputStereo"], false);
    }

    #[tokio::test]
    async fn test_fade_follows_wav_header_rate() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 24_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..1000 {
                writer.write_sample(1000i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        let (port, _log) = spawn_server(Canned {
            query_status: 200,
            query_body: b"{}".to_vec(),
            synthesis_status: 200,
            synthesis_body: cursor.into_inner(),
        })
        .await;

        let config = SpeechConfig {
            fade_in_ms: 20,
            ..config_for(port)
        };
        let client = VoiceServerClient::new(&config).unwrap();
        let audio = client.synthesize_text("はい").await.unwrap();

        // 20 ms at 24 kHz is 480 samples, not the 882 of the configured rate.
        assert_eq!(config.fade_in_samples(audio.sample_rate), 480);
        assert_eq!(audio.sample_rate, 24_000);
        assert_eq!(audio.samples[0], 0);
        assert!(audio.samples[478] < 1000);
        assert_eq!(audio.samples[479], 1000);
        assert_eq!(audio.samples[480], 1000);
    }

    #[tokio::test]
    async fn test_non_success_status_is_network_error() {
        let (port, log) = spawn_server(Canned {
            query_status: 422,
            query_body: b"bad speaker".to_vec(),
            synthesis_status: 200,
            synthesis_body: Vec::new(),
        })
        .await;

        let client = VoiceServerClient::new(&config_for(port)).unwrap();
        let err = client.synthesize_text("hello").await.unwrap_err();
        match err {
            SpeechError::Network { status, message } => {
                assert_eq!(status, Some(422));
                assert!(message.contains("bad speaker"));
            }
            other => panic!("expected network error, got {other:?}"),
        }
        assert_eq!(log.lock().unwrap().len(), 1, "synthesis must not be attempted");
    }

    #[tokio::test]
    async fn test_malformed_query_is_decode_error() {
        let (port, _log) = spawn_server(Canned {
            query_status: 200,
            query_body: b"<html>not json</html>".to_vec(),
            synthesis_status: 200,
            synthesis_body: Vec::new(),
        })
        .await;

        let client = VoiceServerClient::new(&config_for(port)).unwrap();
        let err = client.synthesize_text("hello").await.unwrap_err();
        assert!(matches!(err, SpeechError::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_odd_synthesis_body_is_decode_error() {
        let (port, _log) = spawn_server(Canned {
            query_status: 200,
            query_body: b"{}".to_vec(),
            synthesis_status: 200,
            synthesis_body: vec![1, 2, 3],
        })
        .await;

        let client = VoiceServerClient::new(&config_for(port)).unwrap();
        let err = client.synthesize_text("hello").await.unwrap_err();
        assert!(matches!(err, SpeechError::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = VoiceServerClient::new(&config_for(port)).unwrap();
        let err = client.synthesize_text("hello").await.unwrap_err();
        assert!(matches!(err, SpeechError::Network { status: None, .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_timeout_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let config = SpeechConfig {
            request_timeout_secs: 1,
            ..config_for(port)
        };
        let client = VoiceServerClient::new(&config).unwrap();
        let err = client.synthesize_text("hello").await.unwrap_err();
        assert!(matches!(err, SpeechError::Network { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_blank_text_skips_network() {
        let client = VoiceServerClient::new(&config_for(1)).unwrap();
        let audio = client.synthesize_text("   ").await.unwrap();
        assert_eq!(audio.total_samples(), 0);
    }
}
