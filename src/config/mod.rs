//! Configuration reading and data directory paths.

pub mod paths;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use paths::get_data_dir;

/// Environment variables that override values from `speech_config.json`.
pub const ENV_HOST: &str = "VOICE_REVEAL_HOST";
pub const ENV_PORT: &str = "VOICE_REVEAL_PORT";
pub const ENV_SPEAKER: &str = "VOICE_REVEAL_SPEAKER";
pub const ENV_WS_LISTEN: &str = "VOICE_REVEAL_WS";

/// speech_config.json shape. Every field is optional on disk.
///
/// One record is built at startup and handed to the synthesis client,
/// playback engine and renderer; nothing reads configuration globally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpeechConfig {
    /// Synthesis server host.
    pub host: String,
    /// Synthesis server port.
    pub port: u16,
    /// Voice selected on the synthesis server.
    pub speaker: u64,
    /// Sample rate requested from (and assumed for) the synthesis server.
    pub sample_rate: u32,
    /// Samples written to the output device per call.
    pub chunk_samples: usize,
    /// Length of the fade-in envelope.
    pub fade_in_ms: u32,
    /// Interval between progress polls while revealing text.
    pub poll_interval_ms: u64,
    /// Upper bound for each synthesis HTTP call.
    pub request_timeout_secs: u64,
    /// Output device name; the default device is used when unset or missing.
    pub output_device: Option<String>,
    /// Playback volume, 1.0 = unchanged.
    pub volume: f32,
    /// Listen address for the WebSocket front end (e.g. "127.0.0.1:8765").
    pub ws_listen: Option<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 10101,
            speaker: 888_753_760,
            sample_rate: 44_100,
            chunk_samples: 128,
            fade_in_ms: 10,
            poll_interval_ms: 10,
            request_timeout_secs: 30,
            output_device: None,
            volume: 1.0,
            ws_listen: None,
        }
    }
}

impl SpeechConfig {
    /// Base URL of the synthesis server.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Number of samples covered by the fade-in at `sample_rate`.
    pub fn fade_in_samples(&self, sample_rate: u32) -> usize {
        (sample_rate as u64 * self.fade_in_ms as u64 / 1000) as usize
    }

    /// Apply `VOICE_REVEAL_*` overrides. Unparsable values are logged and
    /// ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            match port.trim().parse() {
                Ok(p) => self.port = p,
                Err(e) => warn!(value = %port, "Ignoring {}: {}", ENV_PORT, e),
            }
        }
        if let Some(speaker) = lookup(ENV_SPEAKER) {
            match speaker.trim().parse() {
                Ok(s) => self.speaker = s,
                Err(e) => warn!(value = %speaker, "Ignoring {}: {}", ENV_SPEAKER, e),
            }
        }
        if let Some(addr) = lookup(ENV_WS_LISTEN) {
            self.ws_listen = Some(addr).filter(|a| !a.trim().is_empty());
        }
    }
}

/// Read speech_config.json from the data directory and apply environment
/// overrides.
pub fn read_speech_config() -> SpeechConfig {
    let mut config: SpeechConfig = read_json_file(&get_config_path()).unwrap_or_default();
    config.apply_env_overrides(|key| std::env::var(key).ok());
    config
}

/// Path to speech_config.json.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("speech_config.json")
}

/// Generic helper: read a JSON file and deserialize it.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}
