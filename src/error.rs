//! Error type shared by synthesis, playback and text reveal.

use thiserror::Error;

/// Errors surfaced by the speech path.
///
/// `Network` and `Decode` come back synchronously from synthesis. Playback
/// runs detached, so `AudioDevice` and `Cancelled` only reach the caller
/// through [`PlaybackHandle::join`](crate::audio::PlaybackHandle::join)
/// (and the log).
#[derive(Debug, Error)]
pub enum SpeechError {
    /// Synthesis server unreachable, timed out, or answered with a
    /// non-success status.
    #[error("synthesis request failed{}: {message}", status_suffix(.status))]
    Network {
        status: Option<u16>,
        message: String,
    },

    /// Audio-query JSON or synthesis body could not be interpreted.
    #[error("failed to decode synthesis response: {0}")]
    Decode(String),

    /// Output device could not be opened, or a write failed mid-stream.
    #[error("audio device error: {0}")]
    AudioDevice(String),

    /// A presentation sink refused a text slice (e.g. socket closed).
    #[error("text sink error: {0}")]
    Sink(String),

    /// Playback was stopped through its handle.
    #[error("playback cancelled")]
    Cancelled,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl SpeechError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            status: None,
            message: message.into(),
        }
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Network {
            status: Some(status),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for SpeechError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::Decode(e.to_string());
        }
        Self::Network {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}
