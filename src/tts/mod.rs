//! Text-to-speech: the synthesis-server client and the PCM helpers it uses.
//!
//! Audio is carried as 16-bit signed mono samples, the format the playback
//! engine writes to the device.

pub mod pcm;
pub mod voice_server;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::SpeechError;

pub use voice_server::VoiceServerClient;

/// A synthesized clip: mono i16 samples plus the rate they were produced at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl SynthesizedAudio {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate)
    }

    pub fn total_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Common trait for synthesis engines (dyn-compatible).
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` into a clip ready for playback (fade-in applied).
    fn synthesize(
        &self,
        text: &str,
    ) -> Pin<Box<dyn Future<Output = Result<SynthesizedAudio, SpeechError>> + Send + '_>>;

    /// Display name for logs (e.g. "voice server (127.0.0.1:10101, speaker 1)").
    fn name(&self) -> String;
}
