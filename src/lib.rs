//! Speech-synchronized text reveal for a voice chat assistant.
//!
//! A reply is synthesized by a local voice server, played through the
//! audio output in small chunks, and revealed to the user in step with
//! playback. Streamed replies are split into sentences and spoken one at
//! a time.

pub mod audio;
pub mod config;
pub mod error;
pub mod ipc;
pub mod logging;
pub mod pipeline;
pub mod reveal;
pub mod segment;
pub mod terminal;
pub mod tts;
pub mod ws;

pub use audio::{AudioProgress, PlaybackEngine, PlaybackHandle};
pub use config::SpeechConfig;
pub use error::SpeechError;
pub use pipeline::Narrator;
pub use reveal::{render, TextSink};
pub use segment::{sentence_stream, split_sentences, SentenceSegmenter};
pub use tts::{SynthesizedAudio, Synthesizer, VoiceServerClient};
