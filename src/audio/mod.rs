//! Audio playback, its output devices, and the shared progress record.

pub mod output;
pub mod playback;
pub mod progress;
pub mod ring_buffer;

pub use output::{list_output_devices, OutputBackend, OutputDevice, RodioBackend};
pub use playback::{Canceller, PlaybackEngine, PlaybackHandle, DEFAULT_CHUNK_SAMPLES};
pub use progress::AudioProgress;
