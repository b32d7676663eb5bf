//! Progress-synchronized text reveal.
//!
//! [`render`] polls an [`AudioProgress`] and hands a [`TextSink`] the part
//! of the text proportional to the audio already played. Every character
//! is emitted exactly once, in order; whatever is left when playback
//! finishes goes out in one final slice.

pub mod sinks;
pub mod socket;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::audio::AudioProgress;
use crate::error::SpeechError;

pub use sinks::{NullSink, TerminalSink};
pub use socket::{SocketFrame, SocketSink};

/// Boxed future returned by [`TextSink`] methods.
pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SpeechError>> + Send + 'a>>;

/// Consumer of revealed text (dyn-compatible).
pub trait TextSink: Send {
    /// Receive the next slice of text.
    fn emit<'a>(&'a mut self, slice: &'a str) -> SinkFuture<'a>;

    /// Called once after a whole reply has been revealed.
    fn finish(&mut self) -> SinkFuture<'_> {
        Box::pin(async { Ok(()) })
    }
}

/// What a [`render`] call emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Number of `emit` calls.
    pub slices: usize,
    /// Characters emitted in total.
    pub chars: usize,
}

/// Byte offsets of every character start plus the end of `text`, so that
/// character index `i` maps to `bounds[i]`.
fn char_bounds(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect()
}

/// Reveal `text` in step with `progress`, polling every `interval`.
///
/// Returns once the progress is finished and the remainder has been
/// flushed. A clip with zero total samples returns at once without
/// emitting anything. Does not call [`TextSink::finish`].
pub async fn render<S>(
    text: &str,
    progress: &AudioProgress,
    sink: &mut S,
    interval: Duration,
) -> Result<RenderStats, SpeechError>
where
    S: TextSink + ?Sized,
{
    let mut stats = RenderStats::default();
    if progress.total_samples() == 0 {
        return Ok(stats);
    }

    let bounds = char_bounds(text);
    let len = bounds.len() - 1;
    let mut last = 0usize;

    while !progress.is_finished() {
        let target = ((progress.ratio() * len as f64).floor() as usize).min(len);
        if target > last {
            sink.emit(&text[bounds[last]..bounds[target]]).await?;
            stats.slices += 1;
            stats.chars += target - last;
            last = target;
        }
        tokio::time::sleep(interval).await;
    }

    if last < len {
        sink.emit(&text[bounds[last]..]).await?;
        stats.slices += 1;
        stats.chars += len - last;
    }

    Ok(stats)
}

/// Sink that keeps every slice, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    pub slices: Vec<String>,
    pub finished: usize,
}

#[cfg(test)]
impl RecordingSink {
    pub fn joined(&self) -> String {
        self.slices.concat()
    }
}

#[cfg(test)]
impl TextSink for RecordingSink {
    fn emit<'a>(&'a mut self, slice: &'a str) -> SinkFuture<'a> {
        self.slices.push(slice.to_string());
        Box::pin(async { Ok(()) })
    }

    fn finish(&mut self) -> SinkFuture<'_> {
        self.finished += 1;
        Box::pin(async { Ok(()) })
    }
}
