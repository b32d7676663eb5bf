//! Terminal and silent sinks.

use std::io::Write;

use super::{SinkFuture, TextSink};
use crate::error::SpeechError;

/// Echoes slices to a terminal-like writer, flushing after each one so
/// characters appear as the audio reaches them.
pub struct TerminalSink<W> {
    writer: W,
    prefix: Option<String>,
    started: bool,
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            prefix: None,
            started: false,
        }
    }

    /// Write `prefix` (e.g. a speaker label) before the first slice of each
    /// reply.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_now(&mut self, slice: &str) -> Result<(), SpeechError> {
        if !self.started {
            self.started = true;
            if let Some(prefix) = &self.prefix {
                self.writer.write_all(prefix.as_bytes()).map_err(sink_err)?;
            }
        }
        self.writer.write_all(slice.as_bytes()).map_err(sink_err)?;
        self.writer.flush().map_err(sink_err)
    }

    fn end_line(&mut self) -> Result<(), SpeechError> {
        if !self.started {
            return Ok(());
        }
        self.started = false;
        self.writer.write_all(b"\n").map_err(sink_err)?;
        self.writer.flush().map_err(sink_err)
    }
}

fn sink_err(e: std::io::Error) -> SpeechError {
    SpeechError::Sink(format!("terminal write failed: {e}"))
}

impl<W: Write + Send> TextSink for TerminalSink<W> {
    fn emit<'a>(&'a mut self, slice: &'a str) -> SinkFuture<'a> {
        let result = self.write_now(slice);
        Box::pin(async move { result })
    }

    /// Ends the line.
    fn finish(&mut self) -> SinkFuture<'_> {
        let result = self.end_line();
        Box::pin(async move { result })
    }
}

/// Discards text. Used when only the audio matters; rendering into it is
/// a plain wait for playback to finish.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TextSink for NullSink {
    fn emit<'a>(&'a mut self, _slice: &'a str) -> SinkFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}
