//! IPC bridge: stdin reader, stdout event emitter, and the IPC text sink.
//!
//! A blocking stdin reader thread sends deserialized commands through an
//! mpsc channel; events go out as JSON lines on stdout.

use std::io::{self, BufRead, Write};

use tokio::sync::mpsc;
use tracing::{debug, error};

use super::{VoiceCommand, VoiceEvent};
use crate::error::SpeechError;
use crate::reveal::{SinkFuture, TextSink};

/// Write `event` as one JSON line to `out` and flush.
pub fn write_event<W: Write>(out: &mut W, event: &VoiceEvent) -> io::Result<()> {
    let json = serde_json::to_string(event).map_err(io::Error::other)?;
    writeln!(out, "{}", json)?;
    out.flush()
}

/// Emit a `VoiceEvent` as a JSON line on stdout and flush.
pub fn emit_event(event: &VoiceEvent) {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    // Pipe may be closed.
    if let Err(e) = write_event(&mut handle, event) {
        debug!("Failed to emit event: {}", e);
    }
}

/// Convenience helper for emitting error events.
pub fn emit_error(message: &str) {
    emit_event(&VoiceEvent::Error {
        message: message.to_string(),
    });
}

/// Normalize incoming JSON: if it has a `"type"` field but no `"command"`
/// field, rename `"type"` to `"command"` so serde can deserialize it.
fn normalize_command_json(input: &str) -> String {
    if let Ok(mut obj) = serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(input)
    {
        if !obj.contains_key("command") {
            if let Some(type_val) = obj.remove("type") {
                obj.insert("command".to_string(), type_val);
                if let Ok(json) = serde_json::to_string(&obj) {
                    return json;
                }
            }
        }
    }
    input.to_string()
}

/// Parse one stdin line into a command.
pub fn parse_command(line: &str) -> Result<VoiceCommand, serde_json::Error> {
    serde_json::from_str(&normalize_command_json(line))
}

/// Spawn a blocking thread that reads JSON lines from stdin, deserializes
/// them into `VoiceCommand`, and forwards them through the returned channel.
///
/// The thread exits when stdin is closed (parent process gone) or on
/// unrecoverable read error.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<VoiceCommand> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let stdin = io::stdin();
        let reader = stdin.lock();
        for line in reader.lines() {
            match line {
                Ok(text) => {
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match parse_command(trimmed) {
                        Ok(cmd) => {
                            debug!(?cmd, "Received command");
                            if tx.send(cmd).is_err() {
                                break; // Receiver dropped
                            }
                        }
                        Err(e) => {
                            error!("Invalid JSON command: {} (input: {})", e, trimmed);
                            emit_error(&format!("Invalid JSON command: {}", e));
                        }
                    }
                }
                Err(e) => {
                    error!("stdin read error: {}", e);
                    break;
                }
            }
        }
        debug!("stdin reader thread exiting");
    });

    rx
}

/// Reveals text as `partial` events and closes each reply with `complete`.
pub struct IpcSink<W> {
    out: W,
}

impl IpcSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write + Send> IpcSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn send(&mut self, event: &VoiceEvent) -> Result<(), SpeechError> {
        write_event(&mut self.out, event)
            .map_err(|e| SpeechError::Sink(format!("failed to emit event: {e}")))
    }
}

impl<W: Write + Send> TextSink for IpcSink<W> {
    fn emit<'a>(&'a mut self, slice: &'a str) -> SinkFuture<'a> {
        let result = self.send(&VoiceEvent::Partial {
            text: slice.to_string(),
        });
        Box::pin(async move { result })
    }

    fn finish(&mut self) -> SinkFuture<'_> {
        let result = self.send(&VoiceEvent::Complete {});
        Box::pin(async move { result })
    }
}
