//! WebSocket sink.
//!
//! Frames are JSON text messages:
//! `{"type":"partial","text":"..."}` for each slice,
//! `{"type":"complete"}` once the reply is done, and
//! `{"type":"error","content":"..."}` when the reply failed.

use std::fmt::Display;

use futures_util::{Sink, SinkExt};
use serde::Serialize;
use tokio_tungstenite::tungstenite::Message;

use super::{SinkFuture, TextSink};
use crate::error::SpeechError;

/// Frames pushed to a WebSocket client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SocketFrame<'a> {
    Partial { text: &'a str },
    Complete,
    Error { content: &'a str },
}

impl SocketFrame<'_> {
    pub fn to_message(&self) -> Result<Message, SpeechError> {
        serde_json::to_string(self)
            .map(Message::Text)
            .map_err(|e| SpeechError::Sink(format!("failed to encode frame: {e}")))
    }
}

/// Pushes revealed text to a WebSocket (or any sink of messages).
pub struct SocketSink<S> {
    inner: S,
}

impl<S> SocketSink<S>
where
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
{
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub async fn send_frame(&mut self, frame: SocketFrame<'_>) -> Result<(), SpeechError> {
        let message = frame.to_message()?;
        self.inner
            .send(message)
            .await
            .map_err(|e| SpeechError::Sink(format!("websocket send failed: {e}")))
    }

    /// Report a failed reply to the client.
    pub async fn send_error(&mut self, content: &str) -> Result<(), SpeechError> {
        self.send_frame(SocketFrame::Error { content }).await
    }
}

impl<S> TextSink for SocketSink<S>
where
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
{
    fn emit<'a>(&'a mut self, slice: &'a str) -> SinkFuture<'a> {
        Box::pin(self.send_frame(SocketFrame::Partial { text: slice }))
    }

    /// Sends `{"type":"complete"}`.
    fn finish(&mut self) -> SinkFuture<'_> {
        Box::pin(self.send_frame(SocketFrame::Complete))
    }
}
