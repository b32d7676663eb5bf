//! JSON-line IPC protocol types for a parent process.
//!
//! Events use `{"event": "<name>", "data": {...}}` format (Rust -> parent).
//! Commands use `{"command": "<name>", ...}` format (parent -> Rust).

pub mod bridge;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Events: Rust -> parent (stdout)
// ---------------------------------------------------------------------------

/// All events emitted via stdout as JSON lines.
///
/// Serialized as `{"event": "<variant>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum VoiceEvent {
    Starting {},
    Ready {
        synthesizer: String,
        output: String,
    },
    /// A reply started; `partial` events follow.
    SpeakingStart {},
    /// Next revealed slice of the reply being spoken.
    Partial { text: String },
    SpeakingEnd {},
    /// The whole reply has been revealed.
    Complete {},
    Error { message: String },
    Pong {},
    AudioDevices { output: Vec<String> },
    Stopping {},
}

// ---------------------------------------------------------------------------
// Commands: parent -> Rust (stdin)
// ---------------------------------------------------------------------------

/// All commands received via stdin as JSON lines.
///
/// Deserialized from `{"command": "<variant>", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum VoiceCommand {
    /// Speak a complete reply.
    Speak { text: String },
    /// Next chunk of a streamed reply.
    Delta { text: String },
    /// The streamed reply is complete.
    EndOfStream {},
    /// Interrupt whatever is being spoken.
    Cancel {},
    ListAudioDevices {},
    Ping {},
    Stop {},
}
