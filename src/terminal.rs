//! Terminal front end: every input line is one reply.
//!
//! With echo on, the reply is typed out in step with the audio; with echo
//! off, each reply just blocks until its audio has played.

use futures_util::stream;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

use crate::error::SpeechError;
use crate::pipeline::Narrator;
use crate::reveal::TextSink;

/// Speak each non-blank line of `input` into `sink`, one after another.
///
/// A reply that fails to synthesize or play is logged and skipped; a sink
/// failure ends the loop. Returns the number of replies spoken in full.
pub async fn run_terminal<R, S>(
    narrator: &Narrator,
    input: R,
    sink: &mut S,
) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
    S: TextSink + ?Sized,
{
    let mut lines = input.lines();
    let mut spoken = 0usize;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match narrator.speak_stream(stream::iter(vec![line]), sink).await {
            Ok(_) => spoken += 1,
            Err(SpeechError::Sink(e)) => return Err(SpeechError::Sink(e).into()),
            Err(e) => warn!("Reply failed: {}", e),
        }
    }

    info!(replies = spoken, "Input closed");
    Ok(spoken)
}
