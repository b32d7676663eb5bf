//! Sentence segmentation for streamed replies.
//!
//! Characters accumulate until a terminator (`。！？!?`) closes the
//! sentence, so each sentence can be spoken while later ones are still
//! streaming in. Sentences keep their terminators and all inner whitespace,
//! so concatenating them gives back the input.

use futures_util::stream::{self, Stream, StreamExt};

/// Characters that close a sentence.
pub const TERMINATORS: [char; 5] = ['。', '！', '？', '!', '?'];

fn is_terminator(c: char) -> bool {
    TERMINATORS.contains(&c)
}

/// Incremental segmenter for one stream. Feed it with [`push`](Self::push)
/// and close it with [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    current: String,
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text delta and return the sentences it completed.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        let mut done = Vec::new();
        for c in delta.chars() {
            self.current.push(c);
            if is_terminator(c) && !self.current.trim().is_empty() {
                done.push(std::mem::take(&mut self.current));
            }
        }
        done
    }

    /// Text received since the last completed sentence.
    pub fn pending(&self) -> &str {
        &self.current
    }

    /// End of stream: the unterminated residual, unless it is blank.
    pub fn finish(self) -> Option<String> {
        Some(self.current).filter(|s| !s.trim().is_empty())
    }
}

/// Split a complete reply into sentences.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut segmenter = SentenceSegmenter::new();
    let mut sentences = segmenter.push(text);
    sentences.extend(segmenter.finish());
    sentences
}

/// Lazily turn a stream of text deltas into a stream of sentences.
pub fn sentence_stream<S>(deltas: S) -> impl Stream<Item = String>
where
    S: Stream<Item = String>,
{
    stream::unfold(
        Some((Box::pin(deltas), SentenceSegmenter::new())),
        |state| async move {
            let (mut deltas, mut segmenter) = state?;
            loop {
                match deltas.next().await {
                    Some(delta) => {
                        let done = segmenter.push(&delta);
                        if !done.is_empty() {
                            return Some((done, Some((deltas, segmenter))));
                        }
                    }
                    None => {
                        let rest: Vec<String> = segmenter.finish().into_iter().collect();
                        return Some((rest, None));
                    }
                }
            }
        },
    )
    .flat_map(stream::iter)
}
