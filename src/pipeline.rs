//! Text → speech → synchronized reveal.
//!
//! [`Narrator`] ties a [`Synthesizer`], a [`PlaybackEngine`] and a
//! [`TextSink`] together. For streamed replies each sentence is synthesized
//! only after the previous one has finished playing, so utterances never
//! overlap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tracing::{debug, info};

use crate::audio::{AudioProgress, Canceller, PlaybackEngine, PlaybackHandle};
use crate::config::SpeechConfig;
use crate::error::SpeechError;
use crate::reveal::{render, RenderStats, TextSink};
use crate::segment::sentence_stream;
use crate::tts::{Synthesizer, VoiceServerClient};

/// Speaks text and reveals it in step with the audio.
pub struct Narrator {
    synthesizer: Arc<dyn Synthesizer>,
    engine: PlaybackEngine,
    poll_interval: Duration,
    interrupted: AtomicBool,
    active: Mutex<Option<Canceller>>,
}

impl Narrator {
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        engine: PlaybackEngine,
        poll_interval: Duration,
    ) -> Self {
        Self {
            synthesizer,
            engine,
            poll_interval,
            interrupted: AtomicBool::new(false),
            active: Mutex::new(None),
        }
    }

    /// Narrator on the voice server and the rodio output named in `config`.
    pub fn from_config(config: &SpeechConfig) -> Result<Self, SpeechError> {
        let client = VoiceServerClient::new(config)?;
        let engine = PlaybackEngine::from_config(config);
        info!(
            synthesizer = %client.name(),
            output = %engine.backend_name(),
            "Narrator ready"
        );
        Ok(Self::new(Arc::new(client), engine, config.poll_interval()))
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn synthesizer_name(&self) -> String {
        self.synthesizer.name()
    }

    pub fn output_name(&self) -> String {
        self.engine.backend_name()
    }

    /// Synthesize `text` and start playing it. Returns as soon as playback
    /// has started; the caller may poll, join, or drop the handle.
    pub async fn speak(&self, text: &str) -> Result<PlaybackHandle, SpeechError> {
        self.interrupted.store(false, Ordering::Release);
        self.start_utterance(text).await
    }

    /// Synthesize and play one utterance of the current reply. An interrupt
    /// that lands during synthesis keeps the clip from ever playing.
    async fn start_utterance(&self, text: &str) -> Result<PlaybackHandle, SpeechError> {
        let audio = self.synthesizer.synthesize(text).await?;
        if self.is_interrupted() {
            debug!("Interrupted during synthesis, dropping clip");
            return Err(SpeechError::Cancelled);
        }

        let handle = self.engine.play(audio);
        if let Ok(mut active) = self.active.lock() {
            *active = Some(handle.canceller());
        }
        // interrupt() may have run between the check above and registering.
        if self.is_interrupted() {
            handle.cancel();
        }
        Ok(handle)
    }

    /// Stop the current playback and drop the rest of the reply in progress.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        if let Ok(mut active) = self.active.lock() {
            if let Some(canceller) = active.take() {
                canceller.cancel();
            }
        }
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Reveal `text` while `handle` plays. A clip with nothing audible shows
    /// the whole text at once.
    async fn reveal<S>(
        &self,
        text: &str,
        handle: &PlaybackHandle,
        sink: &mut S,
    ) -> Result<RenderStats, SpeechError>
    where
        S: TextSink + ?Sized,
    {
        let progress = handle.progress();
        if progress.total_samples() == 0 {
            if text.is_empty() {
                return Ok(RenderStats::default());
            }
            sink.emit(text).await?;
            return Ok(RenderStats {
                slices: 1,
                chars: text.chars().count(),
            });
        }
        render(text, &progress, sink, self.poll_interval).await
    }

    /// Speak a complete reply and reveal it, then call `sink.finish()`.
    pub async fn speak_and_reveal<S>(&self, text: &str, sink: &mut S) -> Result<(), SpeechError>
    where
        S: TextSink + ?Sized,
    {
        self.interrupted.store(false, Ordering::Release);
        let handle = self.start_utterance(text).await?;
        let stats = self.reveal(text, &handle, sink).await?;
        debug!(slices = stats.slices, chars = stats.chars, "Reply revealed");
        sink.finish().await?;
        if self.is_interrupted() {
            return Err(SpeechError::Cancelled);
        }
        Ok(())
    }

    /// Speak a streamed reply sentence by sentence.
    ///
    /// Sentence N+1 is not synthesized until sentence N's progress reports
    /// finished. Returns the spoken text. The first synthesis error aborts
    /// the reply; `sink.finish()` is only called for replies that complete.
    pub async fn speak_stream<D, S>(&self, deltas: D, sink: &mut S) -> Result<String, SpeechError>
    where
        D: Stream<Item = String> + Send,
        S: TextSink + ?Sized,
    {
        self.interrupted.store(false, Ordering::Release);

        let mut sentences = Box::pin(sentence_stream(deltas));
        let mut full = String::new();
        let mut previous: Option<Arc<AudioProgress>> = None;
        let mut count = 0usize;

        while let Some(sentence) = sentences.next().await {
            if let Some(prev) = previous.take() {
                prev.wait_finished(self.poll_interval).await;
            }
            if self.is_interrupted() {
                info!(sentences = count, "Reply interrupted");
                return Err(SpeechError::Cancelled);
            }

            let handle = self.start_utterance(&sentence).await?;
            self.reveal(&sentence, &handle, sink).await?;
            previous = Some(handle.progress());
            full.push_str(&sentence);
            count += 1;
        }

        if let Some(prev) = previous {
            prev.wait_finished(self.poll_interval).await;
        }
        if self.is_interrupted() {
            return Err(SpeechError::Cancelled);
        }
        sink.finish().await?;
        info!(sentences = count, chars = full.chars().count(), "Reply spoken");
        Ok(full)
    }
}
