//! Background playback with progress reporting.
//!
//! [`PlaybackEngine::play`] returns at once. A blocking task opens the
//! device, primes it with one silent chunk, then writes the clip in fixed
//! chunks, advancing [`AudioProgress`] to the running total after each
//! write. The progress is always marked finished when the task ends, on
//! success, error, cancellation or panic, so pollers never hang.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, Instrument};
use uuid::Uuid;

use super::output::{OutputBackend, RodioBackend};
use super::progress::AudioProgress;
use crate::config::SpeechConfig;
use crate::error::SpeechError;
use crate::tts::SynthesizedAudio;

/// Default chunk size in samples (~2.9 ms at 44.1 kHz).
pub const DEFAULT_CHUNK_SAMPLES: usize = 128;

/// Plays clips on background tasks through an [`OutputBackend`].
#[derive(Clone)]
pub struct PlaybackEngine {
    backend: Arc<dyn OutputBackend>,
    chunk_samples: usize,
}

impl PlaybackEngine {
    pub fn new(backend: Arc<dyn OutputBackend>, chunk_samples: usize) -> Self {
        Self {
            backend,
            chunk_samples: chunk_samples.max(1),
        }
    }

    /// Engine on the rodio backend with the configured device, volume and
    /// chunk size.
    pub fn from_config(config: &SpeechConfig) -> Self {
        let backend = RodioBackend::new(config.output_device.clone(), config.volume);
        Self::new(Arc::new(backend), config.chunk_samples)
    }

    pub fn backend_name(&self) -> String {
        self.backend.name()
    }

    /// Start playing `audio` in the background and return its handle.
    ///
    /// Must be called from within a tokio runtime. Dropping the handle does
    /// not stop playback.
    pub fn play(&self, audio: SynthesizedAudio) -> PlaybackHandle {
        let id = Uuid::new_v4();

        if audio.samples.is_empty() {
            return PlaybackHandle {
                id,
                progress: AudioProgress::finished_empty(),
                cancel: Arc::new(AtomicBool::new(false)),
                task: None,
            };
        }

        let progress = AudioProgress::new(audio.total_samples());
        let cancel = Arc::new(AtomicBool::new(false));

        let backend = Arc::clone(&self.backend);
        let chunk_samples = self.chunk_samples;
        let task_progress = Arc::clone(&progress);
        let task_cancel = Arc::clone(&cancel);
        let span = tracing::info_span!("playback", utterance = %id);

        let task = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            run_playback(
                backend.as_ref(),
                audio,
                chunk_samples,
                task_progress,
                &task_cancel,
            )
        });

        PlaybackHandle {
            id,
            progress,
            cancel,
            task: Some(task),
        }
    }
}

/// Marks progress finished when dropped, so even a panicking playback
/// releases its pollers.
struct FinishOnDrop(Arc<AudioProgress>);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        self.0.finish();
    }
}

fn run_playback(
    backend: &dyn OutputBackend,
    audio: SynthesizedAudio,
    chunk_samples: usize,
    progress: Arc<AudioProgress>,
    cancel: &AtomicBool,
) -> Result<(), SpeechError> {
    let _finish = FinishOnDrop(Arc::clone(&progress));

    info!(
        samples = audio.total_samples(),
        sample_rate = audio.sample_rate,
        duration_secs = format!("{:.2}", audio.duration().as_secs_f64()),
        "Playback starting"
    );

    let result = stream_samples(backend, &audio, chunk_samples, &progress, cancel);
    match &result {
        Ok(()) => info!("Playback complete"),
        Err(SpeechError::Cancelled) => info!(
            played = progress.current_sample(),
            "Playback cancelled"
        ),
        Err(e) => error!("Playback failed: {}", e),
    }
    result
}

fn stream_samples(
    backend: &dyn OutputBackend,
    audio: &SynthesizedAudio,
    chunk_samples: usize,
    progress: &AudioProgress,
    cancel: &AtomicBool,
) -> Result<(), SpeechError> {
    let mut device = backend.open(audio.sample_rate)?;

    // One silent chunk up front so the first real samples don't underrun.
    let silence = vec![0i16; chunk_samples];
    if let Err(e) = device.write(&silence) {
        device.abort();
        return Err(e);
    }

    let mut written = 0usize;
    for chunk in audio.samples.chunks(chunk_samples) {
        if cancel.load(Ordering::Acquire) {
            device.abort();
            return Err(SpeechError::Cancelled);
        }
        if let Err(e) = device.write(chunk) {
            device.abort();
            return Err(e);
        }
        written += chunk.len();
        progress.advance_to(written);
    }

    device.drain()
}

/// Cloneable stop switch for a playback, usable after the handle has been
/// moved elsewhere.
#[derive(Debug, Clone)]
pub struct Canceller(Arc<AtomicBool>);

impl Canceller {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Handle to one background playback.
///
/// Poll [`progress`](Self::progress) to follow it, [`cancel`](Self::cancel)
/// to stop it early, or [`join`](Self::join) to wait for its outcome.
#[derive(Debug)]
pub struct PlaybackHandle {
    id: Uuid,
    progress: Arc<AudioProgress>,
    cancel: Arc<AtomicBool>,
    task: Option<JoinHandle<Result<(), SpeechError>>>,
}

impl PlaybackHandle {
    /// Identifier used in the playback's log span.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn progress(&self) -> Arc<AudioProgress> {
        Arc::clone(&self.progress)
    }

    pub fn is_finished(&self) -> bool {
        self.progress.is_finished()
    }

    /// Ask the playback to stop at the next chunk boundary.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn canceller(&self) -> Canceller {
        Canceller(Arc::clone(&self.cancel))
    }

    /// Sleep in `interval` steps until the progress reports finished.
    pub async fn wait_finished(&self, interval: Duration) {
        self.progress.wait_finished(interval).await
    }

    /// Wait for the playback task and return its outcome.
    pub async fn join(mut self) -> Result<(), SpeechError> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.instrument(tracing::debug_span!("join", utterance = %self.id)).await {
            Ok(result) => result,
            Err(e) => Err(SpeechError::AudioDevice(format!("playback task failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::output::fake::FakeBackend;

    fn clip(len: usize) -> SynthesizedAudio {
        SynthesizedAudio::new((0..len).map(|i| (i % 100) as i16).collect(), 44_100)
    }

    #[tokio::test]
    async fn test_plays_all_chunks_in_order() {
        let backend = FakeBackend::default();
        let engine = PlaybackEngine::new(Arc::new(backend.clone()), 128);

        let audio = clip(300);
        let handle = engine.play(audio.clone());
        let progress = handle.progress();
        handle.join().await.unwrap();

        assert!(progress.is_finished());
        assert_eq!(progress.current_sample(), 300);

        let log = backend.log.lock().unwrap();
        let sizes: Vec<usize> = log.writes.iter().map(|w| w.len()).collect();
        assert_eq!(sizes, vec![128, 128, 128, 44]);
        assert!(log.writes[0].iter().all(|&s| s == 0), "priming chunk is silent");
        let played: Vec<i16> = log.writes[1..].concat();
        assert_eq!(played, audio.samples);
        assert_eq!(log.drained_at.len(), 1);
    }

    #[tokio::test]
    async fn test_play_returns_before_playback_ends() {
        let backend = FakeBackend::with_delay(Duration::from_millis(5));
        let engine = PlaybackEngine::new(Arc::new(backend), 128);

        let handle = engine.play(clip(128 * 20));
        assert!(!handle.is_finished());

        // Progress advances by running totals and never exceeds the total.
        let progress = handle.progress();
        let mut seen = Vec::new();
        while !progress.is_finished() {
            seen.push(progress.current_sample());
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert!(seen.iter().all(|&s| s % 128 == 0 && s <= 128 * 20));
        assert_eq!(progress.current_sample(), 128 * 20);
        handle.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_failure_still_finishes() {
        let backend = FakeBackend::failing_open();
        let engine = PlaybackEngine::new(Arc::new(backend), 128);

        let handle = engine.play(clip(1000));
        let progress = handle.progress();
        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, SpeechError::AudioDevice(_)));
        assert!(progress.is_finished());
        assert_eq!(progress.current_sample(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_mid_stream_finishes_and_aborts() {
        let backend = FakeBackend::failing_write_at(3);
        let engine = PlaybackEngine::new(Arc::new(backend.clone()), 100);

        let handle = engine.play(clip(1000));
        let progress = handle.progress();
        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, SpeechError::AudioDevice(_)));
        assert!(progress.is_finished());
        // Priming chunk plus two real chunks made it through.
        assert_eq!(progress.current_sample(), 200);
        assert_eq!(backend.log.lock().unwrap().aborted, 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_early() {
        let backend = FakeBackend::with_delay(Duration::from_millis(5));
        let engine = PlaybackEngine::new(Arc::new(backend.clone()), 128);

        let handle = engine.play(clip(128 * 200));
        let progress = handle.progress();
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.canceller().cancel();

        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, SpeechError::Cancelled));
        assert!(progress.is_finished());
        assert!(progress.current_sample() < 128 * 200);
        assert_eq!(backend.log.lock().unwrap().aborted, 1);
    }

    #[tokio::test]
    async fn test_empty_clip_is_immediately_finished() {
        let backend = FakeBackend::default();
        let engine = PlaybackEngine::new(Arc::new(backend.clone()), 128);

        let handle = engine.play(SynthesizedAudio::empty(44_100));
        assert!(handle.is_finished());
        assert_eq!(handle.progress().total_samples(), 0);
        handle.join().await.unwrap();
        assert!(backend.log.lock().unwrap().opened_at.is_empty());
    }
}
