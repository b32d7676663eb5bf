//! Shared playback progress.
//!
//! One writer (the playback thread) advances the sample counter and finally
//! raises the finished flag; any number of readers poll it. Readers may see
//! slightly stale values, which only delays text reveal by a poll.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Progress of one clip through the output device.
#[derive(Debug)]
pub struct AudioProgress {
    total_samples: usize,
    current_sample: AtomicUsize,
    finished: AtomicBool,
}

impl AudioProgress {
    pub fn new(total_samples: usize) -> Arc<Self> {
        Arc::new(Self {
            total_samples,
            current_sample: AtomicUsize::new(0),
            finished: AtomicBool::new(false),
        })
    }

    /// Progress for a clip that has nothing to play.
    pub fn finished_empty() -> Arc<Self> {
        let progress = Self::new(0);
        progress.finish();
        progress
    }

    /// Sample count of the clip. Fixed at creation.
    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    /// Samples handed to the device so far.
    pub fn current_sample(&self) -> usize {
        self.current_sample.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Fraction played in `0.0..=1.0`. An empty clip counts as complete.
    pub fn ratio(&self) -> f64 {
        if self.total_samples == 0 {
            return 1.0;
        }
        self.current_sample() as f64 / self.total_samples as f64
    }

    /// Move the counter forward to `samples_written`, clamped to the total.
    /// Never moves backwards.
    pub fn advance_to(&self, samples_written: usize) {
        let clamped = samples_written.min(self.total_samples);
        self.current_sample.fetch_max(clamped, Ordering::AcqRel);
    }

    /// Raise the finished flag. Returns `true` only for the call that
    /// actually flipped it.
    pub fn finish(&self) -> bool {
        !self.finished.swap(true, Ordering::AcqRel)
    }

    /// Sleep in `interval` steps until the clip is finished.
    pub async fn wait_finished(&self, interval: Duration) {
        while !self.is_finished() {
            tokio::time::sleep(interval).await;
        }
    }
}
