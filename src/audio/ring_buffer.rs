//! Lock-free SPSC ring buffer between the playback thread and the audio
//! callback.
//!
//! The producer half is written by the playback engine one chunk at a time;
//! the consumer half is drained by the output callback. A small capacity
//! keeps the writer only a few milliseconds ahead of the speaker, so
//! "samples written" tracks "samples heard".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

/// Producer half, owned by the playback thread.
pub struct PlaybackProducer {
    inner: ringbuf::HeapProd<i16>,
    closed: Arc<AtomicBool>,
}

/// Consumer half, owned by the output callback.
pub struct PlaybackConsumer {
    inner: ringbuf::HeapCons<i16>,
    closed: Arc<AtomicBool>,
}

/// Create a matched producer/consumer pair holding up to `capacity` samples.
pub fn playback_ring_buffer(capacity: usize) -> (PlaybackProducer, PlaybackConsumer) {
    let rb = HeapRb::<i16>::new(capacity.max(1));
    let (prod, cons) = rb.split();
    let closed = Arc::new(AtomicBool::new(false));
    (
        PlaybackProducer {
            inner: prod,
            closed: Arc::clone(&closed),
        },
        PlaybackConsumer {
            inner: cons,
            closed,
        },
    )
}

impl PlaybackProducer {
    /// Push as many samples as fit. Returns the number written.
    pub fn push_slice(&mut self, samples: &[i16]) -> usize {
        self.inner.push_slice(samples)
    }

    /// Free space in samples.
    pub fn vacant(&self) -> usize {
        self.inner.vacant_len()
    }

    /// Signal that no more samples will be pushed.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// What the consumer got when it asked for the next sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pop {
    Sample(i16),
    /// Nothing buffered yet; the writer is still going.
    Underrun,
    /// Closed and fully drained.
    Done,
}

impl PlaybackConsumer {
    pub fn pop(&mut self) -> Pop {
        if let Some(s) = self.inner.try_pop() {
            return Pop::Sample(s);
        }
        if self.closed.load(Ordering::Acquire) {
            // The writer may have pushed between the pop above and closing.
            return match self.inner.try_pop() {
                Some(s) => Pop::Sample(s),
                None => Pop::Done,
            };
        }
        Pop::Underrun
    }

    /// Number of samples currently buffered.
    pub fn available(&self) -> usize {
        self.inner.occupied_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_respects_capacity() {
        let (mut prod, mut cons) = playback_ring_buffer(4);
        assert_eq!(prod.push_slice(&[1, 2, 3, 4, 5, 6]), 4);
        assert_eq!(prod.vacant(), 0);
        assert_eq!(cons.available(), 4);
        assert_eq!(cons.pop(), Pop::Sample(1));
        assert_eq!(prod.vacant(), 1);
    }

    #[test]
    fn test_underrun_then_done() {
        let (mut prod, mut cons) = playback_ring_buffer(8);
        assert_eq!(cons.pop(), Pop::Underrun);
        prod.push_slice(&[7]);
        prod.close();
        assert_eq!(cons.pop(), Pop::Sample(7));
        assert_eq!(cons.pop(), Pop::Done);
    }
}
