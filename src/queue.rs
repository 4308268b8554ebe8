use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One synthesized sentence waiting to be played.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub source_sentence: String,
}

/// Unbounded FIFO shared by the ingest (producer) and playback (consumer)
/// threads. Every operation, including [`ClipQueue::clear`], happens under
/// one lock, so nothing is pushed or popped "through" a clear.
#[derive(Default)]
pub struct ClipQueue {
    clips: Mutex<VecDeque<AudioClip>>,
    available: Condvar,
}

impl ClipQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<AudioClip>> {
        self.clips.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, clip: AudioClip) {
        self.lock().push_back(clip);
        self.available.notify_one();
    }

    /// Waits up to `timeout` for a clip.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<AudioClip> {
        let guard = self.lock();
        let (mut guard, _) = self
            .available
            .wait_timeout_while(guard, timeout, |clips| clips.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        guard.pop_front()
    }

    /// Discards every pending clip and returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut clips = self.lock();
        let dropped = clips.len();
        clips.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
