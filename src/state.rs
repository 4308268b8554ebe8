//! Shared coordination state for the ingest, playback and supervisor threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

const INTERRUPT_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
}

/// Flags and the activity clock, shared by handle (`Arc<PlayerState>`).
///
/// `generating` is only true while a synthesis call is in flight and
/// `playing` while a dequeued clip is being streamed. `interrupted` is
/// cleared by whoever finishes flushing the queue.
#[derive(Debug)]
pub struct PlayerState {
    running: AtomicBool,
    interrupted: AtomicBool,
    generating: AtomicBool,
    playing: AtomicBool,
    has_spoken: AtomicBool,
    exit_requested: AtomicBool,
    last_activity: Mutex<Instant>,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            running: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
            generating: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            has_spoken: AtomicBool::new(false),
            exit_requested: AtomicBool::new(false),
            last_activity: Mutex::new(Instant::now()),
        }
    }
}

impl PlayerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
        self.exit_requested.store(false, Ordering::SeqCst);
        self.has_spoken.store(false, Ordering::SeqCst);
        self.touch();
        self.running.store(true, Ordering::SeqCst);
    }

    /// Hard stop: both tasks leave their loops at their next check.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn run_state(&self) -> RunState {
        if self.running.load(Ordering::SeqCst) {
            RunState::Running
        } else {
            RunState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.run_state() == RunState::Running
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn clear_interrupt(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }

    /// Polls until the interrupt flag has been cleared or `timeout` passes.
    /// Returns whether it was cleared.
    pub fn wait_interrupt_cleared(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_interrupted() {
            if !self.is_running() || Instant::now() >= deadline {
                return false;
            }
            thread::sleep(INTERRUPT_POLL);
        }
        true
    }

    /// Marks a synthesis call as in flight until the guard drops.
    pub fn begin_generating(&self) -> BusyGuard<'_> {
        self.generating.store(true, Ordering::SeqCst);
        BusyGuard {
            state: self,
            flag: &self.generating,
        }
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }

    /// Marks a clip as playing until the guard drops. Dropping it also
    /// records activity, so idle time counts from the end of playback.
    pub fn begin_playing(&self) -> BusyGuard<'_> {
        self.playing.store(true, Ordering::SeqCst);
        BusyGuard {
            state: self,
            flag: &self.playing,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// True while synthesis or playback is in progress.
    pub fn is_busy(&self) -> bool {
        self.is_generating() || self.is_playing()
    }

    pub fn mark_spoken(&self) {
        self.has_spoken.store(true, Ordering::SeqCst);
    }

    pub fn has_spoken(&self) -> bool {
        self.has_spoken.load(Ordering::SeqCst)
    }

    pub fn request_exit(&self) {
        self.exit_requested.store(true, Ordering::SeqCst);
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested.load(Ordering::SeqCst)
    }

    /// Records activity now.
    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    pub fn touch_at(&self, at: Instant) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

/// Clears its activity flag on drop.
pub struct BusyGuard<'a> {
    state: &'a PlayerState,
    flag: &'a AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.state.touch();
        self.flag.store(false, Ordering::SeqCst);
    }
}
