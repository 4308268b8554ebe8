//! Idle bookkeeping: unload the engine after a quiet spell and, optionally,
//! ask the supervisor to exit after a longer one.
//!
//! Checks are polled from the ingest and playback loops whenever they have
//! nothing to do; the deadlines are seconds long, so no timer thread is used.

use crate::engine::EngineHandle;
use crate::queue::ClipQueue;
use crate::state::PlayerState;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct IdleMonitor {
    engine_timeout: Duration,
    exit_timeout: Option<Duration>,
}

/// What a single [`IdleMonitor::check`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdleOutcome {
    pub released_engine: bool,
    pub requested_exit: bool,
}

impl IdleMonitor {
    /// `exit_timeout` is `None` when `exit_on_idle` is off.
    pub fn new(engine_timeout: Duration, exit_timeout: Option<Duration>) -> Self {
        Self {
            engine_timeout,
            exit_timeout,
        }
    }

    pub fn check(&self, state: &PlayerState, queue: &ClipQueue, engine: &EngineHandle) -> IdleOutcome {
        let mut outcome = IdleOutcome::default();
        if state.is_busy() || !queue.is_empty() {
            return outcome;
        }

        let idle = state.idle_for();
        if idle >= self.engine_timeout && engine.try_release() {
            tracing::info!(idle_secs = idle.as_secs(), "Engine idle timeout reached");
            outcome.released_engine = true;
        }

        if let Some(exit_timeout) = self.exit_timeout {
            // Never exit before having spoken at least once.
            if idle >= exit_timeout && state.has_spoken() && !state.exit_requested() {
                tracing::info!(idle_secs = idle.as_secs(), "Idle exit timeout reached");
                state.request_exit();
                outcome.requested_exit = true;
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendLoader, SpeechBackend, Synthesized};
    use crate::error::TtsError;
    use crate::queue::AudioClip;
    use crate::voice::VoiceSelection;
    use std::time::Instant;

    struct Silence;

    impl SpeechBackend for Silence {
        fn id(&self) -> &'static str {
            "silence"
        }

        fn synthesize(&mut self, _: &str, _: &str, _: f32, _: &str) -> Result<Synthesized, TtsError> {
            Ok(Synthesized {
                samples: vec![0.0; 8],
                sample_rate: 24_000,
            })
        }
    }

    struct SilenceLoader;

    impl BackendLoader for SilenceLoader {
        fn load(&self) -> Result<Box<dyn SpeechBackend>, TtsError> {
            Ok(Box::new(Silence))
        }
    }

    fn loaded_engine() -> EngineHandle {
        let engine = EngineHandle::new(Box::new(SilenceLoader), 24_000);
        let voice = VoiceSelection {
            voice: "af_sarah".into(),
            speed: 1.0,
        };
        engine.synthesize("Warm up.", &voice, "en-us").unwrap();
        engine
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn idle_state(idle: Duration) -> PlayerState {
        let state = PlayerState::new();
        state.start();
        state.touch_at(Instant::now() - idle);
        state
    }

    #[test]
    fn test_releases_after_timeout() {
        let monitor = IdleMonitor::new(ms(60), None);
        let engine = loaded_engine();
        let queue = ClipQueue::new();

        let outcome = monitor.check(&idle_state(ms(10)), &queue, &engine);
        assert!(!outcome.released_engine);
        assert!(engine.is_loaded());

        let outcome = monitor.check(&idle_state(ms(61)), &queue, &engine);
        assert!(outcome.released_engine);
        assert!(!engine.is_loaded());
    }

    #[test]
    fn test_pending_work_blocks_release() {
        let monitor = IdleMonitor::new(ms(10), None);
        let engine = loaded_engine();
        let queue = ClipQueue::new();
        queue.push(AudioClip {
            samples: vec![0.0],
            sample_rate: 24_000,
            source_sentence: "pending".into(),
        });
        let state = idle_state(ms(50));
        assert_eq!(monitor.check(&state, &queue, &engine), IdleOutcome::default());

        queue.clear();
        let _guard = state.begin_generating();
        assert_eq!(monitor.check(&state, &queue, &engine), IdleOutcome::default());
        assert!(engine.is_loaded());
    }

    #[test]
    fn test_playing_clip_is_not_idle() {
        let monitor = IdleMonitor::new(ms(10), Some(ms(10)));
        let engine = loaded_engine();
        let queue = ClipQueue::new();
        let state = PlayerState::new();
        state.start();
        state.mark_spoken();

        let playing = state.begin_playing();
        state.touch_at(Instant::now() - ms(50));
        assert_eq!(monitor.check(&state, &queue, &engine), IdleOutcome::default());
        assert!(engine.is_loaded());
        assert!(!state.exit_requested());

        drop(playing);
        state.touch_at(Instant::now() - ms(50));
        let outcome = monitor.check(&state, &queue, &engine);
        assert!(outcome.released_engine);
        assert!(outcome.requested_exit);
    }

    #[test]
    fn test_exit_requires_prior_speech() {
        let monitor = IdleMonitor::new(ms(60), Some(ms(120)));
        let engine = loaded_engine();
        let queue = ClipQueue::new();
        let state = idle_state(ms(500));

        let outcome = monitor.check(&state, &queue, &engine);
        assert!(outcome.released_engine);
        assert!(!outcome.requested_exit);
        assert!(!state.exit_requested());

        state.mark_spoken();
        let outcome = monitor.check(&state, &queue, &engine);
        assert!(outcome.requested_exit);
        assert!(state.exit_requested());
    }

    #[test]
    fn test_exit_disabled() {
        let monitor = IdleMonitor::new(ms(60), None);
        let state = idle_state(ms(1_000));
        state.mark_spoken();
        monitor.check(&state, &ClipQueue::new(), &loaded_engine());
        assert!(!state.exit_requested());
    }
}
