//! Drains the clip queue into the audio device in short chunks so an
//! interrupt takes effect mid-sentence.

use crate::audio::AudioOutput;
use crate::engine::EngineHandle;
use crate::feedback::FeedbackSink;
use crate::idle::IdleMonitor;
use crate::queue::{AudioClip, ClipQueue};
use crate::state::PlayerState;
use std::sync::Arc;
use std::time::Duration;

pub const CHUNK_DURATION: Duration = Duration::from_millis(30);
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(100);

/// Samples per chunk at `sample_rate`, never zero.
pub fn chunk_len(sample_rate: u32) -> usize {
    let len = u64::from(sample_rate) * CHUNK_DURATION.as_millis() as u64 / 1000;
    len.max(1) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    Completed,
    /// Stopped before the last chunk; the sentence was reported.
    Truncated,
    /// The device failed; the clip is dropped.
    Failed,
}

pub struct PlaybackTask {
    pub(crate) state: Arc<PlayerState>,
    pub(crate) queue: Arc<ClipQueue>,
    pub(crate) engine: Arc<EngineHandle>,
    pub(crate) idle: IdleMonitor,
    pub(crate) feedback: Arc<dyn FeedbackSink>,
    pub(crate) output_rate: u32,
}

impl PlaybackTask {
    pub fn run(&self, mut output: Box<dyn AudioOutput>) {
        while self.state.is_running() {
            if self.state.is_interrupted() {
                let dropped = self.queue.clear();
                self.state.clear_interrupt();
                self.state.touch();
                if dropped > 0 {
                    tracing::info!(dropped, "Cleared queued audio");
                }
                continue;
            }

            if self.queue.is_empty() && !self.state.is_busy() {
                self.idle.check(&self.state, &self.queue, &self.engine);
            }

            if let Some(clip) = self.queue.pop_timeout(DEQUEUE_TIMEOUT) {
                self.play(output.as_mut(), &clip);
            }
        }
        tracing::debug!("Playback task finished");
    }

    /// Plays one clip at the configured output rate.
    pub fn play(&self, output: &mut dyn AudioOutput, clip: &AudioClip) -> PlayOutcome {
        tracing::info!(sentence = %clip.source_sentence, "Playing audio");
        let _playing = self.state.begin_playing();
        let mut sink = match output.open(self.output_rate) {
            Ok(sink) => sink,
            Err(e) => {
                tracing::error!(sentence = %clip.source_sentence, error = %e, "Error playing audio");
                return PlayOutcome::Failed;
            }
        };

        for chunk in clip.samples.chunks(chunk_len(self.output_rate)) {
            if self.state.is_interrupted() || !self.state.is_running() {
                tracing::info!(sentence = %clip.source_sentence, "Playback interrupted");
                self.feedback.report(&clip.source_sentence);
                return PlayOutcome::Truncated;
            }
            if let Err(e) = sink.write(chunk) {
                tracing::error!(sentence = %clip.source_sentence, error = %e, "Error playing audio");
                return PlayOutcome::Failed;
            }
        }

        if let Err(e) = sink.drain() {
            tracing::warn!(error = %e, "Audio drain failed");
        }
        self.state.mark_spoken();
        PlayOutcome::Completed
    }
}
