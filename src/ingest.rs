//! Reads lines from the input FIFO and turns them into queued clips.

use crate::engine::EngineHandle;
use crate::error::FifoError;
use crate::fifo;
use crate::idle::IdleMonitor;
use crate::queue::ClipQueue;
use crate::segmenter::segment;
use crate::state::PlayerState;
use crate::voice::VoiceSelector;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Pause after a read that returned no text (writer detached or blank line).
pub const EMPTY_READ_BACKOFF: Duration = Duration::from_millis(250);
/// How long to wait for playback to acknowledge an interrupt.
pub const INTERRUPT_ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// What one input line turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Blank,
    Interrupt,
    /// Number of clips enqueued; failed or aborted sentences are not counted.
    Spoken(usize),
}

pub struct IngestTask {
    pub(crate) state: Arc<PlayerState>,
    pub(crate) queue: Arc<ClipQueue>,
    pub(crate) engine: Arc<EngineHandle>,
    pub(crate) idle: IdleMonitor,
    pub(crate) voices: VoiceSelector,
    pub(crate) lang: String,
    pub(crate) interrupt_command: String,
    pub(crate) input: PathBuf,
}

impl IngestTask {
    /// Opens the input FIFO and processes lines until stopped. Failing to
    /// open or read the pipe stops the whole service.
    pub fn run(&self) {
        let file = match fifo::open_reader(&self.input) {
            Ok(file) => file,
            Err(FifoError::Missing(path)) => {
                tracing::error!(path = %path.display(), "FIFO file not found");
                self.state.stop();
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error opening input FIFO");
                self.state.stop();
                return;
            }
        };
        self.run_with(BufReader::new(file));
    }

    pub fn run_with<R: BufRead>(&self, mut reader: R) {
        let mut buf = Vec::new();
        while self.state.is_running() {
            buf.clear();
            if let Err(e) = reader.read_until(b'\n', &mut buf) {
                tracing::error!(path = %self.input.display(), error = %e, "Error reading from FIFO");
                self.state.stop();
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            if self.handle_line(&line) == LineOutcome::Blank {
                self.idle.check(&self.state, &self.queue, &self.engine);
                thread::sleep(EMPTY_READ_BACKOFF);
            }
        }
        tracing::debug!("Ingest task finished");
    }

    pub fn handle_line(&self, line: &str) -> LineOutcome {
        let text = line.trim();
        if text.is_empty() {
            return LineOutcome::Blank;
        }

        self.state.touch();
        if text == self.interrupt_command {
            tracing::info!("Interrupt signal received");
            self.interrupt();
            return LineOutcome::Interrupt;
        }

        LineOutcome::Spoken(self.speak(text))
    }

    fn interrupt(&self) {
        self.state.interrupt();
        // Text arriving after the interrupt must not be flushed by it, so
        // wait for playback to finish the flush before reading on.
        if !self.state.wait_interrupt_cleared(INTERRUPT_ACK_TIMEOUT) && self.state.is_running() {
            let dropped = self.queue.clear();
            self.state.clear_interrupt();
            tracing::warn!(dropped, "Playback did not acknowledge interrupt; flushed queue");
        }
    }

    fn speak(&self, text: &str) -> usize {
        let mut enqueued = 0;
        for sentence in segment(text) {
            if self.cancelled() {
                tracing::info!("Aborting remaining sentences");
                break;
            }

            let voice = self.voices.select();
            tracing::info!(sentence, voice = %voice.voice, "Generating audio");
            let result = {
                let _generating = self.state.begin_generating();
                self.engine.synthesize(sentence, voice, &self.lang)
            };

            match result {
                Ok(clip) if !self.cancelled() => {
                    self.queue.push(clip);
                    enqueued += 1;
                }
                Ok(_) => tracing::debug!(sentence, "Dropping clip synthesized during interrupt"),
                Err(e) => tracing::error!(sentence, error = %e, "Error generating audio"),
            }
        }
        enqueued
    }

    fn cancelled(&self) -> bool {
        !self.state.is_running() || self.state.is_interrupted()
    }
}
