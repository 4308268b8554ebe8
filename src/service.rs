//! Wires the shared state, the two worker threads and shutdown together.

use crate::audio::AudioOutput;
use crate::backends::BackendLoader;
use crate::config_loader::Settings;
use crate::engine::EngineHandle;
use crate::error::ConfigError;
use crate::feedback::FeedbackSink;
use crate::fifo::{self, FifoPaths};
use crate::idle::IdleMonitor;
use crate::ingest::IngestTask;
use crate::playback::PlaybackTask;
use crate::queue::ClipQueue;
use crate::state::PlayerState;
use crate::voice::VoiceSelector;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Upper bound on waiting for each worker thread during shutdown.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(5);
const JOIN_POLL: Duration = Duration::from_millis(20);

pub struct TtsService {
    state: Arc<PlayerState>,
    queue: Arc<ClipQueue>,
    engine: Arc<EngineHandle>,
    idle: IdleMonitor,
    voices: VoiceSelector,
    lang: String,
    interrupt_command: String,
    output_rate: u32,
    fifos: FifoPaths,
    workers: Vec<JoinHandle<()>>,
}

impl TtsService {
    pub fn new(
        settings: &Settings,
        fifos: FifoPaths,
        loader: Box<dyn BackendLoader>,
    ) -> Result<Self, ConfigError> {
        let service = &settings.service;
        let exit_timeout = service.exit_on_idle.then(|| service.exit_timeout());
        Ok(Self {
            state: Arc::new(PlayerState::new()),
            queue: Arc::new(ClipQueue::new()),
            engine: Arc::new(EngineHandle::new(loader, service.sample_rate)),
            idle: IdleMonitor::new(service.idle_timeout(), exit_timeout),
            voices: VoiceSelector::from_settings(&settings.kokoro)?,
            lang: settings.kokoro.lang.clone(),
            interrupt_command: service.interrupt_command.clone(),
            output_rate: service.sample_rate,
            fifos,
            workers: Vec::new(),
        })
    }

    pub fn state(&self) -> Arc<PlayerState> {
        self.state.clone()
    }

    pub fn queue(&self) -> Arc<ClipQueue> {
        self.queue.clone()
    }

    pub fn engine(&self) -> Arc<EngineHandle> {
        self.engine.clone()
    }

    /// Marks the service running and spawns the ingest and playback threads.
    pub fn start(
        &mut self,
        output: Box<dyn AudioOutput>,
        feedback: Arc<dyn FeedbackSink>,
    ) -> io::Result<()> {
        if self.state.is_running() {
            return Ok(());
        }
        self.state.start();

        let ingest = IngestTask {
            state: self.state.clone(),
            queue: self.queue.clone(),
            engine: self.engine.clone(),
            idle: self.idle,
            voices: self.voices.clone(),
            lang: self.lang.clone(),
            interrupt_command: self.interrupt_command.clone(),
            input: self.fifos.input.clone(),
        };
        let playback = PlaybackTask {
            state: self.state.clone(),
            queue: self.queue.clone(),
            engine: self.engine.clone(),
            idle: self.idle,
            feedback,
            output_rate: self.output_rate,
        };

        let spawned = thread::Builder::new()
            .name("tts-ingest".into())
            .spawn(move || ingest.run())
            .and_then(|ingest| {
                self.workers.push(ingest);
                thread::Builder::new()
                    .name("tts-playback".into())
                    .spawn(move || playback.run(output))
            });
        match spawned {
            Ok(playback) => {
                self.workers.push(playback);
                tracing::info!(input = %self.fifos.input.display(), "TTS service started");
                Ok(())
            }
            Err(e) => {
                self.stop();
                Err(e)
            }
        }
    }

    /// Stops both threads, drops pending audio and releases the engine.
    /// Each thread gets at most [`JOIN_TIMEOUT`]; a thread that overruns it
    /// is left detached.
    pub fn stop(&mut self) {
        self.state.stop();
        fifo::wake_reader(&self.fifos.input);

        for worker in self.workers.drain(..) {
            let name = worker.thread().name().unwrap_or("worker").to_string();
            let deadline = Instant::now() + JOIN_TIMEOUT;
            while !worker.is_finished() && Instant::now() < deadline {
                thread::sleep(JOIN_POLL);
            }
            if worker.is_finished() {
                if worker.join().is_err() {
                    tracing::error!(thread = %name, "Worker thread panicked");
                }
            } else {
                tracing::warn!(thread = %name, "Worker did not stop in time; detaching");
            }
        }

        let dropped = self.queue.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "Discarded queued audio on shutdown");
        }
        self.engine.release();
    }
}

impl Drop for TtsService {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.stop();
        }
    }
}
