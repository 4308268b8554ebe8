//! Audio output: a blocking, chunk-at-a-time sink over `rodio`.

use crate::error::AudioError;
use rodio::buffer::SamplesBuffer;
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{OutputStream, OutputStreamHandle, Sink, StreamError};
use std::thread;
use std::time::{Duration, Instant};

/// Chunks allowed in the device queue (playing + waiting). Kept small so a
/// truncated clip goes silent within about one chunk.
const MAX_QUEUED_CHUNKS: usize = 2;
const WRITE_POLL: Duration = Duration::from_millis(2);
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// An open output stream accepting mono `f32` samples in order.
pub trait AudioSink {
    /// Blocks until the device can take `chunk`, then queues it.
    fn write(&mut self, chunk: &[f32]) -> Result<(), AudioError>;

    /// Blocks until everything written so far has been played.
    fn drain(&mut self) -> Result<(), AudioError>;
}

/// Opens sinks. Lives on the playback thread; the sinks it opens never leave
/// that thread.
pub trait AudioOutput: Send {
    fn open(&mut self, sample_rate: u32) -> Result<Box<dyn AudioSink>, AudioError>;
}

/// The default output device, or the one named in `service.output_device`.
pub struct RodioOutput {
    device_name: Option<String>,
}

impl RodioOutput {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn open_stream(&self) -> Result<(OutputStream, OutputStreamHandle), AudioError> {
        let Some(name) = &self.device_name else {
            return OutputStream::try_default().map_err(stream_error);
        };

        let devices = rodio::cpal::default_host()
            .output_devices()
            .map_err(|e| AudioError::Stream(e.to_string()))?;
        for device in devices {
            if device.name().map(|n| &n == name).unwrap_or(false) {
                return OutputStream::try_from_device(&device).map_err(stream_error);
            }
        }
        Err(AudioError::DeviceNotFound(name.clone()))
    }
}

fn stream_error(e: StreamError) -> AudioError {
    match e {
        StreamError::NoDevice => AudioError::NoOutputDevice,
        other => AudioError::Stream(other.to_string()),
    }
}

impl AudioOutput for RodioOutput {
    fn open(&mut self, sample_rate: u32) -> Result<Box<dyn AudioSink>, AudioError> {
        let (stream, handle) = self.open_stream()?;
        let sink = Sink::try_new(&handle).map_err(|e| AudioError::Stream(e.to_string()))?;
        tracing::debug!(sample_rate, "Audio output opened");
        Ok(Box::new(RodioSink {
            _stream: stream,
            sink,
            sample_rate,
        }))
    }
}

struct RodioSink {
    // Audio stream must stay alive as long as the sink
    _stream: OutputStream,
    sink: Sink,
    sample_rate: u32,
}

impl AudioSink for RodioSink {
    fn write(&mut self, chunk: &[f32]) -> Result<(), AudioError> {
        let started = Instant::now();
        while self.sink.len() >= MAX_QUEUED_CHUNKS {
            if started.elapsed() > STALL_TIMEOUT {
                return Err(AudioError::Playback("output device stalled".into()));
            }
            thread::sleep(WRITE_POLL);
        }
        self.sink
            .append(SamplesBuffer::new(1, self.sample_rate, chunk.to_vec()));
        Ok(())
    }

    fn drain(&mut self) -> Result<(), AudioError> {
        self.sink.sleep_until_end();
        Ok(())
    }
}
