//! Error types for the service.

use std::path::PathBuf;

/// Errors raised while loading or validating the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised by the synthesis engine.
#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    /// The engine could not be constructed (model load failed).
    #[error("Failed to load synthesis engine: {0}")]
    Load(String),

    /// Model or voices file missing on disk.
    #[error("Model file not found at {0}")]
    ModelNotFound(PathBuf),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("Synthesis timed out after {0}s")]
    Timeout(u64),

    #[error("Failed to decode synthesized audio: {0}")]
    Decode(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the audio output device.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("No audio output device found")]
    NoOutputDevice,

    #[error("Output device '{0}' not found")]
    DeviceNotFound(String),

    #[error("Failed to open audio output stream: {0}")]
    Stream(String),

    #[error("Playback failed: {0}")]
    Playback(String),
}

/// Errors raised while creating or opening the named pipes.
#[derive(Debug, thiserror::Error)]
pub enum FifoError {
    #[error("Failed to create FIFO at {path}: {source}")]
    Create {
        path: PathBuf,
        source: nix::errno::Errno,
    },

    #[error("{0} exists but is not a FIFO")]
    NotAFifo(PathBuf),

    #[error("FIFO not found: {0}")]
    Missing(PathBuf),

    #[error("Failed to open FIFO {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
}
