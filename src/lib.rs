//! A local text-to-speech daemon driven through named pipes.
//!
//! Lines written to the input FIFO are split into sentences, synthesized
//! one by one and played in short chunks so that writing the interrupt
//! command silences playback almost immediately. Sentences cut off that way
//! are echoed to the output FIFO.

pub mod audio;
pub mod backends;
pub mod config_loader;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod fifo;
pub mod idle;
pub mod ingest;
pub mod playback;
pub mod queue;
pub mod segmenter;
pub mod service;
pub mod state;
pub mod voice;

pub use config_loader::Settings;
pub use service::TtsService;
