use crate::fifo::{is_no_listener, open_writer_nonblocking};
use std::io::Write;
use std::path::PathBuf;

/// Receives sentences that were cut off before they finished playing.
pub trait FeedbackSink: Send + Sync {
    /// Best effort; never fails the caller.
    fn report(&self, sentence: &str);
}

/// Writes each interrupted sentence as one line to the output FIFO.
pub struct FeedbackReporter {
    path: PathBuf,
}

impl FeedbackReporter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl FeedbackSink for FeedbackReporter {
    fn report(&self, sentence: &str) {
        let result = open_writer_nonblocking(&self.path)
            .and_then(|mut fifo| fifo.write_all(format!("{sentence}\n").as_bytes()));

        match result {
            Ok(()) => tracing::debug!(sentence, "Reported interrupted sentence"),
            Err(e) if is_no_listener(&e) => {
                tracing::debug!("No listener on output FIFO. Skipping feedback write.")
            }
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to write to output FIFO"
            ),
        }
    }
}
