use std::path::PathBuf;
use std::time::Duration;

/// Durations of the stages of one watcher event
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EventTimings {
    /// Time between the end of the previous event and the start of this one
    pub idle: Duration,
    /// Total time spent handling this event
    pub event: Duration,
    /// Time spent waiting for the camera software to finish writing
    pub write: Duration,
    /// Time spent copying and waiting for the copy to settle
    pub copy: Duration,
}

/// Message sent by the directory watcher for each new file
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// A fully written image is ready at `path` (the stored copy, or the original for a
    /// silent watcher)
    ImageReady { path: PathBuf, timings: EventTimings },
    /// Handling the new file at `path` failed; the watcher carries on with the next file
    Failed { path: PathBuf, reason: String },
}

/// Message sent by the acquisition loop after each image is added to the histogram
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestStatus {
    pub images_processed: usize,
    pub file_id: String,
    pub signal: f64,
    pub atom_present: bool,
    pub threshold: f64,
}

impl IngestStatus {
    pub fn new(
        images_processed: usize,
        file_id: String,
        signal: f64,
        atom_present: bool,
        threshold: f64,
    ) -> Self {
        Self {
            images_processed,
            file_id,
            signal,
            atom_present,
            threshold,
        }
    }
}
