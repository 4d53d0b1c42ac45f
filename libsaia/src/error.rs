use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::watch_event::IngestStatus;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Image file {0:?} was not ready to be read (empty or partially written)")]
    FileNotReady(PathBuf),
    #[error("Image file {path:?} contains a value that is not a number: {token:?}")]
    BadValue { path: PathBuf, token: String },
    #[error("Image file {path:?} has shape {rows}x{cols}, smaller than the configured pic size {pic_size}")]
    ShapeMismatch {
        path: PathBuf,
        rows: usize,
        cols: usize,
        pic_size: usize,
    },
    #[error("ROI centred at ({center_x}, {center_y}) with size {size} does not fit inside a {rows}x{cols} image")]
    InvalidRoi {
        center_x: usize,
        center_y: usize,
        size: usize,
        rows: usize,
        cols: usize,
    },
    #[error("Image failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Clone, Error)]
pub enum PeakError {
    #[error("Peak search failed: found {found} peaks after {iterations} separation increases")]
    PeakSearchFailed { found: usize, iterations: usize },
}

#[derive(Debug, Clone, Error)]
pub enum FidelityError {
    #[error("Fidelity is undefined: background and signal peaks coincide at {0}")]
    DegenerateModel(f64),
    #[error("Fidelity search needs at least one sample")]
    NoSamples,
}

#[derive(Debug, Clone, Error)]
pub enum HistogramError {
    #[error("Histogram has no records")]
    Empty,
    #[error("Fixed bin edges must contain at least two strictly increasing values")]
    BadBinEdges,
    #[error("Histogram failed due to peak search error: {0}")]
    PeakError(#[from] PeakError),
    #[error("Histogram failed due to fidelity error: {0}")]
    FidelityError(#[from] FidelityError),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Histogram export failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Histogram export failed due to CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Histogram file {0:?} does not start with a threshold header line")]
    MissingThreshold(PathBuf),
}

#[derive(Debug, Error)]
pub enum CounterSyncError {
    #[error("External counter file {path:?} was empty or unreadable after {attempts} attempts")]
    ExternalCounterUnavailable { path: PathBuf, attempts: u32 },
}

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("File {path:?} was still being written after {waited:?}")]
    WriteTimeout { path: PathBuf, waited: Duration },
    #[error("Copy to {path:?} was still settling after {waited:?}")]
    CopyTimeout { path: PathBuf, waited: Duration },
    #[error("Watcher failed due to counter sync error: {0}")]
    CounterError(#[from] CounterSyncError),
    #[error("A watcher is already active for storage directory {0:?}")]
    AlreadyActive(PathBuf),
    #[error("Watcher failed due to notify error: {0}")]
    NotifyError(#[from] notify::Error),
    #[error("Watcher failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Watcher worker thread panicked")]
    WorkerPanicked,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Image error: {0}")]
    ImageError(#[from] ImageError),
    #[error("Processor failed due to Histogram error: {0}")]
    HistogramError(#[from] HistogramError),
    #[error("Processor failed due to Export error: {0}")]
    ExportError(#[from] ExportError),
    #[error("Processor failed due to Watcher error: {0}")]
    WatcherError(#[from] WatcherError),
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<IngestStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
