use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;

use super::constants::*;
use super::error::ConfigError;
use super::histogram::ThresholdMethod;
use super::image::SignalMode;
use super::roi::Roi;

/// Settings for reading images and extracting their signal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Drop the first number of each row (the row index written by some camera software)
    pub strip_index_column: bool,
    /// Crop images to pic_size x pic_size. None uses the size found in each file
    pub pic_size: Option<usize>,
    /// None takes the whole image as the signal region
    pub roi: Option<Roi>,
    pub signal_mode: SignalMode,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            strip_index_column: true,
            pic_size: None,
            roi: None,
            signal_mode: SignalMode::Sum,
        }
    }
}

/// Settings for binning and thresholding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramConfig {
    /// Bin edges to reuse for every histogram. None bins automatically
    pub fixed_bins: Option<Vec<f64>>,
    /// Number of automatic bins. None grows the count with the number of images
    pub auto_bin_count: Option<usize>,
    pub threshold_method: ThresholdMethod,
    /// Pins the threshold; automatic estimation is skipped while set
    pub manual_threshold: Option<f64>,
    pub fidelity_samples: usize,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            fixed_bins: None,
            auto_bin_count: None,
            threshold_method: ThresholdMethod::MaxFidelity,
            manual_threshold: None,
            fidelity_samples: DEFAULT_FIDELITY_SAMPLES,
        }
    }
}

/// Polling, timeout and retry settings of the directory watcher, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub poll_interval_ms: u64,
    pub write_timeout_ms: u64,
    pub copy_timeout_ms: u64,
    pub counter_retry_ms: u64,
    pub counter_max_attempts: u32,
    pub copy_retry_ms: u64,
    pub delete_retry_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            copy_timeout_ms: DEFAULT_COPY_TIMEOUT_MS,
            counter_retry_ms: DEFAULT_COUNTER_RETRY_MS,
            counter_max_attempts: DEFAULT_COUNTER_MAX_ATTEMPTS,
            copy_retry_ms: DEFAULT_COPY_RETRY_MS,
            delete_retry_ms: DEFAULT_DELETE_RETRY_MS,
        }
    }
}

impl WatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn copy_timeout(&self) -> Duration {
        Duration::from_millis(self.copy_timeout_ms)
    }

    pub fn counter_retry(&self) -> Duration {
        Duration::from_millis(self.counter_retry_ms)
    }

    pub fn copy_retry(&self) -> Duration {
        Duration::from_millis(self.copy_retry_ms)
    }

    pub fn delete_retry(&self) -> Duration {
        Duration::from_millis(self.delete_retry_ms)
    }
}

/// Structure representing the application configuration. Contains pathing and analysis settings.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the dated directories new images are copied into
    pub image_storage_path: PathBuf,
    pub log_file_path: PathBuf,
    /// Text file holding the latest file number of the experiment control software
    pub dexter_sync_file: PathBuf,
    /// Directory the camera software writes new images to
    pub image_read_path: PathBuf,
    /// Default directory for saved histograms
    pub results_path: PathBuf,
    /// Copy, rename and delete new images. If false, only report them
    pub active_watcher: bool,
    pub species_label: String,
    pub image: ImageConfig,
    pub histogram: HistogramConfig,
    pub watcher: WatcherConfig,
}

impl Default for Config {
    /// Generate a new Config object. All paths will be empty/invalid
    fn default() -> Self {
        Self {
            image_storage_path: PathBuf::from("None"),
            log_file_path: PathBuf::from("None"),
            dexter_sync_file: PathBuf::from("None"),
            image_read_path: PathBuf::from("None"),
            results_path: PathBuf::from("None"),
            active_watcher: true,
            species_label: String::from(DEFAULT_SPECIES_LABEL),
            image: ImageConfig::default(),
            histogram: HistogramConfig::default(),
            watcher: WatcherConfig::default(),
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    /// Check the paths needed to start acquisition. Only meant to be called at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.image_read_path.is_dir() {
            return Err(ConfigError::BadFilePath(self.image_read_path.clone()));
        }
        if self.active_watcher && !self.dexter_sync_file.is_file() {
            return Err(ConfigError::BadFilePath(self.dexter_sync_file.clone()));
        }
        if self.is_sync_file_watched() {
            spdlog::warn!(
                "The sync file {} is inside the watched directory {}; every update to it will be treated as a new image",
                self.dexter_sync_file.display(),
                self.image_read_path.display()
            );
        }
        Ok(())
    }

    /// The watcher reacts to every new file in the read directory, so the sync file should live elsewhere
    pub fn is_sync_file_watched(&self) -> bool {
        self.dexter_sync_file.parent() == Some(self.image_read_path.as_path())
    }

    /// Get the dated storage directory, `image_storage_path/<year>/<Month>/<day>`
    pub fn get_storage_directory(&self, date: &OffsetDateTime) -> PathBuf {
        self.image_storage_path
            .join(date.year().to_string())
            .join(date.month().to_string())
            .join(format!("{:0>2}", date.day()))
    }

    /// Get the path of the log file inside the log directory
    pub fn get_log_file(&self) -> PathBuf {
        self.log_file_path.join(LOG_FILE_NAME)
    }

    /// Get the path a histogram csv is saved to inside the results directory
    pub fn get_results_file(&self, name: &str) -> PathBuf {
        self.results_path.join(format!("{name}.csv"))
    }
}
