use std::time::Duration;

/// Number of record slots reserved when a SignalHistogram is created
pub const INITIAL_RECORD_CAPACITY: usize = 10000;
/// Number of record slots added each time the reserved storage runs out
pub const RECORD_GROWTH_BLOCK: usize = 10000;

/// Base number of automatic bins; one more bin is added per AUTO_BIN_IMAGES_PER_BIN images
pub const AUTO_BIN_BASE: usize = 20;
pub const AUTO_BIN_IMAGES_PER_BIN: usize = 20;
pub const MIN_BIN_COUNT: usize = 2;

/// Cap on the number of separation increases tried by the peak search
pub const MAX_PEAK_SEARCH_ITERATIONS: usize = 50;

/// Number of thresholds sampled between the two peaks when maximising fidelity
pub const DEFAULT_FIDELITY_SAMPLES: usize = 100;

/// Levenberg-Marquardt settings for the Gaussian peak fits
pub const GAUSSIAN_FIT_MAX_ITERATIONS: usize = 100;
pub const GAUSSIAN_FIT_INITIAL_DAMPING: f64 = 1e-3;
pub const GAUSSIAN_FIT_MAX_DAMPING: f64 = 1e10;
/// Stop once a step improves the sum of squares by less than this fraction
pub const GAUSSIAN_FIT_TOLERANCE: f64 = 1e-12;

/// FWHM = 2 sqrt(2 ln 2) sigma for a normal distribution
pub const FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949;

/// One standard deviation either side of the median of a normal distribution
pub const ONE_SIGMA_LOWER_QUANTILE: f64 = 0.158_655_253_931_457;
pub const ONE_SIGMA_UPPER_QUANTILE: f64 = 0.841_344_746_068_543;

/// Delay before the single retry of an image read that came back empty or ragged
pub const IMAGE_READ_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Interval between file size polls while waiting for a write or copy to settle
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_COPY_TIMEOUT_MS: u64 = 5000;

/// The external counter file is usually rewritten within ~10 ms
pub const DEFAULT_COUNTER_RETRY_MS: u64 = 1;
pub const DEFAULT_COUNTER_MAX_ATTEMPTS: u32 = 1000;

/// Pauses before retrying a copy or a delete that hit a file still held by the camera software
pub const DEFAULT_COPY_RETRY_MS: u64 = 200;
pub const DEFAULT_DELETE_RETRY_MS: u64 = 500;

/// How often the watcher worker checks its stop flag when no events arrive
pub const WATCHER_STOP_CHECK_INTERVAL: Duration = Duration::from_millis(50);

pub const DEFAULT_SPECIES_LABEL: &str = "Cs-133";
pub const LOG_FILE_NAME: &str = "saia.log";
