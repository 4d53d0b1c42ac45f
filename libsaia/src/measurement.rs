use serde::{Deserialize, Serialize};
use std::path::Path;

/// The scalar features extracted from one image.
///
/// `atom_present` is not stored here: it depends on the threshold of the histogram
/// the record belongs to, see SignalHistogram::classify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// The counter value embedded in the file name at capture time
    pub file_id: String,
    /// ROI pixel sum (or maximum, depending on the signal mode)
    pub signal: f64,
    /// Largest pixel value in the full image
    pub max_count: f64,
    /// Column of the brightest pixel
    pub centroid_x: usize,
    /// Row of the brightest pixel
    pub centroid_y: usize,
    pub background_mean: f64,
    pub background_std: f64,
}

/// Extract the file id from an image name following `[species]_[date]_[counter].[ext]`.
///
/// This is the text after the last underscore and before the first dot. Names without an
/// underscore yield their stem.
pub fn file_id_from_path(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tail = name.rsplit('_').next().unwrap_or(&name);
    tail.split('.').next().unwrap_or(tail).to_string()
}

/// Mean and sample standard deviation (divisor N - 1).
///
/// An empty slice gives (0, 0) and a single value has a standard deviation of 0.
pub fn sample_mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if n < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (mean, var.sqrt())
}
