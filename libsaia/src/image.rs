use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::config::ImageConfig;
use super::constants::IMAGE_READ_RETRY_DELAY;
use super::error::ImageError;
use super::measurement::{file_id_from_path, sample_mean_std, MeasurementRecord};
use super::roi::Roi;

/// How the per-image signal is taken from the ROI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalMode {
    /// Sum of all pixels in the ROI
    #[default]
    Sum,
    /// Brightest pixel in the ROI
    Max,
}

/// Reads ASCII camera images and turns them into MeasurementRecords.
///
/// Images are grids of numbers separated by whitespace and/or commas, one image row per
/// line. Some camera software writes the row number as the first column; set
/// `strip_index_column` to drop it.
#[derive(Debug, Clone)]
pub struct ImageLoader {
    strip_index_column: bool,
    pic_size: Option<usize>,
    roi: Option<Roi>,
    signal_mode: SignalMode,
    retry_delay: Duration,
}

impl ImageLoader {
    pub fn new(config: &ImageConfig) -> Self {
        Self {
            strip_index_column: config.strip_index_column,
            pic_size: config.pic_size,
            roi: config.roi,
            signal_mode: config.signal_mode,
            retry_delay: IMAGE_READ_RETRY_DELAY,
        }
    }

    pub fn roi(&self) -> Option<Roi> {
        self.roi
    }

    pub fn set_roi(&mut self, roi: Option<Roi>) {
        self.roi = roi;
    }

    pub fn set_pic_size(&mut self, pic_size: Option<usize>) {
        self.pic_size = pic_size;
    }

    /// Load an image file into a 2-D array (rows x columns).
    ///
    /// A file that shows up in the directory before the camera software has finished writing
    /// it reads as empty or ragged. The read is retried once after a short pause before the
    /// error is returned. An IO error on a file that still exists (e.g. locked by the writer)
    /// is reported as FileNotReady; IOError means the file could not be read at all.
    pub fn load_image(&self, path: &Path) -> Result<Array2<f64>, ImageError> {
        match self.read_grid(path) {
            Ok(image) => Ok(image),
            Err(e) => {
                spdlog::debug!(
                    "First read of {} failed ({e}), retrying in {:?}",
                    path.display(),
                    self.retry_delay
                );
                std::thread::sleep(self.retry_delay);
                match self.read_grid(path) {
                    Err(ImageError::IOError(e)) if path.is_file() => {
                        spdlog::debug!("Second read of {} failed: {e}", path.display());
                        Err(ImageError::FileNotReady(path.to_path_buf()))
                    }
                    result => result,
                }
            }
        }
    }

    /// Load an image and extract its measurement record
    pub fn measure(&self, path: &Path) -> Result<MeasurementRecord, ImageError> {
        let image = self.load_image(path)?;
        self.measure_array(&image, file_id_from_path(path))
    }

    /// Extract the measurement record from an already loaded image
    pub fn measure_array(
        &self,
        image: &Array2<f64>,
        file_id: String,
    ) -> Result<MeasurementRecord, ImageError> {
        let (n_rows, n_cols) = image.dim();
        let (max_count, centroid_y, centroid_x) = brightest_pixel(image);

        let (signal, background) = match self.roi {
            Some(roi) => {
                let bounds = roi.resolve(n_rows, n_cols)?;
                let region = image.slice(s![bounds.rows.clone(), bounds.cols.clone()]);
                let signal = match self.signal_mode {
                    SignalMode::Sum => region.sum(),
                    SignalMode::Max => region.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v)),
                };
                let background: Vec<f64> = image
                    .indexed_iter()
                    .filter(|((row, col), _)| !bounds.contains(*row, *col))
                    .map(|(_, &v)| v)
                    .collect();
                (signal, background)
            }
            // No ROI: the whole image is both the signal region and the background sample
            None => {
                let signal = match self.signal_mode {
                    SignalMode::Sum => image.sum(),
                    SignalMode::Max => max_count,
                };
                (signal, image.iter().copied().collect())
            }
        };
        let (background_mean, background_std) = sample_mean_std(&background);

        Ok(MeasurementRecord {
            file_id,
            signal,
            max_count,
            centroid_x,
            centroid_y,
            background_mean,
            background_std,
        })
    }

    /// Number of image columns in a reference file, after removing the index column
    pub fn detect_pic_size(&self, path: &Path) -> Result<usize, ImageError> {
        let image = self.load_image(path)?;
        Ok(image.ncols())
    }

    /// Build a ROI of the given size centred on the brightest pixel of a reference image.
    ///
    /// The reference image is presumed to contain an atom.
    pub fn roi_centred_on_max(&self, path: &Path, size: usize) -> Result<Roi, ImageError> {
        let image = self.load_image(path)?;
        let (_, row, col) = brightest_pixel(&image);
        let roi = Roi::new(col, row, size);
        roi.resolve(image.nrows(), image.ncols())?;
        Ok(roi)
    }

    /// A single read attempt
    fn read_grid(&self, path: &Path) -> Result<Array2<f64>, ImageError> {
        let contents = std::fs::read_to_string(path)?;
        let mut rows: Vec<Vec<f64>> = Vec::new();
        for line in contents.lines() {
            let mut values = Vec::new();
            let tokens = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|t| !t.is_empty())
                .skip(usize::from(self.strip_index_column));
            for token in tokens {
                let value = token.parse::<f64>().map_err(|_| ImageError::BadValue {
                    path: path.to_path_buf(),
                    token: token.to_string(),
                })?;
                values.push(value);
            }
            if !values.is_empty() {
                rows.push(values);
            }
        }

        let n_cols = match rows.first() {
            Some(row) => row.len(),
            None => return Err(ImageError::FileNotReady(path.to_path_buf())),
        };
        if rows.iter().any(|row| row.len() != n_cols) {
            return Err(ImageError::FileNotReady(path.to_path_buf()));
        }

        let (n_rows, n_cols) = match self.pic_size {
            Some(pic_size) => {
                if rows.len() < pic_size || n_cols < pic_size {
                    return Err(ImageError::ShapeMismatch {
                        path: path.to_path_buf(),
                        rows: rows.len(),
                        cols: n_cols,
                        pic_size,
                    });
                }
                (pic_size, pic_size)
            }
            None => (rows.len(), n_cols),
        };

        let flat: Vec<f64> = rows
            .into_iter()
            .take(n_rows)
            .flat_map(|row| row.into_iter().take(n_cols))
            .collect();
        Array2::from_shape_vec((n_rows, n_cols), flat)
            .map_err(|_| ImageError::FileNotReady(path.to_path_buf()))
    }
}

/// Value, row and column of the first brightest pixel in row-major order
fn brightest_pixel(image: &Array2<f64>) -> (f64, usize, usize) {
    let mut best = (f64::NEG_INFINITY, 0, 0);
    for ((row, col), &value) in image.indexed_iter() {
        if value > best.0 {
            best = (value, row, col);
        }
    }
    best
}
