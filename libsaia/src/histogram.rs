use serde::{Deserialize, Serialize};
use statrs::distribution::{Beta, ContinuousCDF};

use super::config::HistogramConfig;
use super::constants::*;
use super::error::{HistogramError, PeakError};
use super::fidelity::{fidelity, search_best_threshold, Fidelity};
use super::gaussian_fit::{fit_gaussian, Gaussian};
use super::measurement::{sample_mean_std, MeasurementRecord};
use super::peak_finder::find_peaks;

/// How bin edges are chosen
#[derive(Debug, Clone, PartialEq)]
pub enum BinMode {
    /// Edges spread evenly between the smallest and largest signal on every rebuild
    Auto,
    /// The same explicit edges every time
    Fixed(Vec<f64>),
}

/// Whether a refresh may move the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdMode {
    Automatic,
    /// Threshold pinned by the user
    Manual,
}

/// How the automatic threshold is placed between the two peaks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMethod {
    Midpoint,
    #[default]
    MaxFidelity,
}

/// Bin edges and the number of signals in each bin
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub occupancy: Vec<u64>,
}

impl Histogram {
    pub fn bin_width(&self, index: usize) -> f64 {
        self.edges[index + 1] - self.edges[index]
    }

    pub fn bin_centre(&self, index: usize) -> f64 {
        0.5 * (self.edges[index] + self.edges[index + 1])
    }
}

/// A histogram peak in signal units. Width is a standard deviation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakEstimate {
    pub position: f64,
    pub height: f64,
    pub width: f64,
}

/// The background peak and, once atoms have been seen, the signal peak
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakModel {
    pub background: PeakEstimate,
    pub signal: Option<PeakEstimate>,
}

/// Outcome of a refresh of the histogram and threshold
#[derive(Debug, Clone)]
pub struct Refresh {
    pub histogram: Histogram,
    pub threshold: f64,
    pub peaks: Option<PeakModel>,
    pub fidelity: Option<Fidelity>,
    /// Why the peak model or threshold could not be updated, if it could not.
    /// The previous threshold is kept in that case.
    pub warning: Option<HistogramError>,
}

/// Statistics of the current histogram, as reported after each run
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSummary {
    pub images_processed: usize,
    pub above_threshold: usize,
    pub below_threshold: usize,
    pub threshold: f64,
    pub loading_probability: f64,
    /// 1 sigma Jeffreys interval around the loading probability
    pub loading_error_lower: f64,
    pub loading_error_upper: f64,
    pub background_mean: f64,
    pub background_std: f64,
    pub signal_mean: f64,
    pub signal_std: f64,
    pub peaks: Option<PeakModel>,
    pub separation: Option<f64>,
    pub signal_to_noise: Option<f64>,
    pub fidelity: Option<Fidelity>,
}

/// Accumulates per-image measurements and sets the atom detection threshold.
///
/// Records live in one growable buffer that is extended a block at a time, so appending in
/// the acquisition loop does not reallocate on every image. Mutation goes through `&mut self`;
/// the acquisition loop owns the histogram and is its only writer.
#[derive(Debug, Clone)]
pub struct SignalHistogram {
    records: Vec<MeasurementRecord>,
    threshold: f64,
    threshold_mode: ThresholdMode,
    threshold_method: ThresholdMethod,
    bin_mode: BinMode,
    auto_bin_count: Option<usize>,
    fidelity_samples: usize,
    peaks: Option<PeakModel>,
    fidelity: Option<Fidelity>,
}

impl Default for SignalHistogram {
    fn default() -> Self {
        Self {
            records: Vec::with_capacity(INITIAL_RECORD_CAPACITY),
            threshold: 1.0,
            threshold_mode: ThresholdMode::Automatic,
            threshold_method: ThresholdMethod::default(),
            bin_mode: BinMode::Auto,
            auto_bin_count: None,
            fidelity_samples: DEFAULT_FIDELITY_SAMPLES,
            peaks: None,
            fidelity: None,
        }
    }
}

impl SignalHistogram {
    /// Create a histogram from the configuration. A manual threshold in the config pins it.
    pub fn new(config: &HistogramConfig) -> Result<Self, HistogramError> {
        let mut hist = Self {
            threshold_method: config.threshold_method,
            auto_bin_count: config.auto_bin_count,
            fidelity_samples: config.fidelity_samples,
            ..Default::default()
        };
        if let Some(edges) = &config.fixed_bins {
            hist.set_fixed_bins(edges.clone())?;
        }
        if let Some(thresh) = config.manual_threshold {
            hist.pin_threshold(thresh);
        }
        Ok(hist)
    }

    pub fn append(&mut self, record: MeasurementRecord) {
        if self.records.len() == self.records.capacity() {
            self.records.reserve_exact(RECORD_GROWTH_BLOCK);
        }
        self.records.push(record);
    }

    /// Forget all records. Storage is kept for reuse.
    pub fn reset(&mut self) {
        self.records.clear();
        self.peaks = None;
        self.fidelity = None;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.records.capacity()
    }

    pub fn records(&self) -> &[MeasurementRecord] {
        &self.records
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn threshold_mode(&self) -> ThresholdMode {
        self.threshold_mode
    }

    pub fn set_threshold_method(&mut self, method: ThresholdMethod) {
        self.threshold_method = method;
    }

    pub fn peaks(&self) -> Option<PeakModel> {
        self.peaks
    }

    pub fn fidelity(&self) -> Option<Fidelity> {
        self.fidelity
    }

    /// Set the threshold by hand and stop automatic updates to it
    pub fn pin_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
        self.threshold_mode = ThresholdMode::Manual;
        self.update_fidelity();
    }

    /// Return to automatic thresholding. The current value stays until the next refresh.
    pub fn unpin_threshold(&mut self) {
        self.threshold_mode = ThresholdMode::Automatic;
    }

    /// Replace the threshold without changing the mode, e.g. when reloading saved data
    pub(crate) fn restore_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    pub fn bin_mode(&self) -> &BinMode {
        &self.bin_mode
    }

    /// Use these bin edges for every histogram until replaced
    pub fn set_fixed_bins(&mut self, edges: Vec<f64>) -> Result<(), HistogramError> {
        if edges.len() < 2 || edges.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(HistogramError::BadBinEdges);
        }
        self.bin_mode = BinMode::Fixed(edges);
        Ok(())
    }

    pub fn set_auto_bins(&mut self, bin_count: Option<usize>) {
        self.bin_mode = BinMode::Auto;
        self.auto_bin_count = bin_count;
    }

    /// True if the signal is at or above the threshold
    pub fn classify(&self, signal: f64) -> bool {
        signal >= self.threshold
    }

    /// Atom presence of each record under the current threshold
    pub fn atom_flags(&self) -> impl Iterator<Item = bool> + '_ {
        self.records.iter().map(|r| self.classify(r.signal))
    }

    /// Histogram of all signals with the current bin mode
    pub fn histogram(&self) -> Result<Histogram, HistogramError> {
        self.histogram_with(&self.bin_mode)
    }

    /// Histogram of all signals with the given bin mode.
    ///
    /// Bins include their lower edge; the last bin also includes its upper edge. Signals
    /// outside fixed edges are not counted.
    pub fn histogram_with(&self, bin_mode: &BinMode) -> Result<Histogram, HistogramError> {
        if self.records.is_empty() {
            return Err(HistogramError::Empty);
        }
        let edges = match bin_mode {
            BinMode::Fixed(edges) => edges.clone(),
            BinMode::Auto => self.auto_edges(),
        };
        let n_bins = edges.len() - 1;
        let first = edges[0];
        let last = edges[n_bins];
        let mut occupancy = vec![0u64; n_bins];
        for record in self.records.iter() {
            let value = record.signal;
            if !(value >= first && value <= last) {
                continue;
            }
            let index = edges.partition_point(|&e| e <= value).min(n_bins) - 1;
            occupancy[index] += 1;
        }
        Ok(Histogram { edges, occupancy })
    }

    fn auto_edges(&self) -> Vec<f64> {
        let n_bins = self
            .auto_bin_count
            .unwrap_or(AUTO_BIN_BASE + self.records.len() / AUTO_BIN_IMAGES_PER_BIN)
            .max(MIN_BIN_COUNT);
        let (mut lo, mut hi) = self
            .records
            .iter()
            .map(|r| r.signal)
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        if !lo.is_finite() {
            (lo, hi) = (0.0, 1.0);
        }
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }
        let width = (hi - lo) / n_bins as f64;
        let mut edges: Vec<f64> = (0..n_bins).map(|i| lo + width * i as f64).collect();
        edges.push(hi);
        edges
    }

    /// Locate the peaks of a histogram and convert them to signal units.
    ///
    /// Each peak found is refined by a Gaussian fit: with two peaks the occupancy is split at
    /// the midpoint between them and each side is fitted separately, with one peak the whole
    /// histogram is fitted. A peak keeps its search estimate when its fit fails, e.g. when it
    /// spans fewer than three bins.
    fn peak_model(histogram: &Histogram) -> Result<PeakModel, PeakError> {
        let search = find_peaks(&histogram.occupancy)?;
        let mut estimates = search.peaks.iter().map(|peak| PeakEstimate {
            position: histogram.bin_centre(peak.index),
            height: peak.height,
            width: peak.width * histogram.bin_width(peak.index),
        });
        let (background, signal) = match (estimates.next(), estimates.next()) {
            (Some(background), signal) => (background, signal),
            (None, _) => {
                return Err(PeakError::PeakSearchFailed {
                    found: 0,
                    iterations: search.iterations,
                })
            }
        };

        let centres: Vec<f64> = (0..histogram.occupancy.len())
            .map(|i| histogram.bin_centre(i))
            .collect();
        let counts: Vec<f64> = histogram.occupancy.iter().map(|&n| n as f64).collect();
        Ok(match signal {
            Some(signal) => {
                let split = 0.5 * (background.position + signal.position);
                let n_below = centres.partition_point(|&c| c < split);
                PeakModel {
                    background: refine_peak(&centres[..n_below], &counts[..n_below], background),
                    signal: Some(refine_peak(&centres[n_below..], &counts[n_below..], signal)),
                }
            }
            None => PeakModel {
                background: refine_peak(&centres, &counts, background),
                signal: None,
            },
        })
    }

    fn update_fidelity(&mut self) {
        self.fidelity = self.peaks.and_then(|model| {
            let signal = model.signal?;
            fidelity(
                self.threshold,
                model.background.position,
                model.background.width,
                signal.position,
                signal.width,
            )
            .ok()
        });
    }

    /// Estimate a threshold from the current histogram without applying it.
    ///
    /// The peak model is updated either way. Fails with PeakSearchFailed if fewer than two
    /// peaks are found.
    pub fn estimate_threshold(&mut self) -> Result<f64, HistogramError> {
        let histogram = self.histogram()?;
        let model = match Self::peak_model(&histogram) {
            Ok(model) => model,
            Err(e) => {
                self.peaks = None;
                return Err(e.into());
            }
        };
        self.peaks = Some(model);
        let background = model.background;
        let signal = match model.signal {
            Some(signal) => signal,
            None => {
                return Err(PeakError::PeakSearchFailed {
                    found: 1,
                    iterations: 0,
                }
                .into())
            }
        };

        let midpoint = 0.5 * (background.position + signal.position);
        match self.threshold_method {
            ThresholdMethod::Midpoint => Ok(midpoint),
            ThresholdMethod::MaxFidelity => Ok(search_best_threshold(
                background.position,
                background.width,
                signal.position,
                signal.width,
                self.fidelity_samples,
            )?),
        }
    }

    /// Estimate the threshold from the histogram peaks and apply it.
    ///
    /// A threshold pinned with `pin_threshold` is never replaced; the estimate is still
    /// returned. On failure the previous threshold stays in place.
    pub fn compute_threshold(&mut self) -> Result<f64, HistogramError> {
        let estimate = self.estimate_threshold()?;
        match self.threshold_mode {
            ThresholdMode::Automatic => self.threshold = estimate,
            ThresholdMode::Manual => {
                spdlog::debug!(
                    "Threshold is pinned at {}, not applying estimate {}",
                    self.threshold,
                    estimate
                )
            }
        }
        self.update_fidelity();
        Ok(estimate)
    }

    /// Rebuild the histogram and, in automatic mode, the threshold.
    ///
    /// Peak search problems are not fatal: they are reported in `Refresh::warning` and the
    /// previous threshold is kept. In manual mode the peak model is refreshed but the
    /// threshold is left exactly as pinned.
    pub fn refresh(&mut self) -> Result<Refresh, HistogramError> {
        let histogram = self.histogram()?;
        let warning = match self.threshold_mode {
            ThresholdMode::Automatic => self.compute_threshold().err(),
            ThresholdMode::Manual => match Self::peak_model(&histogram) {
                Ok(model) => {
                    self.peaks = Some(model);
                    None
                }
                Err(e) => {
                    self.peaks = None;
                    Some(e.into())
                }
            },
        };
        self.update_fidelity();
        Ok(Refresh {
            histogram,
            threshold: self.threshold,
            peaks: self.peaks,
            fidelity: self.fidelity,
            warning,
        })
    }

    /// Loading statistics under the current threshold and peak model
    pub fn summary(&self) -> HistogramSummary {
        let (above, below): (Vec<f64>, Vec<f64>) = self
            .records
            .iter()
            .map(|r| r.signal)
            .partition(|&s| self.classify(s));
        let n = self.records.len();
        let k = above.len();
        let loading_probability = if n > 0 { k as f64 / n as f64 } else { 0.0 };
        let (lower, upper) = jeffreys_interval(k, n);
        let (background_mean, background_std) = sample_mean_std(&below);
        let (signal_mean, signal_std) = sample_mean_std(&above);

        let pair = self
            .peaks
            .and_then(|model| model.signal.map(|signal| (model.background, signal)));
        let separation = pair.map(|(bg, sig)| sig.position - bg.position);
        let signal_to_noise = pair.and_then(|(bg, sig)| {
            let noise = (bg.width.powi(2) + sig.width.powi(2)).sqrt();
            (noise > 0.0).then(|| (sig.position - bg.position) / noise)
        });

        HistogramSummary {
            images_processed: n,
            above_threshold: k,
            below_threshold: below.len(),
            threshold: self.threshold,
            loading_probability,
            loading_error_lower: loading_probability - lower,
            loading_error_upper: upper - loading_probability,
            background_mean,
            background_std,
            signal_mean,
            signal_std,
            peaks: self.peaks,
            separation,
            signal_to_noise,
            fidelity: self.fidelity,
        }
    }
}

/// Replace a peak estimate with a Gaussian fit to the bins around it, if the fit succeeds
fn refine_peak(centres: &[f64], counts: &[f64], estimate: PeakEstimate) -> PeakEstimate {
    let seed = Gaussian::new(estimate.height, estimate.position, estimate.width);
    match fit_gaussian(centres, counts, seed) {
        Some(fit) => {
            spdlog::debug!(
                "Fitted peak at {:.2} (width {:.2}), search estimate {:.2} (width {:.2})",
                fit.centre,
                fit.sigma,
                estimate.position,
                estimate.width
            );
            PeakEstimate {
                position: fit.centre,
                height: fit.amplitude,
                width: fit.sigma,
            }
        }
        None => estimate,
    }
}

/// Jeffreys 1 sigma confidence interval for k successes in n binomial trials
fn jeffreys_interval(k: usize, n: usize) -> (f64, f64) {
    if n == 0 {
        return (0.0, 1.0);
    }
    let beta = match Beta::new(k as f64 + 0.5, (n - k) as f64 + 0.5) {
        Ok(beta) => beta,
        Err(_) => return (0.0, 1.0),
    };
    let lower = if k == 0 {
        0.0
    } else {
        beta.inverse_cdf(ONE_SIGMA_LOWER_QUANTILE)
    };
    let upper = if k == n {
        1.0
    } else {
        beta.inverse_cdf(ONE_SIGMA_UPPER_QUANTILE)
    };
    (lower, upper)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(signal: f64) -> MeasurementRecord {
        MeasurementRecord {
            file_id: String::from("0"),
            signal,
            max_count: signal,
            centroid_x: 0,
            centroid_y: 0,
            background_mean: 0.0,
            background_std: 0.0,
        }
    }

    fn scenario(method: ThresholdMethod) -> SignalHistogram {
        let mut hist = SignalHistogram::default();
        hist.set_auto_bins(Some(10));
        hist.set_threshold_method(method);
        for s in [10.0, 12.0, 11.0, 98.0, 101.0, 99.0, 13.0] {
            hist.append(record(s));
        }
        hist
    }

    #[test]
    fn test_two_clusters_midpoint() {
        let mut hist = scenario(ThresholdMethod::Midpoint);
        let histogram = hist.histogram().unwrap();
        assert_eq!(histogram.occupancy, vec![4, 0, 0, 0, 0, 0, 0, 0, 0, 3]);
        let thresh = hist.compute_threshold().unwrap();
        assert!(thresh > 13.0 && thresh < 98.0);
        assert_eq!(hist.threshold(), thresh);
        let model = hist.peaks().unwrap();
        assert!(model.background.position < 20.0);
        assert!(model.signal.unwrap().position > 90.0);
        let flags: Vec<bool> = hist.atom_flags().collect();
        assert_eq!(flags, vec![false, false, false, true, true, true, false]);
    }

    #[test]
    fn test_two_clusters_max_fidelity() {
        let mut hist = scenario(ThresholdMethod::MaxFidelity);
        let refresh = hist.refresh().unwrap();
        assert!(refresh.warning.is_none());
        assert!(refresh.threshold > 13.0 && refresh.threshold < 98.0);
        let fid = refresh.fidelity.unwrap();
        assert!(fid.value > 0.99 && fid.value <= 1.0);
    }

    #[test]
    fn test_auto_histogram_is_idempotent() {
        let hist = scenario(ThresholdMethod::Midpoint);
        assert_eq!(hist.histogram().unwrap(), hist.histogram().unwrap());
    }

    #[test]
    fn test_default_auto_bin_count_grows() {
        let mut hist = SignalHistogram::default();
        for i in 0..100 {
            hist.append(record(i as f64));
        }
        assert_eq!(hist.histogram().unwrap().occupancy.len(), 25);
    }

    #[test]
    fn test_pinned_threshold_survives_refresh() {
        let mut hist = scenario(ThresholdMethod::MaxFidelity);
        hist.pin_threshold(42.0);
        for s in [9.0, 100.0, 14.0, 97.0] {
            hist.append(record(s));
            hist.histogram().unwrap();
            let refresh = hist.refresh().unwrap();
            assert_eq!(refresh.threshold, 42.0);
        }
        hist.compute_threshold().unwrap();
        assert_eq!(hist.threshold(), 42.0);
        assert!(hist.peaks().is_some());

        hist.unpin_threshold();
        hist.refresh().unwrap();
        assert_ne!(hist.threshold(), 42.0);
    }

    #[test]
    fn test_single_peak_keeps_threshold() {
        let mut hist = SignalHistogram::default();
        hist.set_auto_bins(Some(5));
        for s in [10.0, 10.0, 10.0, 10.0] {
            hist.append(record(s));
        }
        let refresh = hist.refresh().unwrap();
        assert!(matches!(
            refresh.warning,
            Some(HistogramError::PeakError(PeakError::PeakSearchFailed { found: 1, .. }))
        ));
        assert_eq!(refresh.threshold, 1.0);
        let model = hist.peaks().unwrap();
        assert!(model.signal.is_none());
        assert!(hist.summary().signal_to_noise.is_none());
    }

    /// Fixed 2-wide bins over [0, 200] with a Gaussian number of records at each bin centre
    fn add_gaussian_peak(hist: &mut SignalHistogram, amplitude: f64, centre: f64, sigma: f64) {
        for i in 0..100 {
            let x = 2.0 * i as f64 + 1.0;
            let n = (amplitude * (-(x - centre).powi(2) / (2.0 * sigma * sigma)).exp()).round();
            for _ in 0..n as usize {
                hist.append(record(x));
            }
        }
    }

    fn two_wide_bins() -> Vec<f64> {
        (0..=100).map(|i| 2.0 * i as f64).collect()
    }

    #[test]
    fn test_fitted_peaks_of_bimodal_histogram() {
        let mut hist = SignalHistogram::default();
        hist.set_fixed_bins(two_wide_bins()).unwrap();
        add_gaussian_peak(&mut hist, 300.0, 50.0, 5.0);
        add_gaussian_peak(&mut hist, 100.0, 150.0, 8.0);

        let refresh = hist.refresh().unwrap();
        assert!(refresh.warning.is_none());
        let model = refresh.peaks.unwrap();
        let (bg, sig) = (model.background, model.signal.unwrap());
        assert!((bg.position - 50.0).abs() < 0.1, "{bg:?}");
        assert!((bg.width - 5.0).abs() < 0.1, "{bg:?}");
        assert!((bg.height - 300.0).abs() < 3.0, "{bg:?}");
        assert!((sig.position - 150.0).abs() < 0.1, "{sig:?}");
        assert!((sig.width - 8.0).abs() < 0.1, "{sig:?}");

        assert!(refresh.threshold > 60.0 && refresh.threshold < 130.0);
        assert!(refresh.fidelity.unwrap().value > 0.999);
    }

    #[test]
    fn test_background_only_fit() {
        let mut hist = SignalHistogram::default();
        hist.set_fixed_bins(two_wide_bins()).unwrap();
        add_gaussian_peak(&mut hist, 200.0, 40.0, 6.0);

        let refresh = hist.refresh().unwrap();
        assert!(matches!(
            refresh.warning,
            Some(HistogramError::PeakError(PeakError::PeakSearchFailed { found: 1, .. }))
        ));
        let model = refresh.peaks.unwrap();
        assert!(model.signal.is_none());
        assert!((model.background.position - 40.0).abs() < 0.1);
        assert!((model.background.width - 6.0).abs() < 0.1);
    }

    #[test]
    fn test_growth_keeps_records() {
        let mut hist = SignalHistogram::default();
        let n = INITIAL_RECORD_CAPACITY + RECORD_GROWTH_BLOCK / 2;
        for i in 0..n {
            hist.append(record(i as f64));
        }
        assert_eq!(hist.len(), n);
        assert!(hist.capacity() >= INITIAL_RECORD_CAPACITY + RECORD_GROWTH_BLOCK);
        assert!(hist
            .records()
            .iter()
            .enumerate()
            .all(|(i, r)| r.signal == i as f64));
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let mut hist = scenario(ThresholdMethod::Midpoint);
        let capacity = hist.capacity();
        hist.reset();
        assert!(hist.is_empty());
        assert_eq!(hist.capacity(), capacity);
        assert!(matches!(hist.histogram(), Err(HistogramError::Empty)));
    }

    #[test]
    fn test_fixed_bins() {
        let mut hist = SignalHistogram::default();
        hist.set_fixed_bins(vec![0.0, 5.0, 10.0]).unwrap();
        for s in [-1.0, 0.0, 4.9, 5.0, 10.0, 10.5] {
            hist.append(record(s));
        }
        let histogram = hist.histogram().unwrap();
        assert_eq!(histogram.edges, vec![0.0, 5.0, 10.0]);
        assert_eq!(histogram.occupancy, vec![2, 2]);
        assert!(matches!(
            hist.set_fixed_bins(vec![1.0, 1.0]),
            Err(HistogramError::BadBinEdges)
        ));
    }

    #[test]
    fn test_summary_loading_probability() {
        let mut hist = scenario(ThresholdMethod::Midpoint);
        hist.compute_threshold().unwrap();
        let summary = hist.summary();
        assert_eq!(summary.images_processed, 7);
        assert_eq!(summary.above_threshold, 3);
        assert_eq!(summary.below_threshold, 4);
        assert!((summary.loading_probability - 3.0 / 7.0).abs() < 1e-12);
        assert!(summary.loading_error_lower > 0.0 && summary.loading_error_upper > 0.0);
        assert!((summary.background_mean - 11.5).abs() < 1e-12);
        assert!(summary.separation.unwrap() > 0.0);
    }

    #[test]
    fn test_jeffreys_interval_edges() {
        assert_eq!(jeffreys_interval(0, 10).0, 0.0);
        assert_eq!(jeffreys_interval(10, 10).1, 1.0);
        let (lo, hi) = jeffreys_interval(5, 10);
        assert!(lo < 0.5 && hi > 0.5);
    }
}
