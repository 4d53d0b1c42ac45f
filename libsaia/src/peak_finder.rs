//! Locate the background and signal peaks of a binned histogram.
//!
//! A histogram built from a finite number of images is noisy, so a plain local-maximum
//! search usually returns many small peaks besides the two we care about. The search is
//! repeated with a growing minimum separation between peaks (keeping the tallest peak of
//! any group closer than the separation) until at most two remain.

use super::constants::{FWHM_PER_SIGMA, MAX_PEAK_SEARCH_ITERATIONS};
use super::error::PeakError;

/// A peak in an occupancy array. All quantities are in bin-index units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub index: usize,
    pub height: f64,
    /// Standard deviation estimated from the full width at half maximum
    pub width: f64,
}

/// Result of a peak search: at most two peaks ordered by index, and how many times the
/// minimum separation had to be increased to get there.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakSearch {
    pub peaks: Vec<Peak>,
    pub iterations: usize,
}

/// Find up to two dominant peaks in a histogram occupancy array
pub fn find_peaks(occupancy: &[u64]) -> Result<PeakSearch, PeakError> {
    find_peaks_with_limit(occupancy, MAX_PEAK_SEARCH_ITERATIONS)
}

/// Find up to two dominant peaks, giving up after `max_iterations` separation increases
pub fn find_peaks_with_limit(
    occupancy: &[u64],
    max_iterations: usize,
) -> Result<PeakSearch, PeakError> {
    let candidates = local_maxima(occupancy);
    let step = occupancy.len() / 500 * 5 + 1;
    let mut distance = 1;
    let mut iterations = 0;
    let mut kept = select_by_distance(occupancy, &candidates, distance);
    while kept.len() > 2 {
        if iterations >= max_iterations {
            return Err(PeakError::PeakSearchFailed {
                found: kept.len(),
                iterations,
            });
        }
        iterations += 1;
        distance += step;
        kept = select_by_distance(occupancy, &candidates, distance);
    }

    if kept.is_empty() {
        return Err(PeakError::PeakSearchFailed {
            found: 0,
            iterations,
        });
    }

    let peaks = kept
        .into_iter()
        .map(|index| Peak {
            index,
            height: occupancy[index] as f64,
            width: full_width_half_max(occupancy, index) / FWHM_PER_SIGMA,
        })
        .collect();
    Ok(PeakSearch { peaks, iterations })
}

/// Indices of all non-zero local maxima. A flat top counts once, at its middle.
/// The ends of the array count as maxima if they are higher than their only neighbour.
fn local_maxima(occupancy: &[u64]) -> Vec<usize> {
    let n = occupancy.len();
    let mut maxima = Vec::new();
    let mut start = 0;
    while start < n {
        let value = occupancy[start];
        let mut end = start;
        while end + 1 < n && occupancy[end + 1] == value {
            end += 1;
        }
        let rises = start == 0 || occupancy[start - 1] < value;
        let falls = end == n - 1 || occupancy[end + 1] < value;
        if value > 0 && rises && falls {
            maxima.push((start + end) / 2);
        }
        start = end + 1;
    }
    maxima
}

/// Drop any peak closer than `distance` to a taller one. Returned in index order.
fn select_by_distance(occupancy: &[u64], candidates: &[usize], distance: usize) -> Vec<usize> {
    // stable sort: of equal heights the lower index wins
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| occupancy[candidates[b]].cmp(&occupancy[candidates[a]]));

    let mut keep = vec![true; candidates.len()];
    for &k in order.iter() {
        if !keep[k] {
            continue;
        }
        for other in 0..candidates.len() {
            if other != k && keep[other] && candidates[k].abs_diff(candidates[other]) < distance {
                keep[other] = false;
            }
        }
    }

    candidates
        .iter()
        .zip(keep)
        .filter_map(|(&c, k)| k.then_some(c))
        .collect()
}

/// Width of the peak at half its height, linearly interpolated between bins.
/// Bins beyond either end of the array are treated as empty.
fn full_width_half_max(occupancy: &[u64], index: usize) -> f64 {
    let value = |i: isize| -> f64 {
        if i < 0 || i as usize >= occupancy.len() {
            0.0
        } else {
            occupancy[i as usize] as f64
        }
    };
    let peak = index as isize;
    let half = value(peak) * 0.5;

    let mut left = peak;
    while value(left - 1) > half {
        left -= 1;
    }
    let (low, high) = (value(left - 1), value(left));
    let left_x = (left - 1) as f64 + (half - low) / (high - low);

    let mut right = peak;
    while value(right + 1) > half {
        right += 1;
    }
    let (high, low) = (value(right), value(right + 1));
    let right_x = right as f64 + (high - half) / (high - low);

    right_x - left_x
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_bumps_with_spikes() -> Vec<u64> {
        let mut occupancy: Vec<u64> = (0..200)
            .map(|i| {
                let x = i as f64;
                let bg = 100.0 * (-(x - 50.0).powi(2) / 50.0).exp();
                let sig = 40.0 * (-(x - 150.0).powi(2) / 128.0).exp();
                (bg.round() + sig.round()) as u64
            })
            .collect();
        occupancy[35] += 4;
        occupancy[62] += 10;
        occupancy[140] += 8;
        occupancy
    }

    #[test]
    fn test_edge_bins_are_peaks() {
        let search = find_peaks(&[4, 0, 0, 0, 0, 0, 0, 0, 0, 3]).unwrap();
        let indices: Vec<usize> = search.peaks.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 9]);
        assert_eq!(search.iterations, 0);
        // a lone bin is one bin wide at half maximum
        assert!((search.peaks[0].width - 1.0 / FWHM_PER_SIGMA).abs() < 1e-12);
    }

    #[test]
    fn test_noise_spikes_collapse_to_two_peaks() {
        let search = find_peaks(&two_bumps_with_spikes()).unwrap();
        let indices: Vec<usize> = search.peaks.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![50, 150]);
        assert!(search.iterations <= 20);
        assert_eq!(search.peaks[0].height, 100.0);
    }

    #[test]
    fn test_width_of_gaussian_bump() {
        let sigma = 6.0;
        let occupancy: Vec<u64> = (0..100)
            .map(|i| {
                let x = i as f64 - 50.0;
                (1000.0 * (-x * x / (2.0 * sigma * sigma)).exp()).round() as u64
            })
            .collect();
        let search = find_peaks(&occupancy).unwrap();
        assert_eq!(search.peaks.len(), 1);
        assert!((search.peaks[0].width - sigma).abs() < 0.1);
    }

    #[test]
    fn test_flat_top_reports_middle() {
        let search = find_peaks(&[0, 2, 5, 5, 5, 2, 0]).unwrap();
        assert_eq!(search.peaks.len(), 1);
        assert_eq!(search.peaks[0].index, 3);
    }

    #[test]
    fn test_empty_histogram_fails() {
        assert!(matches!(
            find_peaks(&[0, 0, 0]),
            Err(PeakError::PeakSearchFailed { found: 0, .. })
        ));
    }

    #[test]
    fn test_iteration_cap() {
        let comb = [1, 0, 1, 0, 1, 0, 1];
        match find_peaks_with_limit(&comb, 1) {
            Err(PeakError::PeakSearchFailed { found, iterations }) => {
                assert_eq!(found, 4);
                assert_eq!(iterations, 1);
            }
            other => panic!("expected PeakSearchFailed, got {other:?}"),
        }
        let search = find_peaks(&comb).unwrap();
        assert!(search.peaks.len() <= 2);
    }
}
