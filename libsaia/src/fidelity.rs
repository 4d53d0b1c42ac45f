use statrs::function::erf::erfc;
use std::f64::consts::SQRT_2;

use super::error::FidelityError;

/// Detection fidelity of a threshold and its error estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fidelity {
    pub value: f64,
    pub error: f64,
}

/// Probability that a normal variable exceeds `x`
fn upper_tail(x: f64, mean: f64, width: f64) -> f64 {
    0.5 * erfc((x - mean) / (width * SQRT_2))
}

/// Probability that a normal variable falls below `x`
fn lower_tail(x: f64, mean: f64, width: f64) -> f64 {
    0.5 * erfc((mean - x) / (width * SQRT_2))
}

fn separated_fidelity(thresh: f64, bg_pos: f64, bg_width: f64, sig_pos: f64, sig_width: f64) -> f64 {
    1.0 - upper_tail(thresh, bg_pos, bg_width) - lower_tail(thresh, sig_pos, sig_width)
}

/// Fidelity of classifying images with `thresh`, modelling both peaks as normal distributions.
///
/// fidelity = 1 - P(background above threshold) - P(signal below threshold). The error is half
/// the spread between the fidelities with both peak positions pushed one width apart and one
/// width together. A zero width means the peak is a single value, so any threshold between
/// distinct positions separates perfectly.
pub fn fidelity(
    thresh: f64,
    bg_pos: f64,
    bg_width: f64,
    sig_pos: f64,
    sig_width: f64,
) -> Result<Fidelity, FidelityError> {
    if bg_pos == sig_pos {
        return Err(FidelityError::DegenerateModel(bg_pos));
    }
    if bg_width == 0.0 || sig_width == 0.0 {
        return Ok(Fidelity {
            value: 1.0,
            error: 0.0,
        });
    }
    let value = separated_fidelity(thresh, bg_pos, bg_width, sig_pos, sig_width);
    let apart = separated_fidelity(
        thresh,
        bg_pos - bg_width,
        bg_width,
        sig_pos + sig_width,
        sig_width,
    );
    let together = separated_fidelity(
        thresh,
        bg_pos + bg_width,
        bg_width,
        sig_pos - sig_width,
        sig_width,
    );
    Ok(Fidelity {
        value,
        error: (apart - together).abs() * 0.5,
    })
}

/// Scan `n_samples` equally spaced thresholds strictly between the peak positions and return
/// the one with the highest fidelity. Ties go to the first threshold scanned.
pub fn search_best_threshold(
    bg_pos: f64,
    bg_width: f64,
    sig_pos: f64,
    sig_width: f64,
    n_samples: usize,
) -> Result<f64, FidelityError> {
    if n_samples == 0 {
        return Err(FidelityError::NoSamples);
    }
    let step = (sig_pos - bg_pos) / (n_samples + 1) as f64;
    let mut best_thresh = bg_pos + step;
    let mut best_fidelity = f64::NEG_INFINITY;
    for k in 1..=n_samples {
        let thresh = bg_pos + step * k as f64;
        let fid = fidelity(thresh, bg_pos, bg_width, sig_pos, sig_width)?;
        if fid.value > best_fidelity {
            best_fidelity = fid.value;
            best_thresh = thresh;
        }
    }
    Ok(best_thresh)
}
