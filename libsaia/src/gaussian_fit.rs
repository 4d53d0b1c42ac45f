//! Least-squares fit of a 1-D Gaussian to histogram occupancy.
//!
//! Levenberg-Marquardt over the amplitude, centre and sigma of
//! f(x) = A exp(-(x - c)^2 / 2 sigma^2), started from a peak estimate.

use super::constants::{
    GAUSSIAN_FIT_INITIAL_DAMPING, GAUSSIAN_FIT_MAX_DAMPING, GAUSSIAN_FIT_MAX_ITERATIONS,
    GAUSSIAN_FIT_TOLERANCE,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gaussian {
    pub amplitude: f64,
    pub centre: f64,
    pub sigma: f64,
}

impl Gaussian {
    pub fn new(amplitude: f64, centre: f64, sigma: f64) -> Self {
        Self {
            amplitude,
            centre,
            sigma,
        }
    }

    pub fn eval(&self, x: f64) -> f64 {
        let z = (x - self.centre) / self.sigma;
        self.amplitude * (-0.5 * z * z).exp()
    }

    fn stepped(&self, delta: &[f64; 3]) -> Self {
        Self {
            amplitude: self.amplitude + delta[0],
            centre: self.centre + delta[1],
            sigma: (self.sigma + delta[2]).abs(),
        }
    }
}

fn sum_of_squares(x: &[f64], y: &[f64], model: &Gaussian) -> f64 {
    x.iter()
        .zip(y)
        .map(|(&x, &y)| (y - model.eval(x)).powi(2))
        .sum()
}

/// J^T J and J^T r of the residuals at `model`
fn normal_equations(x: &[f64], y: &[f64], model: &Gaussian) -> ([[f64; 3]; 3], [f64; 3]) {
    let mut jtj = [[0.0; 3]; 3];
    let mut jtr = [0.0; 3];
    let s2 = model.sigma * model.sigma;
    for (&x, &y) in x.iter().zip(y) {
        let d = x - model.centre;
        let e = (-0.5 * d * d / s2).exp();
        let f = model.amplitude * e;
        let grad = [e, f * d / s2, f * d * d / (s2 * model.sigma)];
        let r = y - f;
        for i in 0..3 {
            jtr[i] += grad[i] * r;
            for j in 0..3 {
                jtj[i][j] += grad[i] * grad[j];
            }
        }
    }
    (jtj, jtr)
}

/// Gaussian elimination with partial pivoting. None if the system is singular.
fn solve3(mut a: [[f64; 3]; 3], mut b: [f64; 3]) -> Option<[f64; 3]> {
    for col in 0..3 {
        let pivot = (col..3).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if !(a[pivot][col].abs() > 0.0) {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..3 {
            let factor = a[row][col] / a[col][col];
            for k in col..3 {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut solution = [0.0; 3];
    for row in (0..3).rev() {
        let rest: f64 = (row + 1..3).map(|k| a[row][k] * solution[k]).sum();
        solution[row] = (b[row] - rest) / a[row][row];
    }
    solution.iter().all(|v| v.is_finite()).then_some(solution)
}

/// Mean and standard deviation of `x` weighted by `y`
fn weighted_moments(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let total: f64 = y.iter().sum();
    if !(total > 0.0) {
        return None;
    }
    let mean = x.iter().zip(y).map(|(x, y)| x * y).sum::<f64>() / total;
    let variance = x
        .iter()
        .zip(y)
        .map(|(x, y)| y * (x - mean).powi(2))
        .sum::<f64>()
        / total;
    Some((mean, variance.sqrt()))
}

/// Fit a Gaussian to the points (x, y), starting from `seed`.
///
/// Seed values that are unusable (a non-positive sigma or amplitude, a centre outside the
/// data) are replaced by the weighted moments of the data. Returns None if fewer than three
/// points are non-zero, or if the fit ends with a centre outside the data or a non-positive
/// amplitude or sigma.
pub fn fit_gaussian(x: &[f64], y: &[f64], seed: Gaussian) -> Option<Gaussian> {
    if x.len() != y.len() || y.iter().filter(|&&v| v > 0.0).count() < 3 {
        return None;
    }
    let lo = x.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (mean, std) = weighted_moments(x, y)?;
    let peak = y.iter().copied().fold(0.0, f64::max);

    let mut model = Gaussian {
        amplitude: if seed.amplitude > 0.0 {
            seed.amplitude
        } else {
            peak
        },
        centre: if seed.centre >= lo && seed.centre <= hi {
            seed.centre
        } else {
            mean
        },
        sigma: if seed.sigma > 0.0 && seed.sigma.is_finite() {
            seed.sigma
        } else {
            std
        },
    };
    if !(model.sigma > 0.0) {
        return None;
    }

    let mut damping = GAUSSIAN_FIT_INITIAL_DAMPING;
    let mut cost = sum_of_squares(x, y, &model);
    for _ in 0..GAUSSIAN_FIT_MAX_ITERATIONS {
        let (mut jtj, jtr) = normal_equations(x, y, &model);
        for (i, row) in jtj.iter_mut().enumerate() {
            row[i] *= 1.0 + damping;
        }
        let delta = match solve3(jtj, jtr) {
            Some(delta) => delta,
            None => break,
        };
        let trial = model.stepped(&delta);
        let trial_cost = sum_of_squares(x, y, &trial);
        if trial.sigma > 0.0 && trial_cost < cost {
            let converged = cost - trial_cost <= GAUSSIAN_FIT_TOLERANCE * cost;
            model = trial;
            cost = trial_cost;
            damping *= 0.1;
            if converged {
                break;
            }
        } else {
            damping *= 10.0;
            if damping > GAUSSIAN_FIT_MAX_DAMPING {
                break;
            }
        }
    }

    let valid = model.amplitude > 0.0
        && model.sigma > 0.0
        && model.sigma.is_finite()
        && model.centre >= lo
        && model.centre <= hi;
    valid.then_some(model)
}
