//! Changepoint detection on one-dimensional signals.
//!
//! [`BayesianOnlineDetector`] runs Bayesian online changepoint detection
//! with Gaussian observations of known variance and a constant hazard.
//! The changepoint probability of sample `t` is read off the run-length
//! posterior a few samples later, since with a constant hazard the
//! immediate run-length-zero mass carries no information.

use crate::simulation::params::{CHANGEPOINT_HAZARD, CHANGEPOINT_LAG, MAX_RUN_LENGTH};

/// Produces a changepoint probability for every sample of a signal.
pub trait ChangepointDetector {
    /// Output has the same length as `data`; values lie in [0, 1].
    fn changepoint_probabilities(&self, data: &[f64]) -> Vec<f64>;
}

/// Bayesian online changepoint detector (Gaussian, known variance).
#[derive(Clone, Debug)]
pub struct BayesianOnlineDetector {
    hazard: f64,
    lag: usize,
    max_run_length: usize,
    prior_variance_scale: f64,
}

impl Default for BayesianOnlineDetector {
    fn default() -> Self {
        Self::new(CHANGEPOINT_HAZARD)
    }
}

/// Sufficient statistics of the segment mean for one run length.
#[derive(Clone, Copy, Debug)]
struct SegmentMean {
    mean: f64,
    precision: f64,
}

impl BayesianOnlineDetector {
    #[must_use]
    pub fn new(hazard: f64) -> Self {
        Self {
            hazard: hazard.clamp(1e-6, 1.0 - 1e-6),
            lag: CHANGEPOINT_LAG,
            max_run_length: MAX_RUN_LENGTH,
            prior_variance_scale: 10.0,
        }
    }

    fn gaussian_pdf(x: f64, mean: f64, variance: f64) -> f64 {
        let z = x - mean;
        (-0.5 * z * z / variance).exp() / (2.0 * std::f64::consts::PI * variance).sqrt()
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean_and_variance(data: &[f64]) -> (f64, f64) {
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, variance)
}

impl ChangepointDetector for BayesianOnlineDetector {
    fn changepoint_probabilities(&self, data: &[f64]) -> Vec<f64> {
        let mut output = vec![0.0; data.len()];
        if data.is_empty() {
            return output;
        }

        let (data_mean, data_variance) = mean_and_variance(data);
        let noise_variance = (data_variance * 0.1).max(1e-6);
        let prior = SegmentMean {
            mean: data_mean,
            precision: 1.0 / (data_variance * self.prior_variance_scale).max(1e-6),
        };

        let mut run_lengths = vec![1.0];
        let mut segments = vec![prior];
        for (t, &x) in data.iter().enumerate() {
            let predictive: Vec<f64> = segments
                .iter()
                .map(|s| Self::gaussian_pdf(x, s.mean, noise_variance + 1.0 / s.precision))
                .collect();

            let mut next = Vec::with_capacity(run_lengths.len() + 1);
            let changepoint_mass: f64 = run_lengths
                .iter()
                .zip(&predictive)
                .map(|(r, p)| r * p * self.hazard)
                .sum();
            next.push(changepoint_mass);
            next.extend(
                run_lengths
                    .iter()
                    .zip(&predictive)
                    .map(|(r, p)| r * p * (1.0 - self.hazard)),
            );

            let total: f64 = next.iter().sum();
            if total > 0.0 && total.is_finite() {
                for r in &mut next {
                    *r /= total;
                }
            } else {
                next = vec![1.0];
            }

            let mut next_segments = Vec::with_capacity(next.len());
            next_segments.push(prior);
            next_segments.extend(segments.iter().map(|s| {
                let precision = s.precision + 1.0 / noise_variance;
                SegmentMean {
                    mean: (s.mean * s.precision + x / noise_variance) / precision,
                    precision,
                }
            }));
            next_segments.truncate(next.len());

            if next.len() > self.max_run_length {
                next.truncate(self.max_run_length);
                next_segments.truncate(self.max_run_length);
                let kept: f64 = next.iter().sum();
                for r in &mut next {
                    *r /= kept;
                }
            }
            run_lengths = next;
            segments = next_segments;

            // A segment opened by sample `s` has run length `t - s + 1` now.
            if t + 1 >= self.lag {
                output[t + 1 - self.lag] = run_lengths.get(self.lag).copied().unwrap_or(0.0);
            }
        }

        let last = data.len() - 1;
        for s in (data.len() + 1).saturating_sub(self.lag)..data.len() {
            output[s] = run_lengths.get(last - s + 1).copied().unwrap_or(0.0);
        }
        // The first sample opens the first segment rather than changing one.
        output[0] = 0.0;
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_shape_and_range() {
        let detector = BayesianOnlineDetector::default();
        let data: Vec<f64> = (0..50).map(|i| f64::from(i % 7)).collect();
        let probabilities = detector.changepoint_probabilities(&data);
        assert_eq!(probabilities.len(), data.len());
        assert!(probabilities
            .iter()
            .all(|p| p.is_finite() && (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_detects_step() {
        let detector = BayesianOnlineDetector::default();
        let mut data = vec![0.0; 40];
        data.extend(vec![10.0; 40]);
        let probabilities = detector.changepoint_probabilities(&data);
        let (argmax, _) = probabilities
            .iter()
            .enumerate()
            .skip(1)
            .fold((0, f64::MIN), |best, (i, &p)| if p > best.1 { (i, p) } else { best });
        assert!((38..=42).contains(&argmax), "changepoint found at {argmax}");
        assert!(probabilities[argmax] > probabilities[20]);
    }

    #[test]
    fn test_empty_signal() {
        let detector = BayesianOnlineDetector::default();
        assert!(detector.changepoint_probabilities(&[]).is_empty());
    }
}
