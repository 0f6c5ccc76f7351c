//! Same-segment probabilities from recorded joint motion.
//!
//! A deviation signal between expected and observed velocity is computed for
//! every joint, fed to a changepoint detector, and the resulting changepoint
//! probabilities are aggregated per angular degree. Without a detector (or
//! without recorded motion) every joint falls back to a uniform estimate.

use tracing::{debug, warn};

use crate::inference::changepoint::ChangepointDetector;
use crate::simulation::executor::{JointTrace, MotionRecord, RecordingMode};
use crate::simulation::mechanism::degree_of;
use crate::simulation::params::{
    CHANGEPOINT_FLOOR, DEFAULT_CHANGEPOINT_PROBABILITY, DEGREES, DEVIATION_SCALE,
};

/// Per-degree probability that the locking behaviour continues into the
/// next degree.
///
/// Every entry lies in `[CHANGEPOINT_FLOOR, 1 - CHANGEPOINT_FLOOR]`.
#[derive(Clone, Debug, PartialEq)]
pub struct SameSegment {
    probabilities: Vec<f64>,
    /// `log_cumulative[d]` is the sum of `ln(p)` over degrees `0..d`.
    log_cumulative: Vec<f64>,
}

impl Default for SameSegment {
    fn default() -> Self {
        Self::uniform()
    }
}

impl SameSegment {
    /// Estimate used when no changepoint information is available.
    #[must_use]
    pub fn uniform() -> Self {
        Self::from_changepoints(&[DEFAULT_CHANGEPOINT_PROBABILITY; DEGREES])
    }

    /// Converts per-degree changepoint probabilities.
    ///
    /// Missing degrees (a short input) take the default changepoint
    /// probability.
    #[must_use]
    pub fn from_changepoints(changepoints: &[f64]) -> Self {
        let probabilities: Vec<f64> = (0..DEGREES)
            .map(|d| {
                let p_cp = changepoints
                    .get(d)
                    .copied()
                    .unwrap_or(DEFAULT_CHANGEPOINT_PROBABILITY);
                let p_same = 1.0 - p_cp;
                if p_same.is_finite() {
                    p_same.clamp(CHANGEPOINT_FLOOR, 1.0 - CHANGEPOINT_FLOOR)
                } else {
                    1.0 - DEFAULT_CHANGEPOINT_PROBABILITY
                }
            })
            .collect();

        let mut log_cumulative = Vec::with_capacity(DEGREES + 1);
        log_cumulative.push(0.0);
        let mut acc = 0.0;
        for p in &probabilities {
            acc += p.ln();
            log_cumulative.push(acc);
        }

        Self {
            probabilities,
            log_cumulative,
        }
    }

    #[must_use]
    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    #[must_use]
    pub fn probability(&self, degree: usize) -> f64 {
        self.probabilities[degree % DEGREES]
    }

    /// Probability that two positions lie in the same segment: the product
    /// of same-segment probabilities over the degrees between them.
    #[must_use]
    pub fn weight_between(&self, from: f64, to: f64) -> f64 {
        let (a, b) = (degree_of(from), degree_of(to));
        let (lo, hi) = (a.min(b), a.max(b));
        (self.log_cumulative[hi] - self.log_cumulative[lo]).exp()
    }
}

/// Deviation between expected and observed velocity after the applied force.
///
/// The first sample has no predecessor and is zero. Samples where the
/// expected velocity is zero are undefined (NaN).
#[must_use]
pub fn deviation_signal(trace: &JointTrace, mode: RecordingMode) -> Vec<f64> {
    let len = trace.len();
    let mut deviation = vec![0.0; len];
    if len < 2 {
        return deviation;
    }
    let deviation_at = |expected: f64, observed: f64| {
        ((expected.powi(2) - observed.powi(2)) / (DEVIATION_SCALE * expected)).abs()
    };
    match mode {
        RecordingMode::Velocity => {
            for t in 1..len {
                let expected = trace.velocities[t - 1] + trace.applied_forces[t - 1];
                deviation[t] = deviation_at(expected, trace.velocities[t]);
            }
        }
        RecordingMode::PositionDerivative => {
            for t in 1..len {
                let velocity = trace.positions[t] - trace.positions[t - 1];
                let expected = velocity + trace.applied_forces[t];
                deviation[t] = deviation_at(expected, velocity);
            }
        }
    }
    deviation
}

/// Replaces non-finite samples by linear interpolation between the nearest
/// finite neighbours. Edges take the nearest finite value; a signal with no
/// finite sample becomes all zeros.
#[allow(clippy::cast_precision_loss)]
pub fn interpolate_undefined(signal: &mut [f64]) {
    let known: Vec<usize> = (0..signal.len())
        .filter(|&i| signal[i].is_finite())
        .collect();
    let (Some(&first), Some(&last)) = (known.first(), known.last()) else {
        signal.fill(0.0);
        return;
    };

    let mut next_known = 0;
    for i in 0..signal.len() {
        if signal[i].is_finite() {
            continue;
        }
        if i < first {
            signal[i] = signal[first];
        } else if i > last {
            signal[i] = signal[last];
        } else {
            while known[next_known] < i {
                next_known += 1;
            }
            let (lo, hi) = (known[next_known - 1], known[next_known]);
            let fraction = (i - lo) as f64 / (hi - lo) as f64;
            signal[i] = signal[lo] + fraction * (signal[hi] - signal[lo]);
        }
    }
}

/// Averages per-sample probabilities by the degree each sample was recorded
/// at. Degrees without samples get `CHANGEPOINT_FLOOR`, as do samples whose
/// probability is zero or undefined.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn probability_over_degree(probabilities: &[f64], positions: &[f64]) -> Vec<f64> {
    let mut sums = vec![0.0; DEGREES];
    let mut counts = vec![0_usize; DEGREES];
    for (&p, &position) in probabilities.iter().zip(positions) {
        if !position.is_finite() {
            continue;
        }
        let degree = degree_of(position);
        sums[degree] += if p.is_finite() { p } else { 0.0 };
        counts[degree] += 1;
    }
    sums.iter()
        .zip(&counts)
        .map(|(&sum, &count)| {
            if count == 0 {
                CHANGEPOINT_FLOOR
            } else {
                (sum / count as f64).clamp(CHANGEPOINT_FLOOR, 1.0)
            }
        })
        .collect()
}

/// Result of segment estimation for every joint.
#[derive(Clone, Debug)]
pub struct SegmentEstimate {
    /// Per-degree changepoint probabilities, one vector per joint.
    pub changepoints: Vec<Vec<f64>>,
    pub same_segment: Vec<SameSegment>,
}

impl SegmentEstimate {
    #[must_use]
    pub fn uniform(joint_count: usize) -> Self {
        Self {
            changepoints: vec![vec![DEFAULT_CHANGEPOINT_PROBABILITY; DEGREES]; joint_count],
            same_segment: vec![SameSegment::uniform(); joint_count],
        }
    }
}

/// Turns recorded motion into same-segment probabilities.
pub struct SegmentEstimator<'a> {
    detector: Option<&'a dyn ChangepointDetector>,
    mode: RecordingMode,
}

impl<'a> SegmentEstimator<'a> {
    #[must_use]
    pub fn new(detector: Option<&'a dyn ChangepointDetector>, mode: RecordingMode) -> Self {
        Self { detector, mode }
    }

    /// Estimates same-segment probabilities for `joint_count` joints.
    ///
    /// Degrades to the uniform estimate when detection is unavailable or no
    /// motion was recorded; this is never an error.
    #[must_use]
    pub fn estimate(&self, record: Option<&MotionRecord>, joint_count: usize) -> SegmentEstimate {
        let Some(detector) = self.detector else {
            warn!("changepoint detection unavailable, using uniform segment probabilities");
            return SegmentEstimate::uniform(joint_count);
        };
        let Some(record) = record else {
            warn!("no motion recorded, using uniform segment probabilities");
            return SegmentEstimate::uniform(joint_count);
        };

        let mut estimate = SegmentEstimate::uniform(joint_count);
        for joint in 0..joint_count {
            let Some(trace) = record.trace(joint).filter(|trace| trace.len() >= 2) else {
                warn!(joint, "too little motion recorded, keeping uniform estimate");
                continue;
            };
            let mut deviation = deviation_signal(trace, self.mode);
            interpolate_undefined(&mut deviation);
            let per_sample = detector.changepoint_probabilities(&deviation);
            let changepoints = probability_over_degree(&per_sample, &trace.positions);
            debug!(
                joint,
                samples = trace.len(),
                "estimated changepoint probabilities"
            );
            estimate.same_segment[joint] = SameSegment::from_changepoints(&changepoints);
            estimate.changepoints[joint] = changepoints;
        }
        estimate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_weights() {
        let same = SameSegment::uniform();
        assert!((same.probability(17) - 0.9).abs() < 1e-12);
        assert!((same.weight_between(10.0, 12.0) - 0.81).abs() < 1e-9);
        assert!((same.weight_between(12.0, 10.0) - 0.81).abs() < 1e-9);
        assert!((same.weight_between(5.0, 5.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_same_segment_is_clamped() {
        let mut changepoints = vec![0.0; DEGREES];
        changepoints[3] = 1.0;
        changepoints[4] = f64::NAN;
        let same = SameSegment::from_changepoints(&changepoints);
        assert!(same.probabilities().iter().all(|p| *p > 0.0 && *p < 1.0));
    }

    #[test]
    fn test_interpolation() {
        let mut signal = vec![f64::NAN, 1.0, f64::NAN, 3.0, f64::NAN];
        interpolate_undefined(&mut signal);
        assert_eq!(signal, vec![1.0, 1.0, 2.0, 3.0, 3.0]);

        let mut empty = vec![f64::NAN; 3];
        interpolate_undefined(&mut empty);
        assert_eq!(empty, vec![0.0; 3]);
    }

    #[test]
    fn test_probability_over_degree_averages_and_floors() {
        let probabilities = [0.2, 0.4, 0.0];
        let positions = [10.0, 10.2, 11.0];
        let per_degree = probability_over_degree(&probabilities, &positions);
        assert_eq!(per_degree.len(), DEGREES);
        assert!((per_degree[10] - 0.3).abs() < 1e-12);
        assert_eq!(per_degree[11], CHANGEPOINT_FLOOR);
        assert_eq!(per_degree[200], CHANGEPOINT_FLOOR);
    }

    #[test]
    fn test_velocity_deviation() {
        let trace = JointTrace {
            positions: vec![0.0, 1.0, 2.0],
            velocities: vec![0.0, 1.0, 0.0],
            applied_forces: vec![1.0, 0.0, 0.0],
        };
        let deviation = deviation_signal(&trace, RecordingMode::Velocity);
        assert_eq!(deviation[0], 0.0);
        assert!(deviation[1].abs() < 1e-12);
        assert!((deviation[2] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_position_derivative_deviation() {
        let trace = JointTrace {
            positions: vec![0.0, 0.0, 0.0],
            velocities: vec![],
            applied_forces: vec![0.0, 0.0, 2.0],
        };
        let deviation = deviation_signal(&trace, RecordingMode::PositionDerivative);
        assert!(deviation[1].is_nan());
        assert!((deviation[2] - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_detector_falls_back() {
        let estimator = SegmentEstimator::new(None, RecordingMode::Velocity);
        let estimate = estimator.estimate(Some(&MotionRecord::new(2)), 2);
        assert_eq!(estimate.same_segment.len(), 2);
        assert_eq!(estimate.same_segment[0], SameSegment::uniform());
    }
}
