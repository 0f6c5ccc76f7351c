//! Posterior over dependency hypotheses.
//!
//! Each hypothesis predicts the lock state of a joint from earlier
//! observations: a past record informs a new one to the extent that the
//! gating joints' positions lie in the same segment. For a hypothesis `h`
//! and records `e_1 .. e_k` the likelihood is the sequential predictive
//!
//! ```text
//! p(e_k | e_<k, h) = (α_o + Σ_{m<k, o_m = o_k} w_h(m, k)) / (α_l + α_u + Σ_{m<k} w_h(m, k))
//! ```
//!
//! where `w_h` is the same-segment weight along the master joints of `h`
//! (1 for independence). The posterior is prior × likelihood, normalised.

use serde::{Deserialize, Serialize};

use crate::inference::hypothesis::{Dependency, HypothesisSpace};
use crate::inference::prior::DependencyPrior;
use crate::inference::segments::SameSegment;
use crate::learner::experience::ExperienceRecord;
use crate::simulation::params::{ALPHA_PRIOR_LOCKED, ALPHA_PRIOR_UNLOCKED, PROBABILITY_FLOOR};

/// Beta pseudo-counts for the lock outcome of a segment.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlphaPrior {
    pub locked: f64,
    pub unlocked: f64,
}

impl Default for AlphaPrior {
    fn default() -> Self {
        Self {
            locked: ALPHA_PRIOR_LOCKED,
            unlocked: ALPHA_PRIOR_UNLOCKED,
        }
    }
}

/// Same-segment weight between two configurations under a hypothesis.
fn similarity(
    dependency: Dependency,
    from: &[f64],
    to: &[f64],
    same_segment: &[SameSegment],
) -> f64 {
    dependency
        .masters()
        .into_iter()
        .map(|j| same_segment[j].weight_between(from[j], to[j]))
        .product()
}

/// Probability that a joint is locked at `configuration` given earlier
/// records, under one hypothesis.
#[must_use]
pub fn predictive_locked(
    dependency: Dependency,
    experience: &[ExperienceRecord],
    configuration: &[f64],
    same_segment: &[SameSegment],
    alpha: AlphaPrior,
) -> f64 {
    let mut locked = alpha.locked;
    let mut unlocked = alpha.unlocked;
    for record in experience {
        let weight = similarity(dependency, &record.configuration, configuration, same_segment);
        if record.observed_locked {
            locked += weight;
        } else {
            unlocked += weight;
        }
    }
    locked / (locked + unlocked)
}

fn log_likelihood(
    dependency: Dependency,
    experience: &[ExperienceRecord],
    same_segment: &[SameSegment],
    alpha: AlphaPrior,
) -> f64 {
    (0..experience.len())
        .map(|k| {
            let record = &experience[k];
            let p_locked = predictive_locked(
                dependency,
                &experience[..k],
                &record.configuration,
                same_segment,
                alpha,
            );
            let p = if record.observed_locked {
                p_locked
            } else {
                1.0 - p_locked
            };
            p.max(PROBABILITY_FLOOR).ln()
        })
        .sum()
}

/// Normalises log weights in place into probabilities. Returns false when
/// no weight is finite.
fn normalise_log(weights: &mut [f64]) -> bool {
    let max = weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return false;
    }
    let mut total = 0.0;
    for w in weights.iter_mut() {
        *w = (*w - max).exp();
        total += *w;
    }
    for w in weights.iter_mut() {
        *w /= total;
    }
    true
}

/// Posterior of one joint given its experience.
///
/// Hypotheses with zero prior stay at zero. Falls back to the prior if the
/// likelihood underflows everywhere.
#[must_use]
pub fn model_posterior(
    experience: &[ExperienceRecord],
    same_segment: &[SameSegment],
    alpha: AlphaPrior,
    prior_row: &[f64],
    space: HypothesisSpace,
) -> Vec<f64> {
    let mut log_posterior: Vec<f64> = prior_row
        .iter()
        .enumerate()
        .map(|(index, &prior)| {
            if prior <= 0.0 {
                return f64::NEG_INFINITY;
            }
            space.hypothesis(index).map_or(f64::NEG_INFINITY, |dependency| {
                prior.ln() + log_likelihood(dependency, experience, same_segment, alpha)
            })
        })
        .collect();

    if normalise_log(&mut log_posterior) {
        log_posterior
    } else {
        prior_row.to_vec()
    }
}

/// Posteriors of every joint.
#[must_use]
pub fn calc_posteriors(
    experiences: &[Vec<ExperienceRecord>],
    same_segment: &[SameSegment],
    alpha: AlphaPrior,
    prior: &DependencyPrior,
) -> Vec<Vec<f64>> {
    experiences
        .iter()
        .enumerate()
        .map(|(joint, experience)| {
            model_posterior(experience, same_segment, alpha, prior.row(joint), prior.space())
        })
        .collect()
}

/// Predicted outcome of probing a joint at a configuration.
#[derive(Clone, Debug)]
pub struct OutcomeForecast {
    /// Marginal probability of observing the joint locked.
    pub p_locked: f64,
    pub posterior_if_locked: Vec<f64>,
    pub posterior_if_unlocked: Vec<f64>,
}

/// One-step Bayesian update of a current posterior for both outcomes.
#[must_use]
pub fn forecast(
    posterior: &[f64],
    experience: &[ExperienceRecord],
    configuration: &[f64],
    same_segment: &[SameSegment],
    alpha: AlphaPrior,
    space: HypothesisSpace,
) -> OutcomeForecast {
    let mut if_locked = vec![0.0; posterior.len()];
    let mut if_unlocked = vec![0.0; posterior.len()];
    for (index, &p) in posterior.iter().enumerate() {
        if p <= 0.0 {
            continue;
        }
        let Some(dependency) = space.hypothesis(index) else {
            continue;
        };
        let p_locked = predictive_locked(dependency, experience, configuration, same_segment, alpha);
        if_locked[index] = p * p_locked;
        if_unlocked[index] = p * (1.0 - p_locked);
    }

    let p_locked: f64 = if_locked.iter().sum();
    let p_unlocked: f64 = if_unlocked.iter().sum();
    normalise(&mut if_locked, posterior);
    normalise(&mut if_unlocked, posterior);
    let total = p_locked + p_unlocked;
    OutcomeForecast {
        p_locked: if total > 0.0 { p_locked / total } else { 0.5 },
        posterior_if_locked: if_locked,
        posterior_if_unlocked: if_unlocked,
    }
}

fn normalise(weights: &mut [f64], fallback: &[f64]) {
    let total: f64 = weights.iter().sum();
    if total > 0.0 && total.is_finite() {
        for w in weights.iter_mut() {
            *w /= total;
        }
    } else {
        weights.copy_from_slice(fallback);
    }
}

/// Shannon entropy in nats.
#[must_use]
pub fn entropy(p: &[f64]) -> f64 {
    -p.iter()
        .filter(|&&x| x > 0.0)
        .map(|&x| x * x.ln())
        .sum::<f64>()
}

/// Kullback-Leibler divergence `KL(p || q)` in nats.
///
/// `q` is floored at `PROBABILITY_FLOOR` so the result stays finite.
#[must_use]
pub fn kl_divergence(p: &[f64], q: &[f64]) -> f64 {
    p.iter()
        .zip(q)
        .filter(|(&pi, _)| pi > 0.0)
        .map(|(&pi, &qi)| pi * (pi / qi.max(PROBABILITY_FLOOR)).ln())
        .sum()
}
