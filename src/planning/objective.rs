//! Objective functions scoring candidate actions.
//!
//! The objective is resolved once from its name into [`ObjectiveKind`];
//! scoring is a plain match on the variant. Higher scores are better.

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::LearnerError;
use crate::inference::hypothesis::HypothesisSpace;
use crate::inference::posterior::{entropy, forecast, kl_divergence, AlphaPrior};
use crate::inference::prior::{joint_distance, DistanceMetric};
use crate::inference::segments::SameSegment;
use crate::learner::experience::{ExperienceRecord, Streaks};
use crate::planning::sampling::CandidateAction;
use crate::simulation::mechanism::Mechanism;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    /// Uniform random score; the baseline.
    Random,
    /// Minimise the expected posterior entropy after the query.
    #[default]
    Entropy,
    /// Maximise the expected divergence between updated and current posterior.
    CrossEntropy,
    /// Query joints close to the one that was last unlocked.
    HeuristicProximity,
}

impl ObjectiveKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Entropy => "entropy",
            Self::CrossEntropy => "cross_entropy",
            Self::HeuristicProximity => "heuristic_proximity",
        }
    }

    /// Scores querying `ctx.checked_joint` after executing `ctx.action`.
    ///
    /// `None` marks a candidate the objective refuses to consider.
    pub fn score(self, ctx: &ScoreContext<'_>, rng: &mut StdRng) -> Option<f64> {
        match self {
            Self::Random => Some(rng.random::<f64>()),
            Self::Entropy => {
                let outcome = ctx.forecast();
                Some(
                    -(outcome.p_locked * entropy(&outcome.posterior_if_locked)
                        + (1.0 - outcome.p_locked) * entropy(&outcome.posterior_if_unlocked)),
                )
            }
            Self::CrossEntropy => {
                let outcome = ctx.forecast();
                Some(
                    outcome.p_locked * kl_divergence(&outcome.posterior_if_locked, ctx.posterior)
                        + (1.0 - outcome.p_locked)
                            * kl_divergence(&outcome.posterior_if_unlocked, ctx.posterior),
                )
            }
            Self::HeuristicProximity => {
                let moved = ctx.action.joint;
                if ctx.streaks.failures().contains(&moved) {
                    return None;
                }
                match ctx.streaks.last_success() {
                    None => Some(0.0),
                    Some(last) if last == moved => None,
                    Some(last) => Some(-joint_distance(
                        ctx.mechanism.joints(),
                        moved,
                        last,
                        DistanceMetric::from_3d_flag(ctx.use_3d_positions),
                    )),
                }
            }
        }
    }
}

impl fmt::Display for ObjectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectiveKind {
    type Err = LearnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(Self::Random),
            "entropy" => Ok(Self::Entropy),
            "cross_entropy" => Ok(Self::CrossEntropy),
            "heuristic_proximity" => Ok(Self::HeuristicProximity),
            other => Err(LearnerError::UnknownObjective(other.to_owned())),
        }
    }
}

/// Everything an objective may look at when scoring one candidate.
pub struct ScoreContext<'a> {
    pub action: &'a CandidateAction,
    pub checked_joint: usize,
    /// Experience of the checked joint.
    pub experience: &'a [ExperienceRecord],
    /// Current posterior of the checked joint.
    pub posterior: &'a [f64],
    pub prior_row: &'a [f64],
    pub space: HypothesisSpace,
    pub same_segment: &'a [SameSegment],
    pub alpha: AlphaPrior,
    pub streaks: &'a Streaks,
    pub mechanism: &'a dyn Mechanism,
    pub use_3d_positions: bool,
}

impl ScoreContext<'_> {
    fn forecast(&self) -> crate::inference::posterior::OutcomeForecast {
        forecast(
            self.posterior,
            self.experience,
            &self.action.target,
            self.same_segment,
            self.alpha,
            self.space,
        )
    }
}

/// A candidate together with its score.
#[derive(Clone, Debug)]
pub struct ScoredAction {
    pub action: CandidateAction,
    pub checked_joint: usize,
    pub value: f64,
}

fn approx_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= f64::EPSILON * a.abs().max(b.abs()).max(1.0)
}

/// Picks the highest score, breaking ties uniformly at random.
#[must_use]
pub fn select_best(scored: Vec<ScoredAction>, rng: &mut StdRng) -> Option<ScoredAction> {
    let best = scored
        .iter()
        .map(|s| s.value)
        .filter(|v| !v.is_nan())
        .fold(f64::NEG_INFINITY, f64::max);
    let tied: Vec<ScoredAction> = scored
        .into_iter()
        .filter(|s| approx_equal(s.value, best))
        .collect();
    tied.choose(rng).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::prior::DependencyPrior;
    use crate::simulation::mechanism::Lockbox;
    use rand::SeedableRng;

    fn scored(joint: usize, value: f64) -> ScoredAction {
        ScoredAction {
            action: CandidateAction {
                joint,
                target: vec![0.0; 3],
            },
            checked_joint: joint,
            value,
        }
    }

    #[test]
    fn test_parse_objective_names() {
        assert_eq!("cross_entropy".parse::<ObjectiveKind>().unwrap(), ObjectiveKind::CrossEntropy);
        assert_eq!(ObjectiveKind::HeuristicProximity.to_string(), "heuristic_proximity");
        assert!(matches!(
            "greedy".parse::<ObjectiveKind>(),
            Err(LearnerError::UnknownObjective(name)) if name == "greedy"
        ));
    }

    #[test]
    fn test_select_best_takes_maximum() {
        let mut rng = StdRng::seed_from_u64(1);
        let best = select_best(vec![scored(0, 0.1), scored(1, 0.7), scored(2, 0.3)], &mut rng);
        assert_eq!(best.unwrap().action.joint, 1);
    }

    #[test]
    fn test_select_best_breaks_ties_randomly() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen = [false; 2];
        for _ in 0..64 {
            let best = select_best(vec![scored(0, 0.5), scored(1, 0.5), scored(2, 0.1)], &mut rng)
                .unwrap();
            seen[best.action.joint] = true;
        }
        assert!(seen[0] && seen[1]);
    }

    #[test]
    fn test_select_best_on_empty() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(select_best(Vec::new(), &mut rng).is_none());
    }

    #[test]
    fn test_heuristic_proximity_prefers_neighbours() {
        let lockbox = Lockbox::demo(4);
        let prior = DependencyPrior::build(lockbox.joints(), 0.7, DistanceMetric::Sequential).unwrap();
        let same = vec![SameSegment::uniform(); 4];
        let mut streaks = Streaks::new();
        streaks.record(0, true);
        streaks.record(3, false);
        let mut rng = StdRng::seed_from_u64(0);

        let score_moving = |joint: usize, rng: &mut StdRng| {
            let action = CandidateAction {
                joint,
                target: vec![0.0; 4],
            };
            let ctx = ScoreContext {
                action: &action,
                checked_joint: 1,
                experience: &[],
                posterior: prior.row(1),
                prior_row: prior.row(1),
                space: prior.space(),
                same_segment: &same,
                alpha: AlphaPrior::default(),
                streaks: &streaks,
                mechanism: &lockbox,
                use_3d_positions: false,
            };
            ObjectiveKind::HeuristicProximity.score(&ctx, rng)
        };

        assert_eq!(score_moving(0, &mut rng), None);
        assert_eq!(score_moving(3, &mut rng), None);
        let near = score_moving(1, &mut rng).unwrap();
        let far = score_moving(2, &mut rng).unwrap();
        assert!(near > far);
    }

    #[test]
    fn test_information_objectives_are_finite() {
        let lockbox = Lockbox::demo(3);
        let prior = DependencyPrior::build(lockbox.joints(), 0.7, DistanceMetric::Sequential).unwrap();
        let same = vec![SameSegment::uniform(); 3];
        let streaks = Streaks::new();
        let experience = vec![ExperienceRecord {
            configuration: vec![0.0, 0.0, 0.0],
            observed_locked: true,
        }];
        let action = CandidateAction {
            joint: 0,
            target: vec![170.0, 0.0, 0.0],
        };
        let ctx = ScoreContext {
            action: &action,
            checked_joint: 1,
            experience: &experience,
            posterior: prior.row(1),
            prior_row: prior.row(1),
            space: prior.space(),
            same_segment: &same,
            alpha: AlphaPrior::default(),
            streaks: &streaks,
            mechanism: &lockbox,
            use_3d_positions: false,
        };
        let mut rng = StdRng::seed_from_u64(0);
        let entropy_score = ObjectiveKind::Entropy.score(&ctx, &mut rng).unwrap();
        let gain = ObjectiveKind::CrossEntropy.score(&ctx, &mut rng).unwrap();
        assert!(entropy_score.is_finite() && entropy_score <= 0.0);
        assert!(gain.is_finite() && gain >= 0.0);
    }
}
