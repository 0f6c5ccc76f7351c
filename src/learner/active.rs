//! The active-learning loop.
//!
//! Each iteration samples candidate actions, scores each against the belief
//! of a randomly chosen joint, executes the winner, observes the lock
//! state of the targeted joint and updates every posterior. The snapshot on
//! disk is rewritten at the end of every completed iteration.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::LearnerConfig;
use crate::error::LearnerError;
use crate::inference::changepoint::ChangepointDetector;
use crate::inference::posterior::{calc_posteriors, entropy, kl_divergence};
use crate::inference::prior::DependencyPrior;
use crate::inference::segments::{SegmentEstimate, SegmentEstimator};
use crate::learner::experience::{ExperienceRecord, Streaks};
use crate::learner::profile::calibration_sweep;
use crate::learner::snapshot::{IterationRow, RunMetadata, RunSnapshot, SnapshotStore};
use crate::planning::objective::{select_best, ScoreContext, ScoredAction};
use crate::planning::sampling::{ActionSampler, CandidateAction};
use crate::simulation::executor::ActionExecutor;
use crate::simulation::mechanism::Mechanism;
use crate::simulation::params::NOOP_TOLERANCE;

/// Why a run stopped without an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No viable candidate action remained.
    Exhausted,
    /// Every configured query was spent.
    BudgetReached,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Completed iterations, equal to the number of snapshot rows.
    pub iterations: usize,
}

type ProgressCallback<'d> = Box<dyn FnMut(&IterationRow) + 'd>;

/// One learning run against one mechanism.
pub struct ActiveLearner<'d, E: ActionExecutor> {
    config: LearnerConfig,
    executor: E,
    sampler: Box<dyn ActionSampler + 'd>,
    detector: Option<&'d dyn ChangepointDetector>,
    progress: Option<ProgressCallback<'d>>,
    base_seed: u64,
    seed: u64,
    rng: StdRng,
    run_label: Option<usize>,
    store: SnapshotStore,
    prior: DependencyPrior,
    segments: SegmentEstimate,
    experiences: Vec<Vec<ExperienceRecord>>,
    posteriors: Vec<Vec<f64>>,
    streaks: Streaks,
    snapshot: RunSnapshot,
}

impl<'d, E: ActionExecutor> ActiveLearner<'d, E> {
    /// Validates the configuration and builds the dependency prior.
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration.
    pub fn new(
        config: LearnerConfig,
        executor: E,
        sampler: Box<dyn ActionSampler + 'd>,
    ) -> Result<Self, LearnerError> {
        config.validate()?;
        let mechanism = executor.mechanism();
        let joint_count = mechanism.joint_count();
        if joint_count == 0 {
            return Err(LearnerError::InvalidConfig {
                reason: "mechanism has no joints".to_owned(),
            });
        }
        let prior = DependencyPrior::build(
            mechanism.joints(),
            config.independent_prior,
            config.distance_metric(),
        )?;
        let segments = SegmentEstimate::uniform(joint_count);
        let base_seed = config.seed.unwrap_or_else(rand::random);
        let date = Utc::now();
        let store = SnapshotStore::new(&config.output_dir, date, config.objective, None);

        let metadata = RunMetadata {
            date,
            run_label: None,
            seed: base_seed,
            objective: config.objective,
            sampler: config.sampler,
            samples: config.samples,
            queries: config.queries,
            changepoint_detection: config.use_changepoints,
            use_3d_positions: config.use_3d_positions,
            alpha_prior: config.alpha_prior,
            independent_prior: prior.independent_prior(),
            model_prior: prior.rows().to_vec(),
            changepoint_probabilities: segments.changepoints.clone(),
            same_segment: segments
                .same_segment
                .iter()
                .map(|s| s.probabilities().to_vec())
                .collect(),
            dependency_ground_truth: mechanism.ground_truth().to_vec(),
        };
        let posteriors = prior.rows().to_vec();

        Ok(Self {
            config,
            executor,
            sampler,
            detector: None,
            progress: None,
            base_seed,
            seed: base_seed,
            rng: StdRng::seed_from_u64(base_seed),
            run_label: None,
            store,
            prior,
            segments,
            experiences: vec![Vec::new(); joint_count],
            posteriors,
            streaks: Streaks::new(),
            snapshot: RunSnapshot::new(metadata),
        })
    }

    /// Detector used for the calibration sweep when changepoints are enabled.
    #[must_use]
    pub fn with_detector(mut self, detector: &'d dyn ChangepointDetector) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Marks this as run `k` of a batch: seeds with `seed + k` and suffixes
    /// the snapshot file name.
    #[must_use]
    pub fn with_run_label(mut self, run: usize) -> Self {
        self.run_label = Some(run);
        self.seed = self.base_seed.wrapping_add(run as u64);
        self.rng = StdRng::seed_from_u64(self.seed);
        let metadata = &mut self.snapshot.metadata;
        metadata.run_label = Some(run);
        metadata.seed = self.seed;
        self.store = SnapshotStore::new(
            &self.config.output_dir,
            metadata.date,
            self.config.objective,
            Some(run),
        );
        self
    }

    /// Called with every completed iteration row.
    #[must_use]
    pub fn with_progress(mut self, callback: impl FnMut(&IterationRow) + 'd) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub const fn snapshot(&self) -> &RunSnapshot {
        &self.snapshot
    }

    #[must_use]
    pub fn snapshot_path(&self) -> &std::path::Path {
        self.store.path()
    }

    #[must_use]
    pub fn experiences(&self) -> &[Vec<ExperienceRecord>] {
        &self.experiences
    }

    #[must_use]
    pub fn posteriors(&self) -> &[Vec<f64>] {
        &self.posteriors
    }

    #[must_use]
    pub const fn prior(&self) -> &DependencyPrior {
        &self.prior
    }

    #[must_use]
    pub const fn executor(&self) -> &E {
        &self.executor
    }

    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Runs until the query budget is spent or no action remains.
    ///
    /// # Errors
    ///
    /// A consistency error, an executor failure, or a failed snapshot write
    /// aborts the run. Every iteration completed before it is on disk.
    pub fn run(&mut self) -> Result<RunOutcome, LearnerError> {
        self.initialise()?;

        for iteration in 1..=self.config.queries {
            match self.step(iteration) {
                Ok(Some(row)) => {
                    self.snapshot.rows.push(row);
                    self.store.persist(&self.snapshot)?;
                    if let (Some(callback), Some(row)) =
                        (self.progress.as_mut(), self.snapshot.rows.last())
                    {
                        callback(row);
                    }
                }
                Ok(None) => {
                    info!(iteration, "no viable action left, stopping");
                    return Ok(RunOutcome {
                        status: RunStatus::Exhausted,
                        iterations: self.snapshot.rows.len(),
                    });
                }
                Err(e) => {
                    error!(iteration, error = %e, "run aborted");
                    return Err(e);
                }
            }
        }

        info!(
            iterations = self.snapshot.rows.len(),
            path = %self.store.path().display(),
            "query budget reached"
        );
        Ok(RunOutcome {
            status: RunStatus::BudgetReached,
            iterations: self.snapshot.rows.len(),
        })
    }

    fn initialise(&mut self) -> Result<(), LearnerError> {
        for (joint, h) in self.prior.entropies().iter().enumerate() {
            debug!(joint, entropy = h, "prior entropy");
        }
        if self.config.use_changepoints {
            if self.detector.is_some() {
                calibration_sweep(&mut self.executor)?;
            } else {
                warn!("changepoint priors requested without a detector");
            }
            let estimator =
                SegmentEstimator::new(self.detector, self.executor.recording_mode());
            self.segments = estimator.estimate(
                self.executor.motion_record(),
                self.executor.mechanism().joint_count(),
            );
            let metadata = &mut self.snapshot.metadata;
            metadata.changepoint_probabilities = self.segments.changepoints.clone();
            metadata.same_segment = self
                .segments
                .same_segment
                .iter()
                .map(|s| s.probabilities().to_vec())
                .collect();
        }
        // Motion is only read above; later actions need not be recorded.
        self.executor.set_recording(false);
        info!(
            seed = self.seed,
            objective = %self.config.objective,
            sampler = self.sampler.name(),
            path = %self.store.path().display(),
            "starting run"
        );
        self.store.persist(&self.snapshot)
    }

    /// Scores every candidate against its own uniformly drawn joint.
    /// Candidates the objective refuses are dropped.
    fn score_candidates(&mut self, candidates: Vec<CandidateAction>) -> Vec<ScoredAction> {
        let mechanism = self.executor.mechanism();
        let joint_count = mechanism.joint_count();
        let mut scored = Vec::with_capacity(candidates.len());
        for action in candidates {
            let checked_joint = self.rng.random_range(0..joint_count);
            let ctx = ScoreContext {
                action: &action,
                checked_joint,
                experience: &self.experiences[checked_joint],
                posterior: &self.posteriors[checked_joint],
                prior_row: self.prior.row(checked_joint),
                space: self.prior.space(),
                same_segment: &self.segments.same_segment,
                alpha: self.config.alpha_prior,
                streaks: &self.streaks,
                mechanism,
                use_3d_positions: self.config.use_3d_positions,
            };
            if let Some(value) = self.config.objective.score(&ctx, &mut self.rng) {
                scored.push(ScoredAction {
                    action,
                    checked_joint,
                    value,
                });
            }
        }
        scored
    }

    /// One iteration. `Ok(None)` signals exhaustion.
    fn step(&mut self, iteration: usize) -> Result<Option<IterationRow>, LearnerError> {
        let mechanism = self.executor.mechanism();
        let joint_count = mechanism.joint_count();
        let lock_states_before = mechanism.locked_states();
        let positions_before = mechanism.positions();

        let known: Vec<Option<bool>> = lock_states_before.iter().copied().map(Some).collect();
        let candidates = self
            .sampler
            .sample(self.config.samples, mechanism, &known, &mut self.rng);

        let scored = self.score_candidates(candidates);
        let Some(best) = select_best(scored, &mut self.rng) else {
            return Ok(None);
        };
        let joint = best.action.joint;
        let checked_joint = best.checked_joint;
        if joint >= joint_count {
            return Err(LearnerError::InvalidAction {
                joint,
                reason: format!("mechanism has {joint_count} joints"),
            });
        }

        let noop = best
            .action
            .target
            .iter()
            .zip(&positions_before)
            .all(|(t, p)| (t - p).abs() < NOOP_TOLERANCE);
        let unlocked = if noop {
            debug!(iteration, joint, "chosen action is a no-op");
            !self.executor.mechanism().is_locked(joint)
        } else {
            self.executor.run_action(&best.action.target, joint)?
        };

        let mechanism = self.executor.mechanism();
        let lock_states_after = mechanism.locked_states();
        let observed_locked = lock_states_after[joint];
        if observed_locked == unlocked {
            return Err(LearnerError::Consistency {
                joint,
                reported_unlocked: unlocked,
                observed_locked,
            });
        }

        self.streaks.record(joint, unlocked);
        let positions_after = mechanism.positions();
        self.experiences[joint].push(ExperienceRecord {
            configuration: positions_after.clone(),
            observed_locked,
        });

        self.posteriors = calc_posteriors(
            &self.experiences,
            &self.segments.same_segment,
            self.config.alpha_prior,
            &self.prior,
        );
        let entropies: Vec<f64> = self.posteriors.iter().map(|p| entropy(p)).collect();
        let kl_divergences: Vec<f64> = mechanism
            .ground_truth_matrix()
            .iter()
            .zip(&self.posteriors)
            .map(|(truth, posterior)| kl_divergence(truth, posterior))
            .collect();

        info!(
            iteration,
            joint,
            checked_joint,
            unlocked,
            score = best.value,
            mean_kl = kl_divergences.iter().sum::<f64>() / joint_count as f64,
            "iteration complete"
        );

        Ok(Some(IterationRow {
            iteration,
            lock_states_before,
            positions_before,
            desired_positions: best.action.target,
            desired_joint: joint,
            checked_joint,
            score: best.value,
            noop,
            positions_after,
            lock_states_after,
            posteriors: self.posteriors.clone(),
            entropies,
            kl_divergences,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::objective::ObjectiveKind;
    use crate::planning::sampling::SamplingStrategy;
    use crate::simulation::executor::SimulatedExecutor;
    use crate::simulation::mechanism::Lockbox;
    use std::collections::HashSet;

    #[test]
    fn test_candidates_are_scored_against_different_joints() {
        let dir = tempfile::tempdir().unwrap();
        let config = LearnerConfig {
            objective: ObjectiveKind::Random,
            seed: Some(3),
            output_dir: dir.path().to_path_buf(),
            ..LearnerConfig::default()
        };
        let mut learner = ActiveLearner::new(
            config,
            SimulatedExecutor::new(Lockbox::demo(4)),
            Box::new(SamplingStrategy::Boundary),
        )
        .unwrap();

        let candidates: Vec<CandidateAction> = (0..100)
            .map(|i| CandidateAction {
                joint: i % 4,
                target: vec![0.0; 4],
            })
            .collect();
        let scored = learner.score_candidates(candidates);
        assert_eq!(scored.len(), 100);

        let checked: HashSet<usize> = scored.iter().map(|s| s.checked_joint).collect();
        assert!(checked.len() > 1, "every candidate checked joint {checked:?}");
        assert!(checked.iter().all(|&j| j < 4));
    }
}
