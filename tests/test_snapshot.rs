use chrono::{TimeZone, Utc};
use joint_dependency::inference::hypothesis::Dependency;
use joint_dependency::inference::posterior::AlphaPrior;
use joint_dependency::learner::snapshot::{IterationRow, RunMetadata, RunSnapshot, SnapshotStore};
use joint_dependency::planning::objective::ObjectiveKind;
use joint_dependency::planning::sampling::SamplingStrategy;
use joint_dependency::LearnerError;

fn metadata() -> RunMetadata {
    RunMetadata {
        date: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        run_label: Some(1),
        seed: 42,
        objective: ObjectiveKind::Entropy,
        sampler: SamplingStrategy::Boundary,
        samples: 10,
        queries: 3,
        changepoint_detection: false,
        use_3d_positions: false,
        alpha_prior: AlphaPrior::default(),
        independent_prior: 0.7,
        model_prior: vec![vec![0.0, 0.3, 0.7], vec![0.3, 0.0, 0.7]],
        changepoint_probabilities: Vec::new(),
        same_segment: Vec::new(),
        dependency_ground_truth: vec![Dependency::Independent, Dependency::Single(0)],
    }
}

fn row(iteration: usize) -> IterationRow {
    IterationRow {
        iteration,
        lock_states_before: vec![false, true],
        positions_before: vec![0.0, 0.0],
        desired_positions: vec![170.0, 0.0],
        desired_joint: 0,
        checked_joint: 1,
        score: -0.25,
        noop: false,
        positions_after: vec![170.0, 0.0],
        lock_states_after: vec![false, false],
        posteriors: vec![vec![0.0, 0.2, 0.8], vec![0.5, 0.0, 0.5]],
        entropies: vec![0.5, 0.69],
        kl_divergences: vec![0.22, 0.69],
    }
}

#[test]
fn test_rewrite_keeps_latest_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path(), metadata().date, ObjectiveKind::Entropy, Some(1));
    let mut snapshot = RunSnapshot::new(metadata());

    store.persist(&snapshot).unwrap();
    assert!(SnapshotStore::load(store.path()).unwrap().rows.is_empty());

    for i in 1..=3 {
        snapshot.rows.push(row(i));
        store.persist(&snapshot).unwrap();
    }
    let loaded = SnapshotStore::load(store.path()).unwrap();
    assert_eq!(loaded, snapshot);

    // Only the snapshot itself remains, no temporary files.
    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(names.len(), 1);
    assert_eq!(names[0], "data_2024-01-02-03-04-05_entropy_run1.json");
}

#[test]
fn test_persist_creates_missing_directories() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::at(dir.path().join("nested/out/run.json"));
    store.persist(&RunSnapshot::new(metadata())).unwrap();
    assert!(store.path().exists());
}

#[test]
fn test_loading_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");
    assert!(matches!(
        SnapshotStore::load(&missing),
        Err(LearnerError::Io { path, .. }) if path == missing
    ));
}

#[test]
fn test_corrupt_file_is_serialization_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, b"{\"metadata\": ").unwrap();
    assert!(matches!(
        SnapshotStore::load(&path),
        Err(LearnerError::Serialization(_))
    ));
}
