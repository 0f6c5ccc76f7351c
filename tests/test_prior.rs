use joint_dependency::inference::hypothesis::{Dependency, HypothesisSpace};
use joint_dependency::inference::prior::{DependencyPrior, DistanceMetric};
use joint_dependency::simulation::mechanism::{Joint, Lockbox, Mechanism};
use proptest::prelude::*;

fn joints_at(coordinates: &[[f64; 3]]) -> Vec<Joint> {
    coordinates
        .iter()
        .enumerate()
        .map(|(i, &c)| Joint::new(i, 0.0, 180.0).with_coordinates(c))
        .collect()
}

#[test]
fn test_five_joint_layout() {
    let lockbox = Lockbox::demo(5);
    let prior = DependencyPrior::build(lockbox.joints(), 0.7, DistanceMetric::Sequential).unwrap();
    let space = prior.space();
    assert_eq!(space.len(), 5 + 10 + 1);
    for joint in 0..5 {
        let row = prior.row(joint);
        assert_eq!(row.len(), 16);
        assert_eq!(row[joint], 0.0);
        assert!((row[space.independent_index()] - 0.7).abs() < 1e-12);
    }
    let ground_truth = lockbox.ground_truth_matrix();
    assert_eq!(ground_truth[2][space.index_of(Dependency::Single(1)).unwrap()], 1.0);
}

#[test]
fn test_neighbour_outweighs_distant_joint() {
    let joints = joints_at(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [5.0, 0.0, 0.0]]);
    let prior = DependencyPrior::build(&joints, 0.5, DistanceMetric::Euclidean).unwrap();
    let row = prior.row(0);
    assert!(row[1] > row[2]);
    assert!((row[1] / row[2] - 5.0).abs() < 1e-9);
}

#[test]
fn test_metric_falls_back_without_coordinates() {
    let joints: Vec<Joint> = (0..3).map(|i| Joint::new(i, 0.0, 90.0)).collect();
    let euclidean = DependencyPrior::build(&joints, 0.7, DistanceMetric::Euclidean).unwrap();
    let sequential = DependencyPrior::build(&joints, 0.7, DistanceMetric::Sequential).unwrap();
    assert_eq!(euclidean.rows(), sequential.rows());
}

#[test]
fn test_space_matches_joint_count() {
    let prior = DependencyPrior::build(&joints_at(&[[0.0; 3]; 4]), 0.7, DistanceMetric::Euclidean).unwrap();
    assert_eq!(prior.space(), HypothesisSpace::new(4));
    assert!(prior.rows().iter().flatten().all(|p| p.is_finite()));
}

fn coordinates_strategy() -> impl Strategy<Value = Vec<[f64; 3]>> {
    prop::collection::vec(
        (-10.0..10.0_f64, -10.0..10.0_f64, -10.0..10.0_f64).prop_map(|(x, y, z)| [x, y, z]),
        2..7,
    )
}

proptest! {
    #[test]
    fn prop_rows_sum_to_one_with_fixed_independence(
        coordinates in coordinates_strategy(),
        independent_prior in 0.01..0.99_f64,
    ) {
        let joints = joints_at(&coordinates);
        let prior = DependencyPrior::build(&joints, independent_prior, DistanceMetric::Euclidean).unwrap();
        let independent = prior.space().independent_index();
        for (joint, row) in prior.rows().iter().enumerate() {
            let non_self: f64 = row
                .iter()
                .enumerate()
                .filter(|&(column, _)| column != joint)
                .map(|(_, p)| p)
                .sum();
            prop_assert!((non_self - 1.0).abs() < 1e-9);
            prop_assert!((row[independent] - independent_prior).abs() < 1e-12);
            prop_assert!(row.iter().all(|p| p.is_finite() && *p >= 0.0));
        }
    }

    #[test]
    fn prop_build_is_idempotent(
        coordinates in coordinates_strategy(),
        independent_prior in 0.01..0.99_f64,
    ) {
        let joints = joints_at(&coordinates);
        let first = DependencyPrior::build(&joints, independent_prior, DistanceMetric::Euclidean).unwrap();
        let second = DependencyPrior::build(&joints, independent_prior, DistanceMetric::Euclidean).unwrap();
        prop_assert_eq!(first, second);
    }
}
