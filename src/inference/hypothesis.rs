//! The restricted hypothesis space over dependency structures.
//!
//! A joint is gated either by one other joint, by an unordered pair of
//! joints, or by nothing at all. For `n` joints every belief row has the
//! column layout
//!
//! ```text
//! [ single 0 .. single n-1 | pair (0,1) (0,2) .. (n-2,n-1) | independent ]
//! ```
//!
//! The single column of the joint itself is kept so that all rows share one
//! layout; its prior mass is always zero.

use serde::{Deserialize, Serialize};

/// One candidate explanation of what gates a joint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dependency {
    /// The joint is never gated.
    Independent,
    /// The joint is gated by a single master joint.
    Single(usize),
    /// The joint is gated by two master joints together.
    Pair(usize, usize),
}

impl Dependency {
    /// Builds a pair hypothesis with its members in ascending order.
    #[must_use]
    pub fn pair(a: usize, b: usize) -> Self {
        Self::Pair(a.min(b), a.max(b))
    }

    /// Returns the master joints this hypothesis refers to.
    #[must_use]
    pub fn masters(self) -> Vec<usize> {
        match self {
            Self::Independent => Vec::new(),
            Self::Single(j) => vec![j],
            Self::Pair(a, b) => vec![a, b],
        }
    }
}

/// Number of ways to choose `r` items out of `n`.
#[must_use]
pub fn ncr(n: usize, r: usize) -> usize {
    if r > n {
        return 0;
    }
    let r = r.min(n - r);
    (0..r).fold(1, |acc, i| acc * (n - i) / (i + 1))
}

/// Index arithmetic for the hypothesis columns of an `n`-joint mechanism.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HypothesisSpace {
    joints: usize,
}

impl HypothesisSpace {
    #[must_use]
    pub const fn new(joints: usize) -> Self {
        Self { joints }
    }

    #[must_use]
    pub const fn joints(&self) -> usize {
        self.joints
    }

    #[must_use]
    pub const fn pair_count(&self) -> usize {
        if self.joints < 2 {
            0
        } else {
            self.joints * (self.joints - 1) / 2
        }
    }

    /// Total number of columns in a belief row.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.joints + self.pair_count() + 1
    }

    /// A hypothesis space always holds the independence column.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    #[must_use]
    pub const fn independent_index(&self) -> usize {
        self.len() - 1
    }

    /// Column of the pair `(a, b)` with `a < b`.
    const fn pair_index(&self, a: usize, b: usize) -> usize {
        let n = self.joints;
        self.joints + a * (2 * n - a - 1) / 2 + (b - a - 1)
    }

    /// Column index of a hypothesis, or `None` if it names unknown joints.
    #[must_use]
    pub fn index_of(&self, dependency: Dependency) -> Option<usize> {
        match dependency {
            Dependency::Independent => Some(self.independent_index()),
            Dependency::Single(j) if j < self.joints => Some(j),
            Dependency::Pair(a, b) if a != b && a.max(b) < self.joints => {
                Some(self.pair_index(a.min(b), a.max(b)))
            }
            _ => None,
        }
    }

    /// Hypothesis stored in a column.
    #[must_use]
    pub fn hypothesis(&self, index: usize) -> Option<Dependency> {
        if index < self.joints {
            return Some(Dependency::Single(index));
        }
        if index == self.independent_index() {
            return Some(Dependency::Independent);
        }
        self.pairs()
            .nth(index - self.joints)
            .map(|(a, b)| Dependency::Pair(a, b))
    }

    /// Unordered pairs in column order.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> {
        let n = self.joints;
        (0..n).flat_map(move |a| (a + 1..n).map(move |b| (a, b)))
    }

    /// All hypotheses in column order.
    pub fn hypotheses(&self) -> impl Iterator<Item = Dependency> + '_ {
        (0..self.len()).filter_map(|index| self.hypothesis(index))
    }

    /// One-hot belief row for a known dependency.
    #[must_use]
    pub fn one_hot(&self, dependency: Dependency) -> Vec<f64> {
        let mut row = vec![0.0; self.len()];
        if let Some(index) = self.index_of(dependency) {
            row[index] = 1.0;
        }
        row
    }
}
