//! Seeded isolation-forest ensemble.
//!
//! Each tree recursively partitions the standardized feature space with
//! uniformly random feature/split pairs until points are isolated or the
//! depth limit is reached. A point's average isolation depth across the
//! ensemble, normalized against the expected path length of a random
//! binary search tree, yields its isolation score.

use poi_audit_poi_models::FEATURE_DIMENSIONS;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{ForestConfig, OutlierScorer};

/// Euler-Mascheroni constant for the harmonic-number approximation.
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Expected path length of an unsuccessful search in a binary search tree
/// built over `n` points: `c(n) = 2*H(n-1) - 2*(n-1)/n`, with
/// `H(i) ~ ln(i) + gamma`.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Depth limit for a tree grown over a sub-sample of `psi` points.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn height_limit(psi: usize) -> usize {
    (psi as f64).log2().ceil() as usize
}

/// One isolation tree.
enum Tree {
    /// Terminal node holding `size` un-separated points.
    Leaf { size: usize },
    /// Random partition on one feature.
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Tree>,
        right: Box<Tree>,
    },
}

impl Tree {
    fn grow(
        rows: &[[f64; FEATURE_DIMENSIONS]],
        sample: &[usize],
        depth: usize,
        limit: usize,
        rng: &mut StdRng,
    ) -> Self {
        if sample.len() <= 1 || depth >= limit {
            return Self::Leaf {
                size: sample.len(),
            };
        }

        let mut bounds = [(f64::INFINITY, f64::NEG_INFINITY); FEATURE_DIMENSIONS];
        for &index in sample {
            for (bound, value) in bounds.iter_mut().zip(&rows[index]) {
                bound.0 = bound.0.min(*value);
                bound.1 = bound.1.max(*value);
            }
        }

        // Only features with spread can separate anything; a sample that
        // is identical in every dimension terminates here.
        let candidates: Vec<usize> = (0..FEATURE_DIMENSIONS)
            .filter(|&dimension| bounds[dimension].0 < bounds[dimension].1)
            .collect();
        if candidates.is_empty() {
            return Self::Leaf {
                size: sample.len(),
            };
        }

        let feature = candidates[rng.gen_range(0..candidates.len())];
        let (low, high) = bounds[feature];
        let threshold = rng.gen_range(low..high);

        let (left, right): (Vec<usize>, Vec<usize>) = sample
            .iter()
            .copied()
            .partition(|&index| rows[index][feature] < threshold);

        Self::Split {
            feature,
            threshold,
            left: Box::new(Self::grow(rows, &left, depth + 1, limit, rng)),
            right: Box::new(Self::grow(rows, &right, depth + 1, limit, rng)),
        }
    }

    /// Isolation depth of `row`, with multi-point leaves extended by the
    /// expected sub-tree depth `c(size)`.
    #[allow(clippy::cast_precision_loss)]
    fn path_length(&self, row: &[f64; FEATURE_DIMENSIONS], depth: usize) -> f64 {
        match self {
            Self::Leaf { size } => depth as f64 + average_path_length(*size),
            Self::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] < *threshold {
                    left.path_length(row, depth + 1)
                } else {
                    right.path_length(row, depth + 1)
                }
            }
        }
    }
}

/// The default [`OutlierScorer`]: a seeded ensemble of isolation trees.
#[derive(Debug, Clone, Copy)]
pub struct IsolationForestScorer {
    trees: usize,
    max_samples: usize,
    seed: u64,
}

impl IsolationForestScorer {
    /// Builds a scorer from the detection configuration.
    #[must_use]
    pub const fn from_config(config: &ForestConfig) -> Self {
        Self {
            trees: config.trees,
            max_samples: config.max_samples,
            seed: config.seed,
        }
    }
}

impl OutlierScorer for IsolationForestScorer {
    /// Fits the ensemble on `rows` and scores every row.
    ///
    /// The root RNG is seeded from the configured value and draws one
    /// sub-seed per tree, so repeated runs on identical input are
    /// bit-identical, and trees could be grown in parallel without
    /// changing the result.
    #[allow(clippy::cast_precision_loss)]
    fn fit_score(&self, rows: &[[f64; FEATURE_DIMENSIONS]]) -> Vec<f64> {
        let count = rows.len();
        if count < 2 || self.trees == 0 {
            return vec![0.0; count];
        }

        let psi = self.max_samples.min(count).max(2);
        let limit = height_limit(psi);
        let normalization = average_path_length(psi);

        let mut root_rng = StdRng::seed_from_u64(self.seed);
        let mut path_sums = vec![0.0; count];

        for _ in 0..self.trees {
            let tree_seed: u64 = root_rng.r#gen();
            let mut tree_rng = StdRng::seed_from_u64(tree_seed);

            let sample = rand::seq::index::sample(&mut tree_rng, count, psi).into_vec();
            let tree = Tree::grow(rows, &sample, 0, limit, &mut tree_rng);

            for (sum, row) in path_sums.iter_mut().zip(rows) {
                *sum += tree.path_length(row, 0);
            }
        }

        path_sums
            .into_iter()
            .map(|sum| {
                let average = sum / self.trees as f64;
                let isolation = 2.0f64.powf(-average / normalization);
                // Decision-score convention: 0.5 - isolation, so lower
                // values mean more anomalous.
                0.5 - isolation
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_constant_matches_known_values() {
        assert!((average_path_length(0) - 0.0).abs() < f64::EPSILON);
        assert!((average_path_length(1) - 0.0).abs() < f64::EPSILON);
        assert!((average_path_length(2) - 1.0).abs() < f64::EPSILON);
        // c(n) grows with n.
        assert!(average_path_length(256) > average_path_length(16));
    }

    #[test]
    fn height_limit_is_log2_ceiling() {
        assert_eq!(height_limit(2), 1);
        assert_eq!(height_limit(8), 3);
        assert_eq!(height_limit(256), 8);
        assert_eq!(height_limit(100), 7);
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn isolated_point_scores_lower() {
        let mut rows = vec![[0.0; FEATURE_DIMENSIONS]; 32];
        for (index, row) in rows.iter_mut().enumerate() {
            // Tight cluster with small jitter.
            row[0] = (index % 7) as f64 * 0.01;
            row[1] = (index % 5) as f64 * 0.01;
        }
        rows.push([10.0, 10.0, 10.0, 10.0]);

        let scorer = IsolationForestScorer {
            trees: 100,
            max_samples: 256,
            seed: 42,
        };
        let scores = scorer.fit_score(&rows);
        let outlier = scores[rows.len() - 1];
        assert!(
            scores[..rows.len() - 1].iter().all(|&score| outlier < score),
            "outlier {outlier} not below cluster scores"
        );
    }

    #[test]
    fn scores_are_deterministic_for_a_seed() {
        let rows: Vec<[f64; FEATURE_DIMENSIONS]> = (0..16)
            .map(|index| {
                let value = f64::from(index);
                [value, value * 2.0, value.sin(), 1.0]
            })
            .collect();
        let scorer = IsolationForestScorer {
            trees: 50,
            max_samples: 16,
            seed: 7,
        };

        let first = scorer.fit_score(&rows);
        let second = scorer.fit_score(&rows);
        let first_bits: Vec<u64> = first.iter().map(|score| score.to_bits()).collect();
        let second_bits: Vec<u64> = second.iter().map(|score| score.to_bits()).collect();
        assert_eq!(first_bits, second_bits);
    }

    #[test]
    fn different_seeds_usually_differ() {
        let rows: Vec<[f64; FEATURE_DIMENSIONS]> = (0..16)
            .map(|index| [f64::from(index), 0.0, 0.0, 0.0])
            .collect();
        let base = IsolationForestScorer {
            trees: 50,
            max_samples: 16,
            seed: 1,
        };
        let other = IsolationForestScorer { seed: 2, ..base };
        assert_ne!(base.fit_score(&rows), other.fit_score(&rows));
    }

    #[test]
    fn degenerate_inputs_score_flat() {
        let scorer = IsolationForestScorer {
            trees: 10,
            max_samples: 256,
            seed: 42,
        };
        assert_eq!(scorer.fit_score(&[]), Vec::<f64>::new());
        assert_eq!(scorer.fit_score(&[[1.0; FEATURE_DIMENSIONS]]), vec![0.0]);
    }
}
