#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Anomaly detection over POI feature matrices.
//!
//! Standardizes the feature matrix, fits a seeded isolation-forest
//! ensemble, and emits a decision score plus a rank-thresholded
//! classification per amenity. Scores are fit fresh per run: the same
//! entity can legitimately score differently against a different
//! surrounding population.

pub mod forest;
mod scale;

use std::collections::BTreeMap;

use poi_audit_features::FeatureMatrix;
use poi_audit_poi_models::{AnomalyVerdict, EntityId, FEATURE_DIMENSIONS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum viable sample size for the ensemble.
pub const MIN_SAMPLE_SIZE: usize = 2;

/// Configuration for anomaly detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForestConfig {
    /// Number of isolation trees in the ensemble.
    pub trees: usize,
    /// Sub-sample size per tree (capped at the row count).
    pub max_samples: usize,
    /// Expected fraction of anomalous entities, in (0, 0.5].
    pub contamination: f64,
    /// Seed for the ensemble's randomized splits.
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            trees: 100,
            max_samples: 256,
            contamination: 0.05,
            seed: 42,
        }
    }
}

/// Errors raised by anomaly detection.
#[derive(Debug, Error, PartialEq)]
pub enum AnomalyError {
    /// Fewer feature rows than the ensemble's minimum viable sample.
    #[error("need at least {min} feature rows to fit the ensemble, got {rows}")]
    InsufficientSample {
        /// Rows in the supplied matrix.
        rows: usize,
        /// Documented floor ([`MIN_SAMPLE_SIZE`]).
        min: usize,
    },

    /// Contamination outside (0, 0.5].
    #[error("contamination must be within (0, 0.5], got {0}")]
    InvalidContamination(f64),

    /// An ensemble with zero trees cannot score anything.
    #[error("ensemble size must be at least 1, got {0}")]
    InvalidEnsembleSize(usize),
}

/// A fitted-and-scored outlier model capability.
///
/// Implementations fit on the standardized rows and return one decision
/// score per row, lower = more anomalous. The pipeline only depends on
/// this trait, so alternative scoring strategies can be substituted
/// without touching thresholding or reporting.
pub trait OutlierScorer {
    /// Scores every row of the standardized matrix.
    fn fit_score(&self, rows: &[[f64; FEATURE_DIMENSIONS]]) -> Vec<f64>;
}

/// Score and classification for one amenity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyEntry {
    /// Stable synthetic identity.
    pub id: EntityId,
    /// Display name carried through for downstream joins.
    pub name: String,
    /// Score and classification.
    pub verdict: AnomalyVerdict,
}

/// Anomaly results for one analysis run, in feature-matrix row order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyReport {
    /// One entry per feature row, in matrix order.
    pub entries: Vec<AnomalyEntry>,
    name_collisions: usize,
}

impl AnomalyReport {
    /// Name-keyed view; first-seen rows win on name collisions, matching
    /// the feature matrix policy.
    #[must_use]
    pub fn by_name(&self) -> BTreeMap<&str, AnomalyVerdict> {
        let mut map = BTreeMap::new();
        for entry in &self.entries {
            map.entry(entry.name.as_str()).or_insert(entry.verdict);
        }
        map
    }

    /// Flagged entries, worst (lowest score) first.
    #[must_use]
    pub fn flagged(&self) -> Vec<&AnomalyEntry> {
        let mut flagged: Vec<&AnomalyEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.verdict.is_anomaly)
            .collect();
        flagged.sort_by(|a, b| a.verdict.score.total_cmp(&b.verdict.score));
        flagged
    }

    /// Number of entries shadowed by an earlier entry with the same name.
    #[must_use]
    pub const fn name_collisions(&self) -> usize {
        self.name_collisions
    }

    /// Number of entries in the report.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the report has no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Runs detection with the default isolation-forest scorer.
///
/// # Errors
///
/// Returns [`AnomalyError`] when the matrix is smaller than
/// [`MIN_SAMPLE_SIZE`] or the configuration is invalid.
pub fn detect(
    matrix: &FeatureMatrix,
    config: &ForestConfig,
) -> Result<AnomalyReport, AnomalyError> {
    let scorer = forest::IsolationForestScorer::from_config(config);
    detect_with(matrix, config, &scorer)
}

/// Runs detection with a caller-supplied scorer.
///
/// Pipeline: impute non-finite values to 0, standardize each column to
/// zero mean and unit variance over the current batch, score with the
/// supplied model, then flag the `max(1, round(contamination * n))`
/// lowest-scoring rows. Score ties at the threshold boundary break by
/// row order.
///
/// # Errors
///
/// Returns [`AnomalyError`] when the matrix is smaller than
/// [`MIN_SAMPLE_SIZE`] or the configuration is invalid.
pub fn detect_with(
    matrix: &FeatureMatrix,
    config: &ForestConfig,
    scorer: &dyn OutlierScorer,
) -> Result<AnomalyReport, AnomalyError> {
    if !(config.contamination > 0.0 && config.contamination <= 0.5) {
        return Err(AnomalyError::InvalidContamination(config.contamination));
    }
    if config.trees == 0 {
        return Err(AnomalyError::InvalidEnsembleSize(config.trees));
    }
    if matrix.len() < MIN_SAMPLE_SIZE {
        return Err(AnomalyError::InsufficientSample {
            rows: matrix.len(),
            min: MIN_SAMPLE_SIZE,
        });
    }

    let mut rows: Vec<[f64; FEATURE_DIMENSIONS]> = matrix
        .rows
        .iter()
        .map(|row| row.features.to_model_row())
        .collect();
    scale::impute(&mut rows);
    scale::standardize(&mut rows);

    let scores = scorer.fit_score(&rows);
    debug_assert_eq!(scores.len(), rows.len());

    let threshold_count = flag_count(config.contamination, scores.len());
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]).then(a.cmp(&b)));

    let mut is_anomaly = vec![false; scores.len()];
    for &index in order.iter().take(threshold_count) {
        is_anomaly[index] = true;
    }

    let entries: Vec<AnomalyEntry> = matrix
        .rows
        .iter()
        .zip(scores.iter().zip(&is_anomaly))
        .map(|(row, (&score, &flagged))| AnomalyEntry {
            id: row.id,
            name: row.name.clone(),
            verdict: AnomalyVerdict {
                score,
                is_anomaly: flagged,
            },
        })
        .collect();

    log::info!(
        "Flagged {threshold_count} of {} amenities as anomalous",
        entries.len()
    );

    Ok(AnomalyReport {
        entries,
        name_collisions: matrix.name_collisions(),
    })
}

/// Rank-based threshold: `round(contamination * rows)` with a floor of
/// one so a positive contamination always flags something, even on tiny
/// batches where the rounded count is zero.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn flag_count(contamination: f64, rows: usize) -> usize {
    let count = (contamination * rows as f64).round() as usize;
    count.clamp(1, rows)
}
