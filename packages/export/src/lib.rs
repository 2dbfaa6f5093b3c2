#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CSV export of feature matrices and anomaly reports.
//!
//! Column orderings come from the fixed contracts in
//! `poi_audit_poi_models`; downstream consumers rely on positional
//! access. Name-keyed rows follow the engine-wide first-seen-wins policy
//! for colliding names.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use poi_audit_anomaly::AnomalyReport;
use poi_audit_features::FeatureMatrix;
use poi_audit_poi_models::{ANOMALY_COLUMNS, FEATURE_COLUMNS};
use thiserror::Error;

/// Errors raised while writing CSV exports.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Filesystem operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Writes the feature matrix as CSV in the [`FEATURE_COLUMNS`] order.
///
/// One row per uniquely named amenity, in input order; rows shadowed by
/// an earlier row with the same name are dropped, matching the
/// name-keyed mapping contract.
///
/// # Errors
///
/// Returns [`ExportError`] when writing fails.
pub fn write_features<W: Write>(matrix: &FeatureMatrix, writer: W) -> Result<(), ExportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(FEATURE_COLUMNS)?;

    let mut written: HashSet<&str> = HashSet::new();
    for row in &matrix.rows {
        if !written.insert(row.name.as_str()) {
            continue;
        }
        csv_writer.write_record([
            row.name.as_str(),
            &row.features.neighbor_count.to_string(),
            &row.features.nearest_road_distance.to_string(),
            &row.features.nearest_neighbor_distance.to_string(),
            &row.features.building_intersections.to_string(),
        ])?;
    }
    csv_writer.flush()?;

    let dropped = matrix.len() - written.len();
    if dropped > 0 {
        log::warn!("Dropped {dropped} feature rows shadowed by name collisions");
    }

    Ok(())
}

/// Writes the feature matrix CSV to a file.
///
/// # Errors
///
/// Returns [`ExportError`] when the file cannot be created or writing
/// fails.
pub fn features_to_path(matrix: &FeatureMatrix, path: &Path) -> Result<(), ExportError> {
    let file = std::fs::File::create(path)?;
    write_features(matrix, file)?;
    log::info!("Wrote feature matrix to {}", path.display());
    Ok(())
}

/// Writes the anomaly report as CSV in the [`ANOMALY_COLUMNS`] order.
///
/// One row per uniquely named amenity, first-seen rows winning on
/// collisions.
///
/// # Errors
///
/// Returns [`ExportError`] when writing fails.
pub fn write_anomalies<W: Write>(report: &AnomalyReport, writer: W) -> Result<(), ExportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(ANOMALY_COLUMNS)?;

    let mut written: HashSet<&str> = HashSet::new();
    for entry in &report.entries {
        if !written.insert(entry.name.as_str()) {
            continue;
        }
        csv_writer.write_record([
            entry.name.as_str(),
            &entry.verdict.score.to_string(),
            &entry.verdict.is_anomaly.to_string(),
        ])?;
    }
    csv_writer.flush()?;

    Ok(())
}

/// Writes the anomaly report CSV to a file.
///
/// # Errors
///
/// Returns [`ExportError`] when the file cannot be created or writing
/// fails.
pub fn anomalies_to_path(report: &AnomalyReport, path: &Path) -> Result<(), ExportError> {
    let file = std::fs::File::create(path)?;
    write_anomalies(report, file)?;
    log::info!("Wrote anomaly report to {}", path.display());
    Ok(())
}
