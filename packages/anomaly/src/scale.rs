//! Feature-row imputation and per-run standardization.

use poi_audit_poi_models::FEATURE_DIMENSIONS;

/// Replaces non-finite values with the documented degenerate 0 so scaling
/// always operates on fully populated rows.
pub(crate) fn impute(rows: &mut [[f64; FEATURE_DIMENSIONS]]) {
    for row in rows.iter_mut() {
        for value in row.iter_mut() {
            if !value.is_finite() {
                *value = 0.0;
            }
        }
    }
}

/// Rescales each column to zero mean and unit variance across the current
/// population.
///
/// The scale factors are fit fresh per run; they depend entirely on the
/// current batch's distribution. Zero-variance columns pass through with
/// scale factor 1, keeping constant features from producing NaN columns.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn standardize(rows: &mut [[f64; FEATURE_DIMENSIONS]]) {
    if rows.is_empty() {
        return;
    }
    let count = rows.len() as f64;

    let mut means = [0.0; FEATURE_DIMENSIONS];
    for row in rows.iter() {
        for (mean, value) in means.iter_mut().zip(row) {
            *mean += value;
        }
    }
    for mean in &mut means {
        *mean /= count;
    }

    // Population variance (ddof = 0), matching the fit-per-batch model.
    let mut scales = [0.0; FEATURE_DIMENSIONS];
    for row in rows.iter() {
        for (scale, (value, mean)) in scales.iter_mut().zip(row.iter().zip(&means)) {
            *scale += (value - mean) * (value - mean);
        }
    }
    for scale in &mut scales {
        *scale = (*scale / count).sqrt();
        if *scale == 0.0 {
            *scale = 1.0;
        }
    }

    for row in rows.iter_mut() {
        for ((value, mean), scale) in row.iter_mut().zip(&means).zip(&scales) {
            *value = (*value - *mean) / *scale;
        }
    }
}
