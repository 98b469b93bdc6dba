//! Centrality bounds helpers (§4.3.3).
//!
//! Every centrality metric is bounded to `[0, 1]` with a default of `0`.

use kairos_core::Centrality;

pub const LOWER_BOUND: f64 = 0.0;
pub const UPPER_BOUND: f64 = 1.0;

/// Clamp a single value into `[0, 1]`, mapping NaN/Inf to the default `0`.
pub fn clamp(value: f64) -> f64 {
    if !value.is_finite() {
        return LOWER_BOUND;
    }
    value.clamp(LOWER_BOUND, UPPER_BOUND)
}

#[derive(Debug, Clone, Default)]
pub struct CentralityValidation {
    pub valid: bool,
    pub corrected: Option<Centrality>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Validate a centrality set. When `auto_correct` is set, out-of-bounds
/// or non-finite values are clamped and returned in `corrected`.
pub fn validate_entity(centrality: &Centrality, auto_correct: bool) -> CentralityValidation {
    let mut result = CentralityValidation { valid: true, ..Default::default() };
    let fields = [
        ("degree", centrality.degree),
        ("pagerank", centrality.pagerank),
        ("betweenness", centrality.betweenness),
        ("eigenvector", centrality.eigenvector),
        ("importance", centrality.importance),
    ];

    let mut needs_correction = false;
    for (name, value) in fields {
        if !value.is_finite() {
            result.valid = false;
            result.errors.push(format!("{name} is not finite: {value}"));
            needs_correction = true;
        } else if !(LOWER_BOUND..=UPPER_BOUND).contains(&value) {
            result.valid = false;
            result.errors.push(format!("{name} out of bounds [0,1]: {value}"));
            needs_correction = true;
        }
    }

    if needs_correction && auto_correct {
        result.corrected = Some(centrality.clamped());
        result.warnings.push("centrality values clamped to [0, 1]".to_string());
    }

    result
}

/// Min-max normalize a batch of values into `[0, 1]`. Constant inputs
/// (or an empty slice) map to `0.0`.
pub fn normalize_min_max(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range <= f64::EPSILON {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / range).collect()
}

/// Z-score normalize then squash through a logistic sigmoid, so results
/// land in `(0, 1)` regardless of the input distribution's scale.
pub fn normalize_z_score_sigmoid(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    if std_dev <= f64::EPSILON {
        return vec![0.5; values.len()];
    }
    values
        .iter()
        .map(|v| {
            let z = (v - mean) / std_dev;
            1.0 / (1.0 + (-z).exp())
        })
        .collect()
}

/// Detect outliers by z-score magnitude exceeding `threshold` (typically ~3.0).
pub fn detect_outliers(values: &[f64], threshold: f64) -> Vec<usize> {
    if values.len() < 2 {
        return Vec::new();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    if std_dev <= f64::EPSILON {
        return Vec::new();
    }
    values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| {
            let z = ((v - mean) / std_dev).abs();
            (z > threshold).then_some(i)
        })
        .collect()
}
