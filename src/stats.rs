//! Order statistics shared by the normalization and binning stages.

use crate::error::{PrepError, Result};
use statrs::distribution::{ContinuousCDF, Normal};

/// Median of a slice. Even-length input averages the two middle values.
///
/// Returns `None` for empty input.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    if n % 2 == 0 {
        Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
    } else {
        Some(sorted[n / 2])
    }
}

/// Percentile with linear interpolation between closest ranks.
///
/// `q` is on the 0-100 scale. The rank of `q` is `q / 100 * (n - 1)`.
pub fn percentile(values: &[f64], q: f64) -> Result<f64> {
    if values.is_empty() {
        return Err(PrepError::EmptyInput(
            "Cannot take a percentile of an empty sequence".to_string(),
        ));
    }
    if !(0.0..=100.0).contains(&q) {
        return Err(PrepError::InvalidParameter(format!(
            "Percentile {} outside [0, 100]",
            q
        )));
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Ok(percentile_sorted(&sorted, q))
}

/// Percentile of already sorted, non-empty data.
pub(crate) fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Normal-consistency constant for the MAD: the standard normal 0.75 quantile.
pub fn mad_normal_constant() -> Result<f64> {
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| PrepError::InvalidParameter(format!("standard normal: {}", e)))?;
    Ok(normal.inverse_cdf(0.75))
}

/// Median absolute deviation around the median, scaled for consistency with the
/// standard deviation under normality (factor ≈ 1.4826).
pub fn mad(values: &[f64]) -> Result<f64> {
    let center = median(values).ok_or_else(|| {
        PrepError::EmptyInput("Cannot take the MAD of an empty sequence".to_string())
    })?;
    let deviations: Vec<f64> = values.iter().map(|&v| (v - center).abs()).collect();
    // deviations has the same length as values, so the median exists
    let raw = median(&deviations).unwrap_or(0.0);
    Ok(raw / mad_normal_constant()?)
}
