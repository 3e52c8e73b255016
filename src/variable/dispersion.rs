//! Per-gene moment statistics on the normalized matrix.

use crate::data::ExpressionMatrix;
use crate::error::{PrepError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Moments of one gene across cells.
///
/// Mean, variance and standard deviation are population statistics (divisor n).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeneMoments {
    pub mean: f64,
    pub std: f64,
    /// Coefficient of variation, `std / mean`.
    pub cv: f64,
    pub variance: f64,
    /// Variance-to-mean ratio.
    pub dispersion: f64,
}

impl GeneMoments {
    /// Compute moments from one gene's values.
    ///
    /// Returns `None` when the mean is zero (or there are no values), since
    /// CV and dispersion are undefined.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        if mean == 0.0 || !mean.is_finite() {
            return None;
        }
        let variance = values.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();

        Some(Self {
            mean,
            std,
            cv: std / mean,
            variance,
            dispersion: variance / mean,
        })
    }
}

/// Estimate moments for every gene (column) of a normalized matrix.
///
/// Results are aligned positionally with the matrix columns.
/// Fails with [`PrepError::DegenerateStatistic`] naming the first gene whose
/// mean is zero.
pub fn estimate_dispersion(matrix: &ExpressionMatrix) -> Result<Vec<GeneMoments>> {
    if matrix.n_samples() == 0 || matrix.n_genes() == 0 {
        return Err(PrepError::EmptyInput(
            "Cannot estimate dispersion on an empty matrix".to_string(),
        ));
    }

    let moments: Vec<Option<GeneMoments>> = (0..matrix.n_genes())
        .into_par_iter()
        .map(|j| {
            let values: Vec<f64> = matrix.data.column(j).iter().copied().collect();
            GeneMoments::from_values(&values)
        })
        .collect();

    moments
        .into_iter()
        .enumerate()
        .map(|(j, m)| {
            m.ok_or_else(|| {
                PrepError::DegenerateStatistic(format!(
                    "Gene '{}' has zero mean expression; CV and dispersion are undefined",
                    matrix.gene_ids[j]
                ))
            })
        })
        .collect()
}
