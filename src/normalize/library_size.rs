//! Library-size normalization scaled to the median library size.
//!
//! Each cell's counts are divided by a size factor equal to its total count
//! divided by the median total count across cells, so that every cell ends up
//! with a library size equal to the median.

use crate::data::{CountMatrix, ExpressionMatrix};
use crate::error::{PrepError, Result};
use crate::stats::median;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Result of library-size normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMatrix {
    /// The normalized values (samples × genes).
    pub matrix: ExpressionMatrix,
    /// Library sizes (row sums before normalization).
    pub library_sizes: Vec<f64>,
    /// Median of the library sizes.
    pub median_library_size: f64,
    /// Per-cell size factors (`library_size / median`).
    pub size_factors: Vec<f64>,
}

impl NormalizedMatrix {
    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.matrix.n_samples()
    }

    /// Number of genes.
    pub fn n_genes(&self) -> usize {
        self.matrix.n_genes()
    }
}

/// Compute size factors from library sizes.
///
/// Fails with [`PrepError::ZeroMedian`] when the median library size is zero
/// and with [`PrepError::DegenerateStatistic`] when an individual cell has a
/// zero library size (its counts cannot be rescaled).
pub fn size_factors(library_sizes: &[f64]) -> Result<(f64, Vec<f64>)> {
    let med = median(library_sizes).ok_or_else(|| {
        PrepError::EmptyInput("Cannot compute size factors without samples".to_string())
    })?;
    if med == 0.0 {
        return Err(PrepError::ZeroMedian);
    }

    if let Some(i) = library_sizes.iter().position(|&s| s == 0.0) {
        return Err(PrepError::DegenerateStatistic(format!(
            "Sample {} has zero total count after gene filtering",
            i
        )));
    }

    let factors = library_sizes.iter().map(|&s| s / med).collect();
    Ok((med, factors))
}

/// Normalize a gene-filtered count matrix by library size.
///
/// # Formula
/// For cell i: x'_ij = x_ij / (L_i / median(L)), where L_i is the row sum.
pub fn norm_library_size(counts: &CountMatrix) -> Result<NormalizedMatrix> {
    let n_samples = counts.n_samples();
    let n_genes = counts.n_genes();

    if n_samples == 0 || n_genes == 0 {
        return Err(PrepError::EmptyInput(
            "Cannot normalize an empty matrix".to_string(),
        ));
    }

    let library_sizes = counts.row_sums();
    let (median_library_size, size_factors) = size_factors(&library_sizes)?;

    let mut data = DMatrix::zeros(n_samples, n_genes);
    for (row, row_vec) in counts.data().outer_iterator().enumerate() {
        let factor = size_factors[row];
        for (col, &val) in row_vec.iter() {
            data[(row, col)] = val / factor;
        }
    }

    Ok(NormalizedMatrix {
        matrix: ExpressionMatrix::new(data, counts.gene_ids().to_vec())?,
        library_sizes,
        median_library_size,
        size_factors,
    })
}
