//! `log2(1 + x)` transform of the selected genes.

use crate::data::ExpressionMatrix;
use crate::error::{PrepError, Result};
use crate::variable::SelectedGeneSet;

/// Apply `x -> log2(x + 1)` element-wise.
pub fn log2_1p(matrix: &ExpressionMatrix) -> ExpressionMatrix {
    ExpressionMatrix {
        data: matrix.data.map(|v| (v + 1.0).log2()),
        gene_ids: matrix.gene_ids.clone(),
    }
}

/// Extract the selected genes' columns, in rank order, and log-transform them.
///
/// # Returns
/// A samples × K matrix whose columns follow `selected.columns`.
pub fn log_selected(
    normalized: &ExpressionMatrix,
    selected: &SelectedGeneSet,
) -> Result<ExpressionMatrix> {
    if let Some(&bad) = selected.columns.iter().find(|&&c| c >= normalized.n_genes()) {
        return Err(PrepError::InvalidParameter(format!(
            "Selected column {} out of bounds for {} genes",
            bad,
            normalized.n_genes()
        )));
    }

    let subset = normalized.data.select_columns(selected.columns.iter());
    let gene_ids = selected
        .columns
        .iter()
        .map(|&c| normalized.gene_ids[c].clone())
        .collect();

    Ok(log2_1p(&ExpressionMatrix::new(subset, gene_ids)?))
}
