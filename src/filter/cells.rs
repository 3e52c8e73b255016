//! Low-quality cell removal by number of detected genes.

use crate::data::CountMatrix;
use crate::error::{PrepError, Result};
use serde::{Deserialize, Serialize};

/// Result of cell filtering with statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellFilterResult {
    /// Whether the filter was applied (`min_lib_size > 0`).
    pub active: bool,
    /// Minimum detected-gene count that a cell had to exceed.
    pub min_lib_size: usize,
    /// Number of cells before filtering.
    pub n_before: usize,
    /// Number of cells after filtering.
    pub n_after: usize,
    /// Original row indices of retained cells, ascending.
    pub kept_indices: Vec<usize>,
}

impl CellFilterResult {
    /// Number of cells removed.
    pub fn n_removed(&self) -> usize {
        self.n_before - self.n_after
    }
}

impl std::fmt::Display for CellFilterResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Cell Filter Result")?;
        if !self.active {
            writeln!(f, "  Disabled (min_lib_size = 0)")?;
        }
        writeln!(f, "  Cells before:  {}", self.n_before)?;
        writeln!(f, "  Cells after:   {}", self.n_after)?;
        writeln!(f, "  Cells removed: {}", self.n_removed())?;
        Ok(())
    }
}

/// Filter cells by the number of genes they express.
///
/// A cell is kept iff its count of genes with value > 0 is strictly greater
/// than `min_lib_size`. A threshold of 0 disables the filter and every cell is
/// kept unchanged.
///
/// # Arguments
/// * `counts` - The count matrix to filter (samples × genes)
/// * `min_lib_size` - Minimum number of detected genes a cell must exceed
///
/// # Returns
/// The filtered matrix (original row order preserved) and the retained indices.
pub fn filter_cells(
    counts: &CountMatrix,
    min_lib_size: usize,
) -> Result<(CountMatrix, CellFilterResult)> {
    let n_before = counts.n_samples();

    if min_lib_size == 0 {
        let result = CellFilterResult {
            active: false,
            min_lib_size,
            n_before,
            n_after: n_before,
            kept_indices: (0..n_before).collect(),
        };
        return Ok((counts.clone(), result));
    }

    let kept_indices: Vec<usize> = counts
        .detected_per_sample(0.0)
        .iter()
        .enumerate()
        .filter(|&(_, &n_detected)| n_detected > min_lib_size)
        .map(|(i, _)| i)
        .collect();

    if kept_indices.is_empty() {
        return Err(PrepError::EmptyInput(format!(
            "No cells express more than {} genes",
            min_lib_size
        )));
    }

    let filtered = counts.subset_samples(&kept_indices)?;
    let result = CellFilterResult {
        active: true,
        min_lib_size,
        n_before,
        n_after: filtered.n_samples(),
        kept_indices,
    };

    Ok((filtered, result))
}
