//! Gene filtering by detection support across cells.

use crate::data::CountMatrix;
use crate::error::{PrepError, Result};
use serde::{Deserialize, Serialize};

/// Thresholds for the detection filter.
///
/// A gene counts as detected in a cell when its value is strictly above
/// `min_count`; it is retained when it is detected in strictly more than
/// `min_cells` cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionThresholds {
    pub min_count: f64,
    pub min_cells: usize,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            min_count: 2.0,
            min_cells: 3,
        }
    }
}

/// Result of gene detection filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneFilterResult {
    pub thresholds: DetectionThresholds,
    /// Number of genes before filtering.
    pub n_before: usize,
    /// Number of genes after filtering.
    pub n_after: usize,
    /// Detected-cell count for every input gene.
    pub detection_counts: Vec<usize>,
    /// Original column indices of retained genes, ascending.
    pub kept_indices: Vec<usize>,
}

impl std::fmt::Display for GeneFilterResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Gene Detection Filter Result")?;
        writeln!(
            f,
            "  Detected: value > {}, kept if in > {} cells",
            self.thresholds.min_count, self.thresholds.min_cells
        )?;
        writeln!(f, "  Genes before:  {}", self.n_before)?;
        writeln!(f, "  Genes after:   {}", self.n_after)?;
        writeln!(f, "  Genes removed: {}", self.n_before - self.n_after)?;
        Ok(())
    }
}

/// Filter genes detected in too few cells.
///
/// Builds the binarized detection matrix implicitly (value > `min_count` is 1),
/// sums it per gene and keeps genes whose sum is strictly greater than
/// `min_cells`. The mask is applied to the original counts, not the binarized ones.
///
/// # Returns
/// The gene-filtered matrix (column order preserved) and filter statistics.
pub fn filter_genes_by_detection(
    counts: &CountMatrix,
    thresholds: DetectionThresholds,
) -> Result<(CountMatrix, GeneFilterResult)> {
    if !thresholds.min_count.is_finite() || thresholds.min_count < 0.0 {
        return Err(PrepError::InvalidParameter(
            "Detection threshold must be finite and non-negative".to_string(),
        ));
    }

    let detection_counts = counts.detected_per_gene(thresholds.min_count);
    let kept_indices: Vec<usize> = detection_counts
        .iter()
        .enumerate()
        .filter(|&(_, &n)| n > thresholds.min_cells)
        .map(|(j, _)| j)
        .collect();

    if kept_indices.is_empty() {
        return Err(PrepError::EmptyInput(format!(
            "No genes have values > {} in more than {} cells",
            thresholds.min_count, thresholds.min_cells
        )));
    }

    let filtered = counts.subset_genes(&kept_indices)?;
    let result = GeneFilterResult {
        thresholds,
        n_before: counts.n_genes(),
        n_after: filtered.n_genes(),
        detection_counts,
        kept_indices,
    };

    Ok((filtered, result))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gene_ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("gene_{}", i)).collect()
    }

    #[test]
    fn test_rejects_all_genes() {
        let rows = vec![
            vec![0.0, 3.0, 5.0],
            vec![1.0, 4.0, 0.0],
            vec![2.0, 5.0, 1.0],
            vec![0.0, 0.0, 6.0],
        ];
        let counts = CountMatrix::from_dense_rows(&rows, gene_ids(3)).unwrap();

        assert_eq!(counts.detected_per_gene(2.0), vec![0, 3, 2]);
        let err = filter_genes_by_detection(&counts, DetectionThresholds::default()).unwrap_err();
        assert!(matches!(err, PrepError::EmptyInput(_)));
    }

    #[test]
    fn test_keeps_supported_genes_on_raw_values() {
        // gene_1 is > 2 in four cells, gene_0 in three, gene_2 in five
        let rows = vec![
            vec![3.0, 3.0, 4.0],
            vec![3.0, 4.0, 4.0],
            vec![3.0, 5.0, 4.0],
            vec![0.0, 6.0, 4.0],
            vec![1.0, 0.0, 4.0],
        ];
        let counts = CountMatrix::from_dense_rows(&rows, gene_ids(3)).unwrap();
        let (filtered, result) =
            filter_genes_by_detection(&counts, DetectionThresholds::default()).unwrap();

        assert_eq!(result.kept_indices, vec![1, 2]);
        assert_eq!(result.detection_counts, vec![3, 4, 5]);
        assert_eq!(filtered.gene_ids(), &["gene_1", "gene_2"]);
        // values are the raw counts, not the binarized ones
        assert_eq!(filtered.row_dense(3), vec![6.0, 4.0]);
    }

    #[test]
    fn test_raising_support_never_adds_genes() {
        let rows: Vec<Vec<f64>> = (0..12)
            .map(|i| (0..8).map(|j| ((i * 7 + j * 3) % 11) as f64).collect())
            .collect();
        let counts = CountMatrix::from_dense_rows(&rows, gene_ids(8)).unwrap();

        let mut previous = usize::MAX;
        for min_cells in 0..12 {
            let thresholds = DetectionThresholds {
                min_count: 2.0,
                min_cells,
            };
            let kept = match filter_genes_by_detection(&counts, thresholds) {
                Ok((_, result)) => result.n_after,
                Err(PrepError::EmptyInput(_)) => 0,
                Err(e) => panic!("unexpected error: {}", e),
            };
            assert!(kept <= previous);
            previous = kept;
        }
    }

    #[test]
    fn test_invalid_threshold() {
        let counts = CountMatrix::from_dense_rows(&[vec![1.0]], gene_ids(1)).unwrap();
        let thresholds = DetectionThresholds {
            min_count: -1.0,
            min_cells: 0,
        };
        assert!(filter_genes_by_detection(&counts, thresholds).is_err());
    }
}
