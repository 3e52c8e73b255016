//! Bin-normalized dispersion scores and top-K variable gene selection.

use super::binning::{bin_dispersion_stats, BinStats, MeanBins};
use super::dispersion::estimate_dispersion;
use crate::data::ExpressionMatrix;
use crate::error::{PrepError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Everything computed for one gene on the normalized matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispersionRecord {
    pub gene_id: String,
    pub mean: f64,
    pub cv: f64,
    pub variance: f64,
    pub dispersion: f64,
    /// Mean-expression bin id.
    pub bin: usize,
    pub bin_median: f64,
    pub bin_mad: f64,
    /// `|dispersion - bin_median| / bin_mad`
    pub normalized_dispersion: f64,
}

/// Per-gene dispersion records plus the binning they were normalized against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispersionTable {
    /// One record per gene, in matrix column order.
    pub records: Vec<DispersionRecord>,
    pub bins: MeanBins,
    pub bin_stats: BinStats,
}

impl DispersionTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Normalized dispersion scores in column order.
    pub fn scores(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.normalized_dispersion).collect()
    }

    /// Gene identifiers in column order.
    pub fn gene_ids(&self) -> Vec<String> {
        self.records.iter().map(|r| r.gene_id.clone()).collect()
    }

    /// Select the top `k` genes by normalized dispersion.
    pub fn select_top(&self, k: usize) -> Result<SelectedGeneSet> {
        select_top_genes(&self.gene_ids(), &self.scores(), k)
    }

    /// Write the table as TSV with a header row.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writeln!(
            writer,
            "gene_id\tmean\tcv\tvar\tdispersion\tmean_bin\tbin_disp_median\tbin_disp_mad\tdispersion_norm"
        )?;
        for r in &self.records {
            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                r.gene_id,
                r.mean,
                r.cv,
                r.variance,
                r.dispersion,
                r.bin,
                r.bin_median,
                r.bin_mad,
                r.normalized_dispersion
            )?;
        }
        writer.flush()?;

        Ok(())
    }
}

/// Score every gene of a library-size normalized matrix.
///
/// Computes per-gene moments, bins genes by mean at the fixed percentile cut
/// points, derives each bin's median/MAD dispersion in one pass, and scores each
/// gene as `|dispersion - bin median| / bin MAD`.
pub fn rank_variable_genes(normalized: &ExpressionMatrix) -> Result<DispersionTable> {
    let moments = estimate_dispersion(normalized)?;

    let means: Vec<f64> = moments.iter().map(|m| m.mean).collect();
    let dispersions: Vec<f64> = moments.iter().map(|m| m.dispersion).collect();

    let bins = MeanBins::from_means(&means)?;
    let assignments: Vec<usize> = means.iter().map(|&m| bins.assign(m)).collect();
    let bin_stats = bin_dispersion_stats(&bins, &assignments, &dispersions)?;

    let mut records = Vec::with_capacity(moments.len());
    for (j, m) in moments.iter().enumerate() {
        let bin = assignments[j];
        let summary = bin_stats.get(&bin).ok_or_else(|| {
            PrepError::DegenerateStatistic(format!("No baseline for mean bin {}", bin))
        })?;
        records.push(DispersionRecord {
            gene_id: normalized.gene_ids[j].clone(),
            mean: m.mean,
            cv: m.cv,
            variance: m.variance,
            dispersion: m.dispersion,
            bin,
            bin_median: summary.median,
            bin_mad: summary.mad,
            normalized_dispersion: (m.dispersion - summary.median).abs() / summary.mad,
        });
    }

    Ok(DispersionTable {
        records,
        bins,
        bin_stats,
    })
}

/// The top-K genes by normalized dispersion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedGeneSet {
    /// Gene identifiers in rank order (highest score first).
    pub gene_ids: Vec<String>,
    /// Column positions in the gene-filtered matrix, in rank order.
    pub columns: Vec<usize>,
    /// Scores in rank order.
    pub scores: Vec<f64>,
    /// The K-th largest score.
    pub cutoff: f64,
}

impl SelectedGeneSet {
    pub fn len(&self) -> usize {
        self.gene_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gene_ids.is_empty()
    }
}

/// Take the `k` highest-scoring genes.
///
/// Genes are ordered by score descending with a stable sort, so equal scores
/// keep their input order. Exactly `k` genes are returned even when more genes
/// tie with the K-th score; those extra ties are not selected.
pub fn select_top_genes(gene_ids: &[String], scores: &[f64], k: usize) -> Result<SelectedGeneSet> {
    if gene_ids.len() != scores.len() {
        return Err(PrepError::DimensionMismatch {
            expected: gene_ids.len(),
            actual: scores.len(),
        });
    }
    if k == 0 {
        return Err(PrepError::InvalidParameter(
            "Number of genes to keep must be positive".to_string(),
        ));
    }
    if k > scores.len() {
        return Err(PrepError::InsufficientFeatures {
            requested: k,
            available: scores.len(),
        });
    }
    if let Some(j) = scores.iter().position(|s| !s.is_finite()) {
        return Err(PrepError::DegenerateStatistic(format!(
            "Gene '{}' has a non-finite normalized dispersion",
            gene_ids[j]
        )));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    order.truncate(k);

    let ranked_scores: Vec<f64> = order.iter().map(|&j| scores[j]).collect();
    let cutoff = ranked_scores[k - 1];

    Ok(SelectedGeneSet {
        gene_ids: order.iter().map(|&j| gene_ids[j].clone()).collect(),
        columns: order,
        scores: ranked_scores,
        cutoff,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_top_one() {
        let genes = ids(&["low", "high", "mid"]);
        let selected = select_top_genes(&genes, &[0.2, 0.9, 0.5], 1).unwrap();

        assert_eq!(selected.gene_ids, vec!["high"]);
        assert_eq!(selected.columns, vec![1]);
        assert_relative_eq!(selected.cutoff, 0.9);
    }

    #[test]
    fn test_rank_order_and_ties() {
        let genes = ids(&["a", "b", "c", "d", "e"]);
        let scores = [1.0, 3.0, 1.0, 2.0, 1.0];
        let selected = select_top_genes(&genes, &scores, 3).unwrap();

        // "a", "c" and "e" tie at the cutoff; only the first in input order is taken
        assert_eq!(selected.gene_ids, vec!["b", "d", "a"]);
        assert_eq!(selected.columns, vec![1, 3, 0]);
        assert_relative_eq!(selected.cutoff, 1.0);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let genes: Vec<String> = (0..50).map(|i| format!("g{}", i)).collect();
        let scores: Vec<f64> = (0..50).map(|i| ((i * 13) % 7) as f64 * 0.5).collect();

        let first = select_top_genes(&genes, &scores, 20).unwrap();
        for _ in 0..5 {
            assert_eq!(select_top_genes(&genes, &scores, 20).unwrap(), first);
        }
    }

    #[test]
    fn test_insufficient_features() {
        let genes = ids(&["a", "b"]);
        let err = select_top_genes(&genes, &[1.0, 2.0], 3).unwrap_err();
        assert!(matches!(
            err,
            PrepError::InsufficientFeatures {
                requested: 3,
                available: 2
            }
        ));
        assert!(matches!(
            select_top_genes(&genes, &[1.0, 2.0], 0),
            Err(PrepError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_rank_variable_genes_records() {
        // 6 cells × 44 genes, means increase with the column index
        let n_cells = 6;
        let n_genes = 44;
        let data = DMatrix::from_fn(n_cells, n_genes, |i, j| {
            let base = 1.0 + j as f64;
            let wobble = ((i * 5 + j * 3) % 7) as f64 * (1.0 + (j % 4) as f64);
            base + wobble
        });
        let genes: Vec<String> = (0..n_genes).map(|j| format!("g{}", j)).collect();
        let matrix = ExpressionMatrix::new(data, genes).unwrap();

        let table = rank_variable_genes(&matrix).unwrap();
        assert_eq!(table.len(), n_genes);

        let n_binned: usize = table.bin_stats.values().map(|s| s.n_genes).sum();
        assert_eq!(n_binned, n_genes);

        for r in &table.records {
            let expected = (r.dispersion - r.bin_median).abs() / r.bin_mad;
            assert_relative_eq!(r.normalized_dispersion, expected);
            assert!(r.normalized_dispersion >= 0.0);
            let (lo, hi) = table.bins.bounds(r.bin);
            assert!(lo < r.mean && r.mean <= hi);
        }

        let selected = table.select_top(10).unwrap();
        assert_eq!(selected.len(), 10);
        assert!(selected.scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_tied_means_leave_empty_bins() {
        // 200 genes share mean 6, 200 genes have distinct means 100..300.
        // Each column alternates mean - d, mean + d across 4 cells.
        let n_genes = 400;
        let data = DMatrix::from_fn(4, n_genes, |i, j| {
            let (mean, d) = if j < 200 {
                (6.0, (j + 1) as f64 / 256.0)
            } else {
                let g = j - 200;
                (100.0 + g as f64, 1.0 + (g % 7) as f64 * 0.5)
            };
            if i % 2 == 0 {
                mean - d
            } else {
                mean + d
            }
        });
        let genes: Vec<String> = (0..n_genes).map(|j| format!("g{}", j)).collect();
        let matrix = ExpressionMatrix::new(data, genes).unwrap();

        let table = rank_variable_genes(&matrix).unwrap();

        // the 10th..45th percentiles all collapse onto the tied mean
        assert!(table.bins.edges[1..9].iter().all(|&e| e == 6.0));
        assert!(table.bins.edges[9] > 6.0);
        assert!(table.bin_stats.len() < table.bins.n_bins());

        for r in &table.records {
            assert!(table.bin_stats.contains_key(&r.bin));
            assert!(r.normalized_dispersion.is_finite());
        }
        let n_binned: usize = table.bin_stats.values().map(|s| s.n_genes).sum();
        assert_eq!(n_binned, n_genes);
        assert_eq!(table.bin_stats[&0].n_genes, 200);
    }
}
