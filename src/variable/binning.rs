//! Quantile binning of genes by mean expression, with robust per-bin
//! dispersion baselines.
//!
//! Cut points are the 10th, 15th, ..., 100th percentiles of the gene means,
//! bracketed by -inf and +inf. Bins are right-closed: bin `b` holds genes with
//! `edges[b] < mean <= edges[b + 1]`, so the 19 cut points give 20 bins that
//! together cover the whole real line.

use crate::error::{PrepError, Result};
use crate::stats::{mad, median, percentile_sorted};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Percentiles (0-100 scale) used as interior cut points.
pub const PERCENTILE_STEPS: [f64; 19] = [
    10.0, 15.0, 20.0, 25.0, 30.0, 35.0, 40.0, 45.0, 50.0, 55.0, 60.0, 65.0, 70.0, 75.0, 80.0,
    85.0, 90.0, 95.0, 100.0,
];

/// Bin edges over gene means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanBins {
    /// `-inf`, the percentile cut points, `+inf`.
    pub edges: Vec<f64>,
}

impl MeanBins {
    /// Compute the percentile cut points of `means`.
    pub fn from_means(means: &[f64]) -> Result<Self> {
        if means.is_empty() {
            return Err(PrepError::EmptyInput(
                "Cannot bin an empty set of genes".to_string(),
            ));
        }
        if let Some(bad) = means.iter().find(|m| !m.is_finite()) {
            return Err(PrepError::DegenerateStatistic(format!(
                "Non-finite gene mean {} cannot be binned",
                bad
            )));
        }

        let mut sorted = means.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let mut edges = Vec::with_capacity(PERCENTILE_STEPS.len() + 2);
        edges.push(f64::NEG_INFINITY);
        edges.extend(PERCENTILE_STEPS.iter().map(|&q| percentile_sorted(&sorted, q)));
        edges.push(f64::INFINITY);

        Ok(Self { edges })
    }

    /// Number of bins (cut points + 1).
    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Bin holding `mean`: the first bin whose upper edge is >= `mean`.
    pub fn assign(&self, mean: f64) -> usize {
        self.edges[1..].partition_point(|&upper| upper < mean)
    }

    /// `(lower, upper]` bounds of a bin.
    pub fn bounds(&self, bin: usize) -> (f64, f64) {
        (self.edges[bin], self.edges[bin + 1])
    }
}

/// Robust dispersion baseline of one bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinSummary {
    pub lower: f64,
    pub upper: f64,
    pub n_genes: usize,
    /// Median dispersion of member genes.
    pub median: f64,
    /// Normal-consistent MAD of member dispersions.
    pub mad: f64,
}

/// Per-bin baselines keyed by bin id. Only non-empty bins appear.
pub type BinStats = BTreeMap<usize, BinSummary>;

/// Group dispersions by bin and summarize each non-empty bin.
///
/// Fails with [`PrepError::DegenerateStatistic`] when a bin's MAD is zero,
/// because dispersions in that bin cannot be normalized.
pub fn bin_dispersion_stats(
    bins: &MeanBins,
    assignments: &[usize],
    dispersions: &[f64],
) -> Result<BinStats> {
    if assignments.len() != dispersions.len() {
        return Err(PrepError::DimensionMismatch {
            expected: assignments.len(),
            actual: dispersions.len(),
        });
    }

    let mut members: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
    for (&bin, &disp) in assignments.iter().zip(dispersions) {
        members.entry(bin).or_default().push(disp);
    }

    let mut stats = BinStats::new();
    for (bin, values) in members {
        let (lower, upper) = bins.bounds(bin);
        let bin_mad = mad(&values)?;
        if bin_mad == 0.0 {
            return Err(PrepError::DegenerateStatistic(format!(
                "Mean bin {} ({}, {}] has zero dispersion MAD across {} gene(s)",
                bin,
                lower,
                upper,
                values.len()
            )));
        }
        stats.insert(
            bin,
            BinSummary {
                lower,
                upper,
                n_genes: values.len(),
                median: median(&values).unwrap_or(0.0),
                mad: bin_mad,
            },
        );
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_edges() {
        let means: Vec<f64> = (1..=21).map(|i| i as f64).collect();
        let bins = MeanBins::from_means(&means).unwrap();

        assert_eq!(bins.n_bins(), 20);
        assert_eq!(bins.edges[0], f64::NEG_INFINITY);
        assert_eq!(bins.edges[20], f64::INFINITY);
        // rank = 0.10 * 20 = 2
        assert_relative_eq!(bins.edges[1], 3.0);
        assert_relative_eq!(bins.edges[19], 21.0);
    }

    #[test]
    fn test_assign_right_closed() {
        let bins = MeanBins {
            edges: vec![f64::NEG_INFINITY, 1.0, 2.0, f64::INFINITY],
        };
        assert_eq!(bins.assign(-5.0), 0);
        assert_eq!(bins.assign(1.0), 0);
        assert_eq!(bins.assign(1.5), 1);
        assert_eq!(bins.assign(2.0), 1);
        assert_eq!(bins.assign(2.0001), 2);
        assert_eq!(bins.assign(1e300), 2);
    }

    #[test]
    fn test_every_gene_in_exactly_one_bin() {
        let means: Vec<f64> = (0..57).map(|i| ((i * 37) % 101) as f64 / 7.0 + 0.1).collect();
        let bins = MeanBins::from_means(&means).unwrap();

        for &m in &means {
            let b = bins.assign(m);
            let (lower, upper) = bins.bounds(b);
            assert!(lower < m && m <= upper);
            let containing = (0..bins.n_bins())
                .filter(|&k| {
                    let (lo, hi) = bins.bounds(k);
                    lo < m && m <= hi
                })
                .count();
            assert_eq!(containing, 1);
        }
        // top bin is always empty: the 100th percentile is the maximum mean
        assert!(means.iter().all(|&m| bins.assign(m) < bins.n_bins() - 1));
    }

    #[test]
    fn test_bin_stats() {
        let bins = MeanBins {
            edges: vec![f64::NEG_INFINITY, 1.0, f64::INFINITY],
        };
        let assignments = vec![0, 0, 0, 1, 1, 1];
        let dispersions = vec![1.0, 2.0, 4.0, 10.0, 10.0, 13.0];

        let err = bin_dispersion_stats(&bins, &assignments, &dispersions).unwrap_err();
        assert!(matches!(err, PrepError::DegenerateStatistic(_)));

        let dispersions = vec![1.0, 2.0, 4.0, 10.0, 11.0, 13.0];
        let stats = bin_dispersion_stats(&bins, &assignments, &dispersions).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[&0].n_genes, 3);
        assert_relative_eq!(stats[&0].median, 2.0);
        // deviations 1, 0, 2 -> raw MAD 1
        assert_relative_eq!(stats[&0].mad, 1.482602218505602, epsilon = 1e-9);
        assert_relative_eq!(stats[&1].median, 11.0);
    }

    #[test]
    fn test_single_member_bin_fails() {
        let bins = MeanBins {
            edges: vec![f64::NEG_INFINITY, 1.0, f64::INFINITY],
        };
        let err = bin_dispersion_stats(&bins, &[0, 1, 1], &[3.0, 1.0, 2.0]).unwrap_err();
        assert!(matches!(err, PrepError::DegenerateStatistic(_)));
    }
}
