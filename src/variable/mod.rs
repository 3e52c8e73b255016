//! Variable gene selection.
//!
//! Genes are scored by how far their dispersion sits from the typical
//! dispersion of genes with similar mean expression:
//!
//! - **dispersion**: per-gene mean, CV, variance and variance-to-mean ratio
//! - **binning**: percentile bins over gene means with median/MAD baselines
//! - **ranking**: normalized dispersion scores and top-K selection

pub mod binning;
pub mod dispersion;
pub mod ranking;

pub use binning::{bin_dispersion_stats, BinStats, BinSummary, MeanBins, PERCENTILE_STEPS};
pub use dispersion::{estimate_dispersion, GeneMoments};
pub use ranking::{
    rank_variable_genes, select_top_genes, DispersionRecord, DispersionTable, SelectedGeneSet,
};
