//! Composable single-cell count matrix preprocessing.
//!
//! This library turns a raw cells × genes count matrix into a compact,
//! log-transformed feature matrix of highly variable genes, ready for
//! downstream rare-population scoring.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Core data structures (CountMatrix, ExpressionMatrix)
//! - **filter**: Cell filtering by detected genes, gene filtering by detection support
//! - **normalize**: Library-size normalization to the median total count
//! - **variable**: Per-gene dispersion, mean-expression binning, ranked selection
//! - **transform**: `log2(1 + x)` of the selected genes
//! - **pipeline**: Pipeline composition, configuration and output sinks
//!
//! # Example
//!
//! ```no_run
//! use scrna_prep::prelude::*;
//!
//! // Load data
//! let genes = read_gene_index("genes.txt").unwrap();
//! let counts = CountMatrix::from_table("counts.txt", genes).unwrap();
//!
//! // Run preprocessing and write genesSel.txt / dataSel.txt
//! let mut sink = DirectorySink::new("out");
//! let result = Preprocessor::new()
//!     .ngenes_keep(1000)
//!     .min_lib_size(200)
//!     .run_with_sink(&counts, &mut sink)
//!     .unwrap();
//!
//! println!("{} cells x {} genes", result.output.n_samples(), result.output.n_genes());
//! ```

pub mod data;
pub mod error;
pub mod filter;
pub mod normalize;
pub mod pipeline;
pub mod stats;
pub mod transform;
pub mod variable;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::data::{read_gene_index, CountMatrix, ExpressionMatrix};
    pub use crate::error::{PrepError, Result};
    pub use crate::filter::{
        filter_cells, filter_genes_by_detection, CellFilterResult, DetectionThresholds,
        GeneFilterResult,
    };
    pub use crate::normalize::{norm_library_size, size_factors, NormalizedMatrix};
    pub use crate::pipeline::{
        preprocess, DirectorySink, NullSink, PrepConfig, PrepSink, Preprocessed, Preprocessor,
        RankedGenes, Stage,
    };
    pub use crate::transform::{log2_1p, log_selected};
    pub use crate::variable::{
        bin_dispersion_stats, estimate_dispersion, rank_variable_genes, select_top_genes,
        BinStats, BinSummary, DispersionRecord, DispersionTable, GeneMoments, MeanBins,
        SelectedGeneSet,
    };
}
