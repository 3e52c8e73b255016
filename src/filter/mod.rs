//! Filtering primitives for count matrices.

pub mod cells;
pub mod detection;

pub use cells::{filter_cells, CellFilterResult};
pub use detection::{filter_genes_by_detection, DetectionThresholds, GeneFilterResult};
