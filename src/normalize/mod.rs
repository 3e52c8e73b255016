//! Normalization methods for single-cell count matrices.
//!
//! - **Library size**: scale every cell to the median total count

pub mod library_size;

pub use library_size::{norm_library_size, size_factors, NormalizedMatrix};
