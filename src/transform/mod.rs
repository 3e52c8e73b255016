//! Element-wise transforms applied to the final feature matrix.

pub mod log2;

pub use log2::{log2_1p, log_selected};
