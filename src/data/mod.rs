//! Data structures for single-cell preprocessing.

mod count_matrix;
mod expression_matrix;

pub use count_matrix::{read_gene_index, CountMatrix};
pub use expression_matrix::ExpressionMatrix;
