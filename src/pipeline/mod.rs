//! Pipeline composition and execution for single-cell preprocessing.

mod runner;
mod sink;

pub use runner::{preprocess, PrepConfig, Preprocessed, Preprocessor, RankedGenes, Stage};
pub use sink::{write_lines, DirectorySink, NullSink, PrepSink};
