//! Dense expression matrix produced by normalization and transforms.

use crate::error::{PrepError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A dense samples × genes matrix of real-valued expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpressionMatrix {
    /// The values (samples × genes).
    #[serde(skip)]
    pub data: DMatrix<f64>,
    /// Gene identifiers, aligned with columns.
    pub gene_ids: Vec<String>,
}

impl ExpressionMatrix {
    /// Wrap a dense matrix, checking the gene index length.
    pub fn new(data: DMatrix<f64>, gene_ids: Vec<String>) -> Result<Self> {
        if data.ncols() != gene_ids.len() {
            return Err(PrepError::DimensionMismatch {
                expected: data.ncols(),
                actual: gene_ids.len(),
            });
        }
        Ok(Self { data, gene_ids })
    }

    /// Get the value for a sample and gene.
    pub fn get(&self, sample: usize, gene: usize) -> f64 {
        self.data[(sample, gene)]
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    /// Number of genes.
    pub fn n_genes(&self) -> usize {
        self.data.ncols()
    }

    /// Get a row (sample) as a vector.
    pub fn row(&self, sample: usize) -> Vec<f64> {
        self.data.row(sample).iter().cloned().collect()
    }

    /// Get a column (gene) as a vector.
    pub fn col(&self, gene: usize) -> Vec<f64> {
        self.data.column(gene).iter().cloned().collect()
    }

    /// Sum of each row.
    pub fn row_sums(&self) -> Vec<f64> {
        self.data.row_iter().map(|r| r.sum()).collect()
    }

    /// Get reference to the underlying matrix.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Write as a numeric text table: one sample per line, space separated, no header.
    pub fn to_table<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        for row in self.data.row_iter() {
            let mut first = true;
            for val in row.iter() {
                if !first {
                    write!(writer, " ")?;
                }
                write!(writer, "{}", val)?;
                first = false;
            }
            writeln!(writer)?;
        }
        writer.flush()?;

        Ok(())
    }
}
