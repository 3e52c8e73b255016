//! Sparse count matrix for single-cell expression data.

use crate::error::{PrepError, Result};
use nalgebra::DMatrix;
use sprs::{CsMat, TriMat};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A sparse count matrix storing gene counts across cells.
///
/// Rows represent samples (cells), columns represent genes.
/// Uses CSR (Compressed Sparse Row) format so per-cell scans are cheap.
/// Every stored entry is finite and non-negative.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    /// Sparse matrix in CSR format (samples × genes)
    data: CsMat<f64>,
    /// Gene identifiers, positionally aligned with columns
    gene_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a new CountMatrix from a sparse matrix and gene identifiers.
    pub fn new(data: CsMat<f64>, gene_ids: Vec<String>) -> Result<Self> {
        let ncols = data.cols();
        if ncols != gene_ids.len() {
            return Err(PrepError::DimensionMismatch {
                expected: ncols,
                actual: gene_ids.len(),
            });
        }
        let data = if data.is_csr() { data } else { data.to_csr() };

        for (row, row_vec) in data.outer_iterator().enumerate() {
            for (col, &val) in row_vec.iter() {
                if !val.is_finite() || val < 0.0 {
                    return Err(PrepError::InvalidValue {
                        value: val.to_string(),
                        row,
                        col,
                    });
                }
            }
        }

        Ok(Self { data, gene_ids })
    }

    /// Build from dense rows (one `Vec` per sample).
    pub fn from_dense_rows(rows: &[Vec<f64>], gene_ids: Vec<String>) -> Result<Self> {
        let n_genes = gene_ids.len();
        let mut tri_mat = TriMat::new((rows.len(), n_genes));

        for (row, values) in rows.iter().enumerate() {
            if values.len() != n_genes {
                return Err(PrepError::DimensionMismatch {
                    expected: n_genes,
                    actual: values.len(),
                });
            }
            for (col, &val) in values.iter().enumerate() {
                if val != 0.0 {
                    tri_mat.add_triplet(row, col, val);
                }
            }
        }

        Self::new(tri_mat.to_csr(), gene_ids)
    }

    /// Create from a dense matrix (samples × genes).
    pub fn from_dense(data: &DMatrix<f64>, gene_ids: Vec<String>) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        let mut tri_mat = TriMat::new((nrows, ncols));

        for row in 0..nrows {
            for col in 0..ncols {
                let val = data[(row, col)];
                if val != 0.0 {
                    tri_mat.add_triplet(row, col, val);
                }
            }
        }

        Self::new(tri_mat.to_csr(), gene_ids)
    }

    /// Load a count matrix from a numeric text table.
    ///
    /// Expected format:
    /// - No header; one sample per line
    /// - Values separated by whitespace (spaces or tabs)
    /// - Blank lines and lines starting with `#` are skipped
    ///
    /// Gene identifiers are read separately with [`read_gene_index`].
    pub fn from_table<P: AsRef<Path>>(path: P, gene_ids: Vec<String>) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let n_genes = gene_ids.len();
        let mut triplets: Vec<(usize, usize, f64)> = Vec::new();
        let mut n_samples = 0usize;

        for line_result in reader.lines() {
            let line = line_result?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let row_idx = n_samples;
            let mut n_fields = 0usize;
            for (col_idx, value_str) in trimmed.split_whitespace().enumerate() {
                let value: f64 = value_str.parse().map_err(|_| PrepError::InvalidValue {
                    value: value_str.to_string(),
                    row: row_idx,
                    col: col_idx,
                })?;
                if value != 0.0 {
                    triplets.push((row_idx, col_idx, value));
                }
                n_fields += 1;
            }
            if n_fields != n_genes {
                return Err(PrepError::DimensionMismatch {
                    expected: n_genes,
                    actual: n_fields,
                });
            }
            n_samples += 1;
        }

        if n_samples == 0 {
            return Err(PrepError::EmptyInput("No samples in count table".to_string()));
        }

        let mut tri_mat = TriMat::new((n_samples, n_genes));
        for (row, col, val) in triplets {
            tri_mat.add_triplet(row, col, val);
        }

        Self::new(tri_mat.to_csr(), gene_ids)
    }

    /// Get the value at (sample, gene), returning 0 for missing entries.
    #[inline]
    pub fn get(&self, sample: usize, gene: usize) -> f64 {
        self.data.get(sample, gene).copied().unwrap_or(0.0)
    }

    /// Number of samples (rows).
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.rows()
    }

    /// Number of genes (columns).
    #[inline]
    pub fn n_genes(&self) -> usize {
        self.data.cols()
    }

    /// Gene identifiers.
    #[inline]
    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    /// Get the underlying sparse matrix.
    #[inline]
    pub fn data(&self) -> &CsMat<f64> {
        &self.data
    }

    /// Get a dense vector for a specific row (sample).
    pub fn row_dense(&self, sample: usize) -> Vec<f64> {
        let mut dense = vec![0.0; self.n_genes()];
        if let Some(row_vec) = self.data.outer_view(sample) {
            for (col, &val) in row_vec.iter() {
                dense[col] = val;
            }
        }
        dense
    }

    /// Count, per sample, the genes whose value is strictly above `threshold`.
    pub fn detected_per_sample(&self, threshold: f64) -> Vec<usize> {
        self.data
            .outer_iterator()
            .map(|row_vec| row_vec.iter().filter(|&(_, &val)| val > threshold).count())
            .collect()
    }

    /// Count, per gene, the samples whose value is strictly above `threshold`.
    pub fn detected_per_gene(&self, threshold: f64) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_genes()];
        for row_vec in self.data.outer_iterator() {
            for (col, &val) in row_vec.iter() {
                if val > threshold {
                    counts[col] += 1;
                }
            }
        }
        counts
    }

    /// Compute row sums (library sizes per sample).
    pub fn row_sums(&self) -> Vec<f64> {
        self.data
            .outer_iterator()
            .map(|row_vec| row_vec.iter().map(|(_, &val)| val).sum())
            .collect()
    }

    /// Subset the matrix to include only specified samples (by index), in the given order.
    pub fn subset_samples(&self, indices: &[usize]) -> Result<Self> {
        let n_samples = indices.len();
        let n_genes = self.n_genes();
        let mut tri_mat = TriMat::new((n_samples, n_genes));

        for (new_row, &old_row) in indices.iter().enumerate() {
            let row_vec = self.data.outer_view(old_row).ok_or_else(|| {
                PrepError::InvalidParameter(format!("Sample index {} out of bounds", old_row))
            })?;
            for (col, &val) in row_vec.iter() {
                tri_mat.add_triplet(new_row, col, val);
            }
        }

        Self::new(tri_mat.to_csr(), self.gene_ids.clone())
    }

    /// Subset the matrix to include only specified genes (by index), in the given order.
    pub fn subset_genes(&self, indices: &[usize]) -> Result<Self> {
        let n_genes = indices.len();
        let mut col_map: Vec<Option<usize>> = vec![None; self.n_genes()];
        let mut new_gene_ids = Vec::with_capacity(n_genes);

        for (new_col, &old_col) in indices.iter().enumerate() {
            if old_col >= self.n_genes() {
                return Err(PrepError::InvalidParameter(format!(
                    "Gene index {} out of bounds",
                    old_col
                )));
            }
            col_map[old_col] = Some(new_col);
            new_gene_ids.push(self.gene_ids[old_col].clone());
        }

        let mut tri_mat = TriMat::new((self.n_samples(), n_genes));
        for (row, row_vec) in self.data.outer_iterator().enumerate() {
            for (old_col, &val) in row_vec.iter() {
                if let Some(new_col) = col_map[old_col] {
                    tri_mat.add_triplet(row, new_col, val);
                }
            }
        }

        Self::new(tri_mat.to_csr(), new_gene_ids)
    }

    /// Convert to a dense matrix (samples × genes).
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.n_samples(), self.n_genes());
        for (row, row_vec) in self.data.outer_iterator().enumerate() {
            for (col, &val) in row_vec.iter() {
                dense[(row, col)] = val;
            }
        }
        dense
    }
}

/// Read a gene index: one identifier per line, blank lines skipped.
pub fn read_gene_index<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut ids = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let id = line.trim();
        if !id.is_empty() {
            ids.push(id.to_string());
        }
    }

    if ids.is_empty() {
        return Err(PrepError::EmptyInput("Gene index file is empty".to_string()));
    }
    Ok(ids)
}
