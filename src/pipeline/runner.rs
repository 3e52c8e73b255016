//! Preprocessing runner: composes the stages and drives the output sink.

use super::sink::{NullSink, PrepSink};
use crate::data::{CountMatrix, ExpressionMatrix};
use crate::error::{PrepError, Result};
use crate::filter::{
    filter_cells, filter_genes_by_detection, CellFilterResult, DetectionThresholds,
    GeneFilterResult,
};
use crate::normalize::{norm_library_size, NormalizedMatrix};
use crate::transform::log_selected;
use crate::variable::{rank_variable_genes, DispersionTable, SelectedGeneSet};
use log::{debug, error, log, Level};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A stage of the preprocessing pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    CellFilter,
    GeneDetectionFilter,
    LibrarySizeNormalizer,
    VariableGeneRanker,
    TopKSelector,
    LogTransformer,
    Output,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::CellFilter => "cell filter",
            Stage::GeneDetectionFilter => "gene detection filter",
            Stage::LibrarySizeNormalizer => "library size normalization",
            Stage::VariableGeneRanker => "variable gene ranking",
            Stage::TopKSelector => "top-K selection",
            Stage::LogTransformer => "log transform",
            Stage::Output => "output",
        };
        write!(f, "{}", name)
    }
}

fn default_name() -> String {
    "preprocess".to_string()
}

fn default_ngenes_keep() -> usize {
    1000
}

fn default_gene_min_count() -> f64 {
    2.0
}

fn default_gene_min_cells() -> usize {
    3
}

/// Pipeline configuration for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepConfig {
    /// Name of the run, used in diagnostics.
    #[serde(default = "default_name")]
    pub name: String,
    /// Number of top variable genes to keep.
    #[serde(default = "default_ngenes_keep")]
    pub ngenes_keep: usize,
    /// Cells must express more than this many genes; 0 disables cell filtering.
    #[serde(default)]
    pub min_lib_size: usize,
    /// A gene is detected in a cell when its count is above this value.
    #[serde(default = "default_gene_min_count")]
    pub gene_min_count: f64,
    /// Genes must be detected in more than this many cells.
    #[serde(default = "default_gene_min_cells")]
    pub gene_min_cells: usize,
    /// Report shapes and counts at info level instead of debug.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            ngenes_keep: default_ngenes_keep(),
            min_lib_size: 0,
            gene_min_count: default_gene_min_count(),
            gene_min_cells: default_gene_min_cells(),
            verbose: false,
        }
    }
}

impl PrepConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(PrepError::from)
    }

    /// Load from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(PrepError::from)
    }

    /// Save to JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(PrepError::from)
    }

    /// Detection filter thresholds.
    pub fn detection(&self) -> DetectionThresholds {
        DetectionThresholds {
            min_count: self.gene_min_count,
            min_cells: self.gene_min_cells,
        }
    }
}

/// Intermediate results up to variable gene ranking.
#[derive(Debug, Clone)]
pub struct RankedGenes {
    /// Present when cell filtering was active.
    pub cells: Option<CellFilterResult>,
    pub genes: GeneFilterResult,
    pub normalized: NormalizedMatrix,
    pub dispersion: DispersionTable,
}

/// Everything produced by one preprocessing run.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// Log-transformed matrix of the selected genes (samples × K), in rank order.
    pub output: ExpressionMatrix,
    pub selected: SelectedGeneSet,
    pub dispersion: DispersionTable,
    pub normalized: NormalizedMatrix,
    pub genes: GeneFilterResult,
    /// Present when cell filtering was active.
    pub cells: Option<CellFilterResult>,
}

impl Preprocessed {
    /// Hand every artifact to a sink, in stage order, then commit.
    ///
    /// If any artifact fails the sink is told to discard what it has.
    pub fn emit(&self, sink: &mut dyn PrepSink) -> Result<()> {
        match self.hand_over(sink) {
            Ok(()) => sink.commit(),
            Err(e) => {
                sink.discard();
                Err(e)
            }
        }
    }

    fn hand_over(&self, sink: &mut dyn PrepSink) -> Result<()> {
        if let Some(cells) = &self.cells {
            sink.kept_cells(cells)?;
        }
        sink.dispersion_table(&self.dispersion)?;
        sink.selected_genes(&self.selected)?;
        sink.output_matrix(&self.output)?;
        Ok(())
    }
}

/// Builder for configuring and running the preprocessing pipeline.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: PrepConfig,
}

impl Preprocessor {
    /// Create a preprocessor with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from a config.
    pub fn from_config(config: &PrepConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Convert to config for serialization.
    pub fn to_config(&self) -> PrepConfig {
        self.config.clone()
    }

    /// Set the run name.
    pub fn name(mut self, name: &str) -> Self {
        self.config.name = name.to_string();
        self
    }

    /// Number of variable genes to keep.
    pub fn ngenes_keep(mut self, k: usize) -> Self {
        self.config.ngenes_keep = k;
        self
    }

    /// Enable cell filtering: keep cells expressing more than `n` genes.
    pub fn min_lib_size(mut self, n: usize) -> Self {
        self.config.min_lib_size = n;
        self
    }

    /// Override the gene detection thresholds.
    pub fn detection(mut self, thresholds: DetectionThresholds) -> Self {
        self.config.gene_min_count = thresholds.min_count;
        self.config.gene_min_cells = thresholds.min_cells;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    fn level(&self) -> Level {
        if self.config.verbose {
            Level::Info
        } else {
            Level::Debug
        }
    }

    /// Run the stages up to and including variable gene ranking.
    ///
    /// Useful for inspecting dispersion scores without choosing K.
    pub fn rank(&self, counts: &CountMatrix) -> Result<RankedGenes> {
        self.rank_keeping(counts, None)
    }

    /// Ranking, failing early when fewer than `keep` genes survive detection filtering.
    fn rank_keeping(&self, counts: &CountMatrix, keep: Option<usize>) -> Result<RankedGenes> {
        let level = self.level();
        log!(
            level,
            "[{}] input matrix: {} cells x {} genes",
            self.config.name,
            counts.n_samples(),
            counts.n_genes()
        );

        let (cell_filtered, cells) =
            stage(Stage::CellFilter, filter_cells(counts, self.config.min_lib_size))?;
        if cells.active {
            log!(
                level,
                "[{}] after cell filtering: {} cells x {} genes",
                self.config.name,
                cell_filtered.n_samples(),
                cell_filtered.n_genes()
            );
        }

        let (gene_filtered, genes) = stage(
            Stage::GeneDetectionFilter,
            filter_genes_by_detection(&cell_filtered, self.config.detection()),
        )?;
        log!(
            level,
            "[{}] after gene filtering: {} cells x {} genes",
            self.config.name,
            gene_filtered.n_samples(),
            gene_filtered.n_genes()
        );
        if let Some(k) = keep {
            if k > genes.n_after {
                return stage(
                    Stage::TopKSelector,
                    Err(PrepError::InsufficientFeatures {
                        requested: k,
                        available: genes.n_after,
                    }),
                );
            }
        }

        let normalized = stage(
            Stage::LibrarySizeNormalizer,
            norm_library_size(&gene_filtered),
        )?;
        debug!(
            "[{}] median library size {}",
            self.config.name, normalized.median_library_size
        );

        let dispersion = stage(
            Stage::VariableGeneRanker,
            rank_variable_genes(&normalized.matrix),
        )?;
        debug!(
            "[{}] {} non-empty mean bins",
            self.config.name,
            dispersion.bin_stats.len()
        );

        Ok(RankedGenes {
            cells: if cells.active { Some(cells) } else { None },
            genes,
            normalized,
            dispersion,
        })
    }

    /// Run the full pipeline without writing anything.
    pub fn run(&self, counts: &CountMatrix) -> Result<Preprocessed> {
        let RankedGenes {
            cells,
            genes,
            normalized,
            dispersion,
        } = self.rank_keeping(counts, Some(self.config.ngenes_keep))?;

        let selected = stage(
            Stage::TopKSelector,
            dispersion.select_top(self.config.ngenes_keep),
        )?;
        log!(
            self.level(),
            "[{}] selected {} genes, cutoff score {}",
            self.config.name,
            selected.len(),
            selected.cutoff
        );

        let output = stage(
            Stage::LogTransformer,
            log_selected(&normalized.matrix, &selected),
        )?;

        Ok(Preprocessed {
            output,
            selected,
            dispersion,
            normalized,
            genes,
            cells,
        })
    }

    /// Run the full pipeline, then hand the artifacts to `sink`.
    ///
    /// The sink is only touched after every stage has succeeded.
    pub fn run_with_sink(
        &self,
        counts: &CountMatrix,
        sink: &mut dyn PrepSink,
    ) -> Result<Preprocessed> {
        let result = self.run(counts)?;
        stage(Stage::Output, result.emit(sink))?;
        Ok(result)
    }
}

/// Log a stage failure and pass the result through unchanged.
fn stage<T>(stage: Stage, result: Result<T>) -> Result<T> {
    result.map_err(|e| {
        error!("{} failed: {}", stage, e);
        e
    })
}

/// Convenience function: preprocess with default settings and `ngenes_keep` genes.
pub fn preprocess(counts: &CountMatrix, ngenes_keep: usize) -> Result<Preprocessed> {
    Preprocessor::new()
        .ngenes_keep(ngenes_keep)
        .run_with_sink(counts, &mut NullSink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::DirectorySink;

    /// 30 cells × 60 genes with distinct, non-degenerate expression profiles.
    fn create_test_counts() -> CountMatrix {
        let n_cells = 30;
        let n_genes = 60;
        let mut seed = 7u64;
        let mut rows = Vec::with_capacity(n_cells);

        for _ in 0..n_cells {
            let mut row = Vec::with_capacity(n_genes);
            for j in 0..n_genes {
                seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
                let noise = ((seed >> 16) & 0x7FFF) as f64 / 32768.0;
                let base = 3.0 + (j % 15) as f64 * 2.0;
                row.push((base * (0.3 + 1.4 * noise)).round());
            }
            rows.push(row);
        }
        let gene_ids: Vec<String> = (0..n_genes).map(|j| format!("gene_{}", j)).collect();
        CountMatrix::from_dense_rows(&rows, gene_ids).unwrap()
    }

    #[test]
    fn test_builder_config() {
        let pre = Preprocessor::new()
            .name("test")
            .ngenes_keep(50)
            .min_lib_size(10)
            .verbose(true);
        let config = pre.to_config();

        assert_eq!(config.name, "test");
        assert_eq!(config.ngenes_keep, 50);
        assert_eq!(config.min_lib_size, 10);
        assert_eq!(config.detection(), DetectionThresholds::default());
        assert!(config.verbose);
    }

    #[test]
    fn test_config_yaml_roundtrip() {
        let config = Preprocessor::new().name("example").ngenes_keep(200).to_config();
        let yaml = config.to_yaml().unwrap();
        let parsed = PrepConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_config_yaml_defaults() {
        let parsed = PrepConfig::from_yaml("ngenes_keep: 25\n").unwrap();
        assert_eq!(parsed.ngenes_keep, 25);
        assert_eq!(parsed.min_lib_size, 0);
        assert_eq!(parsed.gene_min_cells, 3);
        assert_eq!(parsed.gene_min_count, 2.0);
        assert!(PrepConfig::from_yaml("ngenes_keep: [").is_err());
    }

    #[test]
    fn test_config_json() {
        let config = Preprocessor::new().name("json").min_lib_size(200).to_config();
        let json = config.to_json().unwrap();
        let parsed: PrepConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
        assert!(json.contains("\"min_lib_size\": 200"));
    }

    #[test]
    fn test_run() {
        let counts = create_test_counts();
        let result = Preprocessor::new().ngenes_keep(20).run(&counts).unwrap();

        assert_eq!(result.output.n_samples(), 30);
        assert_eq!(result.output.n_genes(), 20);
        assert_eq!(result.selected.len(), 20);
        assert_eq!(result.output.gene_ids, result.selected.gene_ids);
        assert!(result.cells.is_none());
        assert_eq!(result.dispersion.len(), result.genes.n_after);
    }

    #[test]
    fn test_insufficient_features() {
        let counts = create_test_counts();
        let err = Preprocessor::new().ngenes_keep(1000).run(&counts).unwrap_err();
        assert!(matches!(err, PrepError::InsufficientFeatures { requested: 1000, .. }));
    }

    #[test]
    fn test_too_few_genes_for_k() {
        // 12 cells × 6 genes, every gene passes detection; too few genes for
        // stable bins, so the gene count must be checked before ranking
        let rows: Vec<Vec<f64>> = (0..12)
            .map(|i| (0..6).map(|j| 3.0 + ((i * 7 + j * 3) % 11) as f64).collect())
            .collect();
        let gene_ids: Vec<String> = (0..6).map(|j| format!("gene_{}", j)).collect();
        let counts = CountMatrix::from_dense_rows(&rows, gene_ids).unwrap();

        let err = Preprocessor::new().ngenes_keep(1000).run(&counts).unwrap_err();
        assert!(matches!(
            err,
            PrepError::InsufficientFeatures {
                requested: 1000,
                available: 6
            }
        ));

        // ranking alone does not choose K
        assert!(!matches!(
            Preprocessor::new().rank(&counts),
            Err(PrepError::InsufficientFeatures { .. })
        ));
    }

    #[test]
    fn test_failed_run_writes_nothing() {
        let counts = create_test_counts();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let mut sink = DirectorySink::new(&out).with_dispersion(true);

        let result = Preprocessor::new()
            .ngenes_keep(5000)
            .min_lib_size(1)
            .run_with_sink(&counts, &mut sink);

        assert!(result.is_err());
        assert!(!out.exists());
    }
}
