//! scprep - single-cell count matrix preprocessing CLI
//!
//! Filters low-quality cells and weakly detected genes, normalizes library
//! sizes, selects bin-normalized variable genes and log-transforms the result.

use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use scrna_prep::data::{read_gene_index, CountMatrix};
use scrna_prep::error::Result;
use scrna_prep::pipeline::{DirectorySink, PrepConfig, Preprocessed, Preprocessor};
use std::path::{Path, PathBuf};

/// Single-cell preprocessing for rare-population scoring
#[derive(Parser)]
#[command(name = "scprep")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Report progress and intermediate shapes
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Preprocess a count matrix and write the selected, log-transformed genes
    Run {
        /// Count table: one cell per line, whitespace separated, no header
        #[arg(short = 'c', long)]
        counts: PathBuf,

        /// Gene identifiers, one per line, aligned with the table columns
        #[arg(short, long)]
        genes: PathBuf,

        /// Output directory for genesSel.txt, dataSel.txt and keepCellIndex.txt
        #[arg(short, long)]
        output: PathBuf,

        /// Pipeline configuration YAML; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of variable genes to keep (default: 1000)
        #[arg(short = 'k', long)]
        ngenes_keep: Option<usize>,

        /// Keep cells expressing more than this many genes; 0 disables (default: 0)
        #[arg(long)]
        min_lib_size: Option<usize>,

        /// Also write the per-gene dispersion table (dispersion.tsv)
        #[arg(long)]
        write_dispersion: bool,

        /// Print a JSON run summary to stdout
        #[arg(long)]
        summary: bool,
    },

    /// Compute and write the per-gene dispersion table without selecting genes
    Dispersion {
        /// Count table: one cell per line, whitespace separated, no header
        #[arg(short = 'c', long)]
        counts: PathBuf,

        /// Gene identifiers, one per line
        #[arg(short, long)]
        genes: PathBuf,

        /// Output path for the dispersion TSV
        #[arg(short, long)]
        output: PathBuf,

        /// Keep cells expressing more than this many genes; 0 disables
        #[arg(long, default_value = "0")]
        min_lib_size: usize,
    },

    /// Generate an example pipeline configuration
    Example {
        /// Output path for the example YAML
        #[arg(short, long, default_value = "preprocess.yaml")]
        output: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Commands::Run {
            counts,
            genes,
            output,
            config,
            ngenes_keep,
            min_lib_size,
            write_dispersion,
            summary,
        } => cmd_run(
            &counts,
            &genes,
            &output,
            config.as_deref(),
            ngenes_keep,
            min_lib_size,
            write_dispersion,
            summary,
            cli.verbose,
        ),

        Commands::Dispersion {
            counts,
            genes,
            output,
            min_lib_size,
        } => cmd_dispersion(&counts, &genes, &output, min_lib_size, cli.verbose),

        Commands::Example { output } => cmd_example(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_counts(counts_path: &Path, genes_path: &Path) -> Result<CountMatrix> {
    info!("Loading gene index from {:?}...", genes_path);
    let gene_ids = read_gene_index(genes_path)?;

    info!("Loading count matrix from {:?}...", counts_path);
    let counts = CountMatrix::from_table(counts_path, gene_ids)?;
    info!(
        "Loaded {} cells x {} genes",
        counts.n_samples(),
        counts.n_genes()
    );
    Ok(counts)
}

/// Run the full preprocessing pipeline
#[allow(clippy::too_many_arguments)]
fn cmd_run(
    counts_path: &Path,
    genes_path: &Path,
    output_dir: &Path,
    config_path: Option<&Path>,
    ngenes_keep: Option<usize>,
    min_lib_size: Option<usize>,
    write_dispersion: bool,
    summary: bool,
    verbose: bool,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => {
            info!("Loading pipeline configuration from {:?}...", path);
            PrepConfig::from_yaml_file(path)?
        }
        None => PrepConfig::default(),
    };
    if let Some(k) = ngenes_keep {
        config.ngenes_keep = k;
    }
    if let Some(n) = min_lib_size {
        config.min_lib_size = n;
    }
    config.verbose |= verbose;

    let counts = load_counts(counts_path, genes_path)?;

    info!(
        "Running '{}' (keep {} genes, min_lib_size {})...",
        config.name, config.ngenes_keep, config.min_lib_size
    );
    let mut sink = DirectorySink::new(output_dir).with_dispersion(write_dispersion);
    let result = Preprocessor::from_config(&config).run_with_sink(&counts, &mut sink)?;

    info!(
        "Done! {} cells x {} genes written to {:?}",
        result.output.n_samples(),
        result.output.n_genes(),
        output_dir
    );

    if summary {
        println!("{}", run_summary(&config, &result)?);
    }

    Ok(())
}

fn run_summary(config: &PrepConfig, result: &Preprocessed) -> Result<String> {
    let top: Vec<_> = result
        .selected
        .gene_ids
        .iter()
        .zip(&result.selected.scores)
        .take(10)
        .map(|(id, score)| serde_json::json!({ "gene_id": id, "dispersion_norm": score }))
        .collect();

    let summary = serde_json::json!({
        "name": config.name,
        "cells": {
            "filtered": result.cells.is_some(),
            "n_kept": result.output.n_samples(),
        },
        "genes": {
            "n_before": result.genes.n_before,
            "n_detected": result.genes.n_after,
            "n_selected": result.selected.len(),
            "cutoff": result.selected.cutoff,
        },
        "median_library_size": result.normalized.median_library_size,
        "n_mean_bins": result.dispersion.bin_stats.len(),
        "top_genes": top,
    });
    Ok(serde_json::to_string_pretty(&summary)?)
}

/// Write the per-gene dispersion table
fn cmd_dispersion(
    counts_path: &Path,
    genes_path: &Path,
    output_path: &Path,
    min_lib_size: usize,
    verbose: bool,
) -> Result<()> {
    let counts = load_counts(counts_path, genes_path)?;

    let ranked = Preprocessor::new()
        .min_lib_size(min_lib_size)
        .verbose(verbose)
        .rank(&counts)?;

    info!("Writing dispersion table to {:?}...", output_path);
    ranked.dispersion.to_tsv(output_path)?;
    info!("Done! {} genes scored", ranked.dispersion.len());

    Ok(())
}

/// Write an example configuration
fn cmd_example(output_path: &Path) -> Result<()> {
    let config = Preprocessor::new().name("example").to_config();
    std::fs::write(output_path, config.to_yaml()?)?;
    info!("Example configuration written to {:?}", output_path);
    Ok(())
}
