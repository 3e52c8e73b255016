//! Output sinks for pipeline artifacts.

use crate::data::ExpressionMatrix;
use crate::error::Result;
use crate::filter::CellFilterResult;
use crate::variable::{DispersionTable, SelectedGeneSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Receives the artifacts of a successful run, in stage order.
///
/// The runner only calls a sink once every stage has succeeded. After the last
/// artifact it calls [`PrepSink::commit`], or [`PrepSink::discard`] if handing
/// over any artifact failed.
pub trait PrepSink {
    /// Called when the cell filter was active.
    fn kept_cells(&mut self, _cells: &CellFilterResult) -> Result<()> {
        Ok(())
    }

    fn dispersion_table(&mut self, _table: &DispersionTable) -> Result<()> {
        Ok(())
    }

    fn selected_genes(&mut self, _selected: &SelectedGeneSet) -> Result<()> {
        Ok(())
    }

    fn output_matrix(&mut self, _matrix: &ExpressionMatrix) -> Result<()> {
        Ok(())
    }

    /// Make everything received so far visible.
    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    /// Drop everything received so far.
    fn discard(&mut self) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PrepSink for NullSink {}

/// Writes artifacts as plain text files into a directory.
///
/// - `keepCellIndex.txt`: retained cell indices, one per line
/// - `genesSel.txt`: selected gene identifiers, one per line
/// - `dataSel.txt`: the log-transformed output matrix
/// - `dispersion.tsv`: the per-gene dispersion table (opt-in)
///
/// Files are first written under hidden `.tmp` names and renamed into place on
/// commit. A `keepCellIndex.txt` left by an earlier run is removed when the
/// committed run did not filter cells.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    write_dispersion: bool,
    /// `(temporary, final)` paths written but not yet committed.
    staged: Vec<(PathBuf, PathBuf)>,
}

impl DirectorySink {
    pub const KEPT_CELLS_FILE: &'static str = "keepCellIndex.txt";
    pub const GENES_FILE: &'static str = "genesSel.txt";
    pub const MATRIX_FILE: &'static str = "dataSel.txt";
    pub const DISPERSION_FILE: &'static str = "dispersion.tsv";

    /// Create a sink writing into `dir`, which is created on first write.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            write_dispersion: false,
            staged: Vec::new(),
        }
    }

    /// Also write the dispersion table.
    pub fn with_dispersion(mut self, enabled: bool) -> Self {
        self.write_dispersion = enabled;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Temporary path for `name`, recorded for commit or discard.
    fn stage(&mut self, name: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let tmp = self.dir.join(format!(".{}.tmp", name));
        self.staged.push((tmp.clone(), self.dir.join(name)));
        Ok(tmp)
    }
}

impl PrepSink for DirectorySink {
    fn kept_cells(&mut self, cells: &CellFilterResult) -> Result<()> {
        let path = self.stage(Self::KEPT_CELLS_FILE)?;
        write_lines(path, cells.kept_indices.iter())
    }

    fn dispersion_table(&mut self, table: &DispersionTable) -> Result<()> {
        if !self.write_dispersion {
            return Ok(());
        }
        table.to_tsv(self.stage(Self::DISPERSION_FILE)?)
    }

    fn selected_genes(&mut self, selected: &SelectedGeneSet) -> Result<()> {
        let path = self.stage(Self::GENES_FILE)?;
        write_lines(path, selected.gene_ids.iter())
    }

    fn output_matrix(&mut self, matrix: &ExpressionMatrix) -> Result<()> {
        matrix.to_table(self.stage(Self::MATRIX_FILE)?)
    }

    fn commit(&mut self) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);

        let kept_cells = self.dir.join(Self::KEPT_CELLS_FILE);
        if !staged.iter().any(|(_, target)| *target == kept_cells) && kept_cells.is_file() {
            fs::remove_file(&kept_cells)?;
        }

        for (tmp, target) in staged {
            fs::rename(tmp, target)?;
        }
        Ok(())
    }

    fn discard(&mut self) {
        for (tmp, _) in self.staged.drain(..) {
            // may not exist if creating it was what failed
            let _ = fs::remove_file(tmp);
        }
    }
}

/// Write one item per line.
pub fn write_lines<P, I, T>(path: P, items: I) -> Result<()>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = T>,
    T: std::fmt::Display,
{
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for item in items {
        writeln!(writer, "{}", item)?;
    }
    writer.flush()?;
    Ok(())
}
