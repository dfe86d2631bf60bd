//! Per-resolution iteration table.
//!
//! Columns are created on first use and keep their insertion order, so the
//! pipeline's `1:ItNr` comes first, component columns (`2:Metric`, ...)
//! follow, and `Time[ms]` closes the row. When a file is attached the header
//! line is written with the first row and every row is appended
//! tab-separated.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::Result;

#[derive(Debug, Default)]
pub struct IterationLog {
    columns: IndexMap<String, String>,
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    file: Option<(PathBuf, BufWriter<File>)>,
}

impl IterationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new table, optionally mirrored to `path`.
    pub fn open(&mut self, path: Option<&Path>) -> Result<()> {
        self.close()?;
        self.columns.clear();
        self.header.clear();
        self.rows.clear();
        if let Some(path) = path {
            let file = File::create(path)?;
            self.file = Some((path.to_path_buf(), BufWriter::new(file)));
        }
        Ok(())
    }

    /// Set a cell of the current row, adding the column if new.
    pub fn set(&mut self, column: &str, value: impl ToString) {
        self.columns.insert(column.to_string(), value.to_string());
    }

    /// Format a float the way the table prints numbers.
    pub fn set_float(&mut self, column: &str, value: f64) {
        self.set(column, format!("{value:.6}"));
    }

    /// Emit the current row and clear its cells (columns are kept).
    pub fn write_row(&mut self) -> Result<()> {
        if self.header.is_empty() {
            self.header = self.columns.keys().cloned().collect();
            if let Some((_, writer)) = self.file.as_mut() {
                writeln!(writer, "{}", self.header.join("\t"))?;
            }
        }
        for key in self.columns.keys() {
            if !self.header.contains(key) {
                tracing::debug!(column = %key, "iteration column added after first row is not printed");
            }
        }
        let row: Vec<String> = self
            .header
            .iter()
            .map(|column| self.columns.get(column).cloned().unwrap_or_default())
            .collect();
        tracing::debug!(row = %row.join("\t"), "iteration");
        if let Some((_, writer)) = self.file.as_mut() {
            writeln!(writer, "{}", row.join("\t"))?;
        }
        self.rows.push(row);
        for value in self.columns.values_mut() {
            value.clear();
        }
        Ok(())
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|(path, _)| path.as_path())
    }

    /// Flush and detach the file, if any.
    pub fn close(&mut self) -> Result<()> {
        if let Some((_, mut writer)) = self.file.take() {
            writer.flush()?;
        }
        Ok(())
    }
}
