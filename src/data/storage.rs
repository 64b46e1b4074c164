//! CSV persistence of a finished trace.
//!
//! A trace is written as exactly two rows: all timestamps, then all
//! voltages, column-aligned by sample index. The file is first written into
//! the output directory and then moved into a per-day folder:
//!
//! ```text
//! <output_dir>/LaserV_2024_03_09/LaserV_2024_03_09_14.02.51.csv
//! ```

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use tracing::{debug, info};

use super::trace::Trace;
use crate::error::DaqResult;

/// Default prefix for trace files and day folders.
pub const DEFAULT_FILE_PREFIX: &str = "LaserV";

const DELIMITER: u8 = b',';
const QUOTE: u8 = b'|';

/// Writes traces as two-row CSV files into day folders.
#[derive(Debug, Clone)]
pub struct CsvTraceWriter {
    output_dir: PathBuf,
    prefix: String,
}

impl Default for CsvTraceWriter {
    fn default() -> Self {
        Self::new(".", DEFAULT_FILE_PREFIX)
    }
}

impl CsvTraceWriter {
    /// Writer rooted at `output_dir` naming files `<prefix>_...`.
    pub fn new(output_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Directory the day folders are created in.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Day folder name, `<prefix>_YYYY_MM_DD`.
    pub fn folder_name(&self, at: &NaiveDateTime) -> String {
        format!("{}_{}", self.prefix, at.format("%Y_%m_%d"))
    }

    /// File name, `<prefix>_YYYY_MM_DD_HH.MM.SS.csv`.
    pub fn file_name(&self, at: &NaiveDateTime) -> String {
        format!("{}_{}.csv", self.prefix, at.format("%Y_%m_%d_%H.%M.%S"))
    }

    /// Write `trace` and move it into its day folder.
    ///
    /// Both names derive from the single instant `at`. The output directory
    /// and the day folder are created if they do not exist yet. Returns the
    /// final path.
    pub fn persist(&self, trace: &Trace, at: &NaiveDateTime) -> DaqResult<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        let file_name = self.file_name(at);
        let staged = self.output_dir.join(&file_name);
        write_rows(&staged, trace)?;
        debug!("Wrote {} samples to '{}'", trace.len(), staged.display());

        let folder = self.output_dir.join(self.folder_name(at));
        fs::create_dir_all(&folder)?;
        let destination = folder.join(&file_name);
        fs::rename(&staged, &destination)?;

        info!("Trace saved to '{}'", destination.display());
        Ok(destination)
    }
}

/// Write the two trace rows to `path`.
///
/// An empty trace gives two empty lines.
pub fn write_rows(path: &Path, trace: &Trace) -> DaqResult<()> {
    let mut file = File::create(path)?;
    if trace.is_empty() {
        // write_record would emit a quoted empty field instead of a bare line
        file.write_all(b"\n\n")?;
        return Ok(());
    }
    let mut writer = WriterBuilder::new()
        .delimiter(DELIMITER)
        .quote(QUOTE)
        .quote_style(QuoteStyle::Necessary)
        .from_writer(file);

    writer.write_record(trace.timestamps())?;
    writer.write_record(trace.voltages().map(|v| v.to_string()))?;
    writer.flush()?;
    Ok(())
}

/// Read back the rows of a trace file as text.
pub fn read_rows(path: &Path) -> DaqResult<Vec<Vec<String>>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(DELIMITER)
        .quote(QUOTE)
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok(rows)
}
