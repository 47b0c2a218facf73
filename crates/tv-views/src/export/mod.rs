//! Exporting the current view

pub mod projection;
pub mod writers;

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;
use tv_core::{CancelFlag, Result, TableError};

use crate::model::ViewSnapshot;
pub use projection::Projection;

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Csv,
    Json,
    Parquet,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Parquet => "parquet",
        }
    }

    pub fn filter_name(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "Comma-Separated Values",
            ExportFormat::Json => "JSON Records",
            ExportFormat::Parquet => "Apache Parquet",
        }
    }

    /// Format named by a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => Some(ExportFormat::Csv),
            "json" => Some(ExportFormat::Json),
            "parquet" | "pq" => Some(ExportFormat::Parquet),
            _ => None,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// What to do with a value or column type the export cannot represent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExportMode {
    /// Write null in its place and log a warning
    #[default]
    Lenient,
    /// Fail with `TypeMismatch`
    Strict,
}

/// Export options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Output format; taken from the file extension when unset
    pub format: Option<ExportFormat>,
    pub mode: ExportMode,
    /// Field delimiter for CSV output
    pub csv_delimiter: u8,
    /// Write a header row in CSV output
    pub csv_header: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: None,
            mode: ExportMode::Lenient,
            csv_delimiter: b',',
            csv_header: true,
        }
    }
}

impl ExportOptions {
    fn resolve_format(&self, path: &Path) -> Result<ExportFormat> {
        self.format
            .or_else(|| ExportFormat::from_path(path))
            .ok_or_else(|| {
                TableError::ExportFailed(format!(
                    "cannot tell the export format of {}",
                    path.display()
                ))
            })
    }
}

/// Outcome of a finished export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub format: ExportFormat,
    pub rows: usize,
    pub columns: usize,
}

/// Write a projection in `format` to any writer
pub fn write_projection<W: Write + Send>(
    projection: &Projection,
    format: ExportFormat,
    writer: W,
    options: &ExportOptions,
) -> Result<()> {
    let batch = projection.batch();
    match format {
        ExportFormat::Csv => writers::write_csv(batch, writer, options.csv_delimiter, options.csv_header),
        ExportFormat::Json => writers::write_json(batch, writer),
        ExportFormat::Parquet => writers::write_parquet(batch, writer),
    }
}

/// Project `snapshot` and write it to `path`.
///
/// The file is only created once the projection is complete, so a failed
/// or cancelled projection leaves nothing behind.
pub fn export_to_path(
    snapshot: &ViewSnapshot,
    path: &Path,
    options: &ExportOptions,
    cancel: Option<&CancelFlag>,
) -> Result<ExportSummary> {
    let format = options.resolve_format(path)?;
    let projection = Projection::build(snapshot, options.mode, cancel)?;

    let file = File::create(path).map_err(|e| TableError::ExportFailed(format!("{}: {}", path.display(), e)))?;
    let mut writer = BufWriter::new(file);
    write_projection(&projection, format, &mut writer, options)?;
    writer
        .flush()
        .map_err(|e| TableError::ExportFailed(format!("{}: {}", path.display(), e)))?;

    let summary = ExportSummary {
        path: path.to_path_buf(),
        format,
        rows: projection.num_rows(),
        columns: projection.num_columns(),
    };
    info!(
        "Exported {} rows x {} columns to {} as {}",
        summary.rows,
        summary.columns,
        summary.path.display(),
        summary.format
    );
    Ok(summary)
}

/// Run `export_to_path` on Tokio's blocking pool
pub async fn export_in_background(
    snapshot: ViewSnapshot,
    path: PathBuf,
    options: ExportOptions,
    cancel: CancelFlag,
) -> Result<ExportSummary> {
    tokio::task::spawn_blocking(move || export_to_path(&snapshot, &path, &options, Some(&cancel)))
        .await
        .map_err(|e| TableError::ExportFailed(format!("export task failed: {}", e)))?
}
