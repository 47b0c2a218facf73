//! Data sources for the tabular view engine
//!
//! Every loader here produces an immutable, in-memory `DataSource` that the
//! view layer can filter, sort and project without touching the file again.

pub mod config;
pub mod loader;
pub mod schema;
pub mod sources;

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;
use tv_core::{DataType, TableError};

// Re-exports
pub use config::{FileConfig, FileType, NullConfig};
pub use loader::load;
pub use schema::SchemaDetector;
pub use sources::{ArrowSource, ColumnSpec, CsvSource, MemorySource, SqliteSource};

/// Errors that can occur while loading data
#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("CSV parsing error: {0}")]
    Csv(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Schema detection error: {0}")]
    SchemaDetection(String),

    #[error("Row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("No records found: {0}")]
    Empty(String),

    #[error(transparent)]
    Table(#[from] TableError),
}

impl From<csv::Error> for DataError {
    fn from(error: csv::Error) -> Self {
        match error.kind() {
            csv::ErrorKind::Io(io_err) => {
                DataError::Io(std::io::Error::new(io_err.kind(), error.to_string()))
            }
            _ => DataError::Csv(error.to_string()),
        }
    }
}

/// Inferred description of one loaded column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: DataType,
    pub null_count: usize,
}
