//! File configuration for data loading

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tv_core::DataType;

use super::null_handling::NullConfig;
use crate::DataError;

/// Supported input formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    Csv,
    Json,
    Parquet,
    Sqlite,
}

impl FileType {
    /// Determine the format from the file extension
    pub fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => Some(FileType::Csv),
            "json" => Some(FileType::Json),
            "parquet" => Some(FileType::Parquet),
            "db" | "sqlite" | "sqlite3" => Some(FileType::Sqlite),
            _ => None,
        }
    }
}

/// Configuration for loading a single file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    /// Path to the file
    pub path: PathBuf,

    /// File type
    pub file_type: FileType,

    /// Field delimiter for delimited text; detected from the first line when unset
    pub delimiter: Option<char>,

    /// Whether the first record holds column names
    pub has_headers: bool,

    /// Trim surrounding whitespace from every field
    pub trim_whitespace: bool,

    /// Null handling configuration
    pub null_config: NullConfig,

    /// Rows sampled for type inference
    pub sample_size: usize,

    /// Column type overrides, keyed by column name
    pub column_types: HashMap<String, DataType>,

    /// Table to open in a SQLite database; the first table when unset
    pub table: Option<String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            file_type: FileType::Csv,
            delimiter: None,
            has_headers: true,
            trim_whitespace: true,
            null_config: NullConfig::default(),
            sample_size: 1000,
            column_types: HashMap::new(),
            table: None,
        }
    }
}

impl FileConfig {
    /// Create a new file configuration
    pub fn new(path: impl Into<PathBuf>, file_type: FileType) -> Self {
        Self {
            path: path.into(),
            file_type,
            ..Self::default()
        }
    }

    /// Configuration with the file type detected from the extension
    pub fn for_path(path: impl Into<PathBuf>) -> Result<Self, DataError> {
        let path = path.into();
        let file_type = FileType::detect(&path)
            .ok_or_else(|| DataError::UnsupportedFormat(path.display().to_string()))?;
        Ok(Self::new(path, file_type))
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_column_type(mut self, column: impl Into<String>, data_type: DataType) -> Self {
        self.column_types.insert(column.into(), data_type);
        self
    }

    /// Get the file name
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string()
    }

    /// Type override for a column, if any
    pub fn column_type_override(&self, column: &str) -> Option<DataType> {
        self.column_types.get(column).copied()
    }
}
