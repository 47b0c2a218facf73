//! The read-only data source contract

use arrow::datatypes::Field;

use crate::error::{check_row, Result, TableError};
use crate::types::{DataType, Metadata, Value};

/// Read-only access to an immutable rectangular dataset.
///
/// Implementations must be safe for concurrent reads: one source may back
/// several views at once (for example an export running on a worker while
/// the view is re-rendered). Accessors report bad indices through
/// `InvalidRow`/`InvalidColumn` and never panic.
pub trait DataSource: Send + Sync {
    /// Total number of rows
    fn row_count(&self) -> usize;

    /// Total number of columns
    fn column_count(&self) -> usize;

    /// Name of the column at `col`
    fn column_name(&self, col: usize) -> Result<String>;

    /// Semantic type of the column at `col`
    fn column_type(&self, col: usize) -> Result<DataType>;

    /// Cell at (`row`, `col`)
    fn cell(&self, row: usize, col: usize) -> Result<Value>;

    /// All cells of `row`
    fn row(&self, row: usize) -> Result<Vec<Value>> {
        check_row(row, self.row_count())?;
        (0..self.column_count()).map(|col| self.cell(row, col)).collect()
    }

    /// Optional metadata; empty when the source has none
    fn metadata(&self) -> Metadata {
        Metadata::new()
    }

    /// Arrow field used when the column is rebuilt on export.
    ///
    /// Sources backed by Arrow data override this to keep their exact
    /// physical type (integer width, nested children, decimal scale).
    fn column_field(&self, col: usize) -> Result<Field> {
        let name = self.column_name(col)?;
        let data_type = self.column_type(col)?;
        Ok(Field::new(name, data_type.to_arrow(), true))
    }

    /// Every column name in source order
    fn column_names(&self) -> Result<Vec<String>> {
        (0..self.column_count()).map(|col| self.column_name(col)).collect()
    }

    /// Case-insensitive lookup of a column by name
    fn column_index(&self, name: &str) -> Result<usize> {
        let wanted = name.trim().to_lowercase();
        for col in 0..self.column_count() {
            if self.column_name(col)?.to_lowercase() == wanted {
                return Ok(col);
            }
        }
        Err(TableError::ColumnNotFound(name.to_string()))
    }
}
