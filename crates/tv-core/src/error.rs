//! Error taxonomy shared by every layer of the view engine

use thiserror::Error;

/// Errors raised by data sources, the table model, filters and export
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("invalid column index {index} (column count {count})")]
    InvalidColumn { index: usize, count: usize },

    #[error("invalid row index {index} (row count {count})")]
    InvalidRow { index: usize, count: usize },

    #[error("invalid filter expression: {0}")]
    InvalidFilter(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("data source is missing")]
    NoDataSource,

    #[error("data is empty: {0}")]
    EmptyData(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("invalid sort column {index} (column count {count})")]
    InvalidSortColumn { index: usize, count: usize },

    #[error("export failed: {0}")]
    ExportFailed(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// Result alias used across the view engine
pub type Result<T, E = TableError> = std::result::Result<T, E>;

/// Fail with `InvalidRow` unless `index < count`
pub fn check_row(index: usize, count: usize) -> Result<()> {
    if index < count {
        Ok(())
    } else {
        Err(TableError::InvalidRow { index, count })
    }
}

/// Fail with `InvalidColumn` unless `index < count`
pub fn check_column(index: usize, count: usize) -> Result<()> {
    if index < count {
        Ok(())
    } else {
        Err(TableError::InvalidColumn { index, count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_checks() {
        assert!(check_row(0, 1).is_ok());
        assert_eq!(check_row(1, 1), Err(TableError::InvalidRow { index: 1, count: 1 }));
        assert_eq!(
            check_column(3, 2),
            Err(TableError::InvalidColumn { index: 3, count: 2 })
        );
    }

    #[test]
    fn test_messages() {
        let err = TableError::InvalidFilter("unknown column: bogus".to_string());
        assert_eq!(err.to_string(), "invalid filter expression: unknown column: bogus");
    }
}
