//! Core abstractions for the tabular view engine
//!
//! This crate provides the typed value model, the read-only data source
//! contract and the error taxonomy shared by the loaders and the view layer.

pub mod cancel;
pub mod error;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use cancel::CancelFlag;
pub use error::{check_column, check_row, Result, TableError};
pub use source::DataSource;
pub use types::{
    parse_date, parse_decimal, parse_timestamp, DataType, Decimal, Metadata, Raw, SortDirection,
    SortState, Value,
};
