//! The view layer of the tabular view engine
//!
//! A `TableModel` narrows an immutable data source with a query or
//! programmatic filter, orders it by one column and limits it to a chosen
//! set of columns. The `export` module turns the visible part back into a
//! standalone dataset and writes it out.

pub mod export;
pub mod filter;
pub mod model;
pub mod sort;

pub use export::{
    export_in_background, export_to_path, ExportFormat, ExportMode, ExportOptions, ExportSummary,
    Projection,
};
pub use filter::{CompOp, CompositeFilter, Expression, Filter, LogicOp, Query, QueryParser};
pub use model::{TableModel, ViewSnapshot};
