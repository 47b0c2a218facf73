pub mod arrow_source;
pub mod csv_source;
pub mod memory_source;
pub mod sqlite_source;

pub use arrow_source::ArrowSource;
pub use csv_source::CsvSource;
pub use memory_source::{ColumnSpec, MemorySource};
pub use sqlite_source::SqliteSource;
