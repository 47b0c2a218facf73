//! Open any supported file as a shared data source

use std::sync::Arc;

use tracing::info;
use tv_core::DataSource;

use crate::config::{FileConfig, FileType};
use crate::sources::{ArrowSource, CsvSource, MemorySource, SqliteSource};
use crate::DataError;

/// Load the file described by `config`.
///
/// SQLite databases open `config.table`, or their first table by name
/// when none is configured.
pub fn load(config: &FileConfig) -> Result<Arc<dyn DataSource>, DataError> {
    let path = config.path.as_path();
    info!("Loading {} as {:?}", path.display(), config.file_type);

    let source: Arc<dyn DataSource> = match config.file_type {
        FileType::Csv => Arc::new(CsvSource::open(config)?),
        FileType::Json => Arc::new(MemorySource::from_json_path(path)?),
        FileType::Parquet => Arc::new(ArrowSource::from_parquet(path)?),
        FileType::Sqlite => {
            let table = match &config.table {
                Some(table) => table.clone(),
                None => SqliteSource::list_tables(path)?
                    .into_iter()
                    .next()
                    .ok_or_else(|| DataError::Empty(format!("{} has no tables", path.display())))?,
            };
            Arc::new(SqliteSource::open(path, &table)?)
        }
    };

    info!(
        "Loaded {}: {} rows x {} columns",
        config.file_name(),
        source.row_count(),
        source.column_count()
    );
    Ok(source)
}
