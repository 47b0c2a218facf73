//! SQLite data source implementation

use std::path::Path;

use arrow::datatypes::Field;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tracing::debug;
use tv_core::{DataSource, DataType, Metadata, Raw, Result, Value};

use crate::schema::parse_text;
use crate::sources::memory_source::{ColumnSpec, MemorySource};
use crate::DataError;

/// One SQLite table loaded into memory
#[derive(Debug, Clone)]
pub struct SqliteSource {
    data: MemorySource,
    table_name: String,
}

impl SqliteSource {
    /// Load every row of `table_name`
    pub fn open(path: &Path, table_name: &str) -> Result<Self, DataError> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

        let columns = Self::detect_columns(&conn, table_name)?;
        let query = format!("SELECT * FROM {}", quote_identifier(table_name));
        let mut stmt = conn.prepare(&query)?;
        let mut rows = stmt.query([])?;

        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(columns.len());
            for (col_idx, spec) in columns.iter().enumerate() {
                cells.push(convert(row.get_ref(col_idx)?, spec.data_type));
            }
            values.push(cells);
        }

        debug!("Loaded {} rows from SQLite table '{}'", values.len(), table_name);

        let data = MemorySource::new(columns, values)?
            .with_metadata("format", "sqlite")
            .with_metadata("path", path.display().to_string())
            .with_metadata("table", table_name.to_string());

        Ok(Self {
            data,
            table_name: table_name.to_string(),
        })
    }

    /// User tables in the database, by name
    pub fn list_tables(path: &Path) -> Result<Vec<String>, DataError> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Column names and declared types from the table definition
    fn detect_columns(conn: &Connection, table_name: &str) -> Result<Vec<ColumnSpec>, DataError> {
        let query = format!("PRAGMA table_info({})", quote_identifier(table_name));
        let mut stmt = conn.prepare(&query)?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnSpec::new(
                    row.get::<_, String>(1)?,
                    declared_type(&row.get::<_, String>(2)?),
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if columns.is_empty() {
            return Err(DataError::SchemaDetection(format!(
                "table '{}' does not exist or has no columns",
                table_name
            )));
        }
        Ok(columns)
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Semantic type for a declared column type, following SQLite's affinity names
fn declared_type(declared: &str) -> DataType {
    let declared = declared.to_uppercase();
    if declared.contains("BOOL") {
        DataType::Bool
    } else if declared.contains("DATETIME") || declared.contains("TIMESTAMP") {
        DataType::Timestamp
    } else if declared.contains("DATE") {
        DataType::Date
    } else if declared.contains("INT") {
        DataType::Int
    } else if declared.contains("REAL") || declared.contains("FLOA") || declared.contains("DOUB") {
        DataType::Float
    } else if declared.contains("DECIMAL") || declared.contains("NUMERIC") {
        DataType::Decimal
    } else if declared.contains("BLOB") {
        DataType::Binary
    } else {
        DataType::String
    }
}

/// Convert a stored value to the column's declared type.
///
/// SQLite does not enforce declared types, so a stored value that cannot
/// be read as the declared type keeps its own payload.
fn convert(value: ValueRef<'_>, data_type: DataType) -> Value {
    let raw = match value {
        ValueRef::Null => return Value::null(data_type),
        ValueRef::Integer(i) => Raw::Int(i),
        ValueRef::Real(f) => Raw::Float(f),
        ValueRef::Text(bytes) => Raw::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Raw::Binary(bytes.to_vec()),
    };
    if raw.natural_type() == data_type {
        return Value::new(raw, data_type);
    }

    let stored = Value::new(raw, data_type);
    parse_text(stored.formatted(), data_type).unwrap_or(stored)
}

impl DataSource for SqliteSource {
    fn row_count(&self) -> usize {
        self.data.row_count()
    }

    fn column_count(&self) -> usize {
        self.data.column_count()
    }

    fn column_name(&self, col: usize) -> Result<String> {
        self.data.column_name(col)
    }

    fn column_type(&self, col: usize) -> Result<DataType> {
        self.data.column_type(col)
    }

    fn cell(&self, row: usize, col: usize) -> Result<Value> {
        self.data.cell(row, col)
    }

    fn row(&self, row: usize) -> Result<Vec<Value>> {
        self.data.row(row)
    }

    fn metadata(&self) -> Metadata {
        self.data.metadata()
    }

    fn column_field(&self, col: usize) -> Result<Field> {
        self.data.column_field(col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_db() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE orders (
                id INTEGER PRIMARY KEY,
                item TEXT,
                price REAL,
                paid BOOLEAN,
                placed DATE,
                note
            );
            INSERT INTO orders VALUES (1, 'lamp', 19.5, 1, '2024-02-01', 'fragile');
            INSERT INTO orders VALUES (2, 'desk', 120, 0, NULL, 42);
            CREATE TABLE \"odd \"\"name\" (x INTEGER);",
        )
        .unwrap();
        (dir, path)
    }

    #[test]
    fn test_open_table() {
        let (_dir, path) = create_db();
        let source = SqliteSource::open(&path, "orders").unwrap();

        assert_eq!(source.row_count(), 2);
        assert_eq!(source.table_name(), "orders");
        assert_eq!(source.column_type(0).unwrap(), DataType::Int);
        assert_eq!(source.column_type(2).unwrap(), DataType::Float);
        assert_eq!(source.column_type(3).unwrap(), DataType::Bool);
        assert_eq!(source.column_type(4).unwrap(), DataType::Date);
        assert_eq!(source.column_type(5).unwrap(), DataType::String);

        assert_eq!(source.cell(1, 2).unwrap(), Value::float(120.0));
        assert_eq!(source.cell(0, 3).unwrap(), Value::bool(true));
        assert_eq!(source.cell(0, 4).unwrap().formatted(), "2024-02-01");
        assert!(source.cell(1, 4).unwrap().is_null());
        assert_eq!(source.cell(1, 5).unwrap(), Value::string("42"));
        assert_eq!(source.metadata()["table"], "orders");
    }

    #[test]
    fn test_list_tables_and_quoting() {
        let (_dir, path) = create_db();
        let tables = SqliteSource::list_tables(&path).unwrap();
        assert_eq!(tables, vec!["odd \"name".to_string(), "orders".to_string()]);

        let source = SqliteSource::open(&path, "odd \"name").unwrap();
        assert_eq!(source.row_count(), 0);
        assert_eq!(source.column_count(), 1);
    }

    #[test]
    fn test_missing_table() {
        let (_dir, path) = create_db();
        assert!(matches!(
            SqliteSource::open(&path, "nope"),
            Err(DataError::SchemaDetection(_))
        ));
    }

    #[test]
    fn test_declared_types() {
        assert_eq!(declared_type("bigint"), DataType::Int);
        assert_eq!(declared_type("VARCHAR(20)"), DataType::String);
        assert_eq!(declared_type("DOUBLE PRECISION"), DataType::Float);
        assert_eq!(declared_type("DECIMAL(10,2)"), DataType::Decimal);
        assert_eq!(declared_type("DATETIME"), DataType::Timestamp);
        assert_eq!(declared_type("BLOB"), DataType::Binary);
        assert_eq!(declared_type(""), DataType::String);
    }
}
