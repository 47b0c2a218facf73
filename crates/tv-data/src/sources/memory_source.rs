//! In-memory data source over pre-built rows

use std::fs;
use std::path::Path;
use std::sync::Arc;

use arrow::datatypes::{DataType as ArrowType, Field, Fields};
use indexmap::IndexMap;
use tracing::debug;
use tv_core::{check_column, check_row, DataSource, DataType, Metadata, Raw, Result, Value};

use crate::DataError;

/// Name, semantic type and optional Arrow field of one column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: DataType,
    /// Exact Arrow field for export; derived from the data when absent
    pub field: Option<Field>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            field: None,
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.field = Some(field);
        self
    }
}

/// Rows held fully in memory
#[derive(Debug, Clone)]
pub struct MemorySource {
    columns: Vec<ColumnSpec>,
    rows: Vec<Vec<Value>>,
    metadata: Metadata,
}

impl MemorySource {
    /// Create a source from column specs and rows.
    ///
    /// Every row must have exactly one cell per column. Struct and list
    /// columns without an explicit field get one merged from all their
    /// non-null cells.
    pub fn new(columns: Vec<ColumnSpec>, rows: Vec<Vec<Value>>) -> Result<Self, DataError> {
        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(DataError::RaggedRow {
                    row: row_idx,
                    expected: columns.len(),
                    found: row.len(),
                });
            }
        }

        let columns = columns
            .into_iter()
            .enumerate()
            .map(|(col_idx, spec)| {
                if spec.field.is_some() || !matches!(spec.data_type, DataType::Struct | DataType::List) {
                    return spec;
                }
                let field = field_for_values(&spec.name, spec.data_type, rows.iter().map(|row| &row[col_idx]));
                ColumnSpec { field, ..spec }
            })
            .collect();

        Ok(Self {
            columns,
            rows,
            metadata: Metadata::new(),
        })
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Build a source from JSON records (objects).
    ///
    /// Columns appear in first-seen key order. A column whose values mix
    /// integers and floats becomes Float; any other mix becomes String.
    /// Keys missing from a record load as null.
    pub fn from_json_records(records: &[serde_json::Value]) -> Result<Self, DataError> {
        if records.is_empty() {
            return Err(DataError::Empty("JSON input has no records".to_string()));
        }

        let mut objects = Vec::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            match record {
                serde_json::Value::Object(map) => objects.push(map),
                other => {
                    return Err(DataError::SchemaDetection(format!(
                        "record {} is not an object: {}",
                        idx, other
                    )))
                }
            }
        }

        // Column order and merged types
        let mut types: IndexMap<String, Option<DataType>> = IndexMap::new();
        for object in &objects {
            for (key, json) in object.iter() {
                let value_type = (!json.is_null()).then(|| value_from_json(json).data_type());
                let entry = types.entry(key.clone()).or_insert(None);
                *entry = merge_types(*entry, value_type);
            }
        }

        let columns: Vec<ColumnSpec> = types
            .iter()
            .map(|(name, data_type)| ColumnSpec::new(name.clone(), data_type.unwrap_or(DataType::String)))
            .collect();

        let rows = objects
            .iter()
            .map(|object| {
                columns
                    .iter()
                    .map(|spec| match object.get(&spec.name) {
                        Some(json) if !json.is_null() => coerce(value_from_json(json), spec.data_type),
                        _ => Value::null(spec.data_type),
                    })
                    .collect()
            })
            .collect();

        debug!("Loaded {} JSON records into {} columns", objects.len(), columns.len());
        Self::new(columns, rows)
    }

    /// Parse a JSON document holding an array of objects or a single object
    pub fn from_json_str(text: &str) -> Result<Self, DataError> {
        match serde_json::from_str::<serde_json::Value>(text)? {
            serde_json::Value::Array(records) => Self::from_json_records(&records),
            object @ serde_json::Value::Object(_) => Self::from_json_records(&[object]),
            other => Err(DataError::SchemaDetection(format!(
                "expected an array of objects or an object, found {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn from_json_path(path: &Path) -> Result<Self, DataError> {
        let text = fs::read_to_string(path)?;
        Ok(Self::from_json_str(&text)?
            .with_metadata("format", "json")
            .with_metadata("path", path.display().to_string()))
    }
}

impl DataSource for MemorySource {
    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, col: usize) -> Result<String> {
        check_column(col, self.columns.len())?;
        Ok(self.columns[col].name.clone())
    }

    fn column_type(&self, col: usize) -> Result<DataType> {
        check_column(col, self.columns.len())?;
        Ok(self.columns[col].data_type)
    }

    fn cell(&self, row: usize, col: usize) -> Result<Value> {
        check_row(row, self.rows.len())?;
        check_column(col, self.columns.len())?;
        Ok(self.rows[row][col].clone())
    }

    fn row(&self, row: usize) -> Result<Vec<Value>> {
        check_row(row, self.rows.len())?;
        Ok(self.rows[row].clone())
    }

    fn metadata(&self) -> Metadata {
        self.metadata.clone()
    }

    fn column_field(&self, col: usize) -> Result<Field> {
        check_column(col, self.columns.len())?;
        let spec = &self.columns[col];
        Ok(match &spec.field {
            Some(field) => field.clone().with_name(spec.name.clone()),
            None => Field::new(spec.name.clone(), spec.data_type.to_arrow(), true),
        })
    }
}

/// Convert a JSON value to a cell
pub fn value_from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::null(DataType::String),
        serde_json::Value::Bool(v) => Value::bool(*v),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(v) => Value::int(v),
            None => Value::float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::string(s.clone()),
        serde_json::Value::Array(items) => Value::list(items.iter().map(value_from_json).collect()),
        serde_json::Value::Object(map) => Value::structure(
            map.iter()
                .map(|(key, value)| (key.clone(), value_from_json(value)))
                .collect(),
        ),
    }
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

fn merge_types(current: Option<DataType>, next: Option<DataType>) -> Option<DataType> {
    match (current, next) {
        (None, next) => next,
        (current, None) => current,
        (Some(a), Some(b)) if a == b => Some(a),
        (Some(DataType::Int), Some(DataType::Float)) | (Some(DataType::Float), Some(DataType::Int)) => {
            Some(DataType::Float)
        }
        _ => Some(DataType::String),
    }
}

fn coerce(value: Value, data_type: DataType) -> Value {
    if value.data_type() == data_type {
        return value;
    }
    match (value.raw(), data_type) {
        (Some(Raw::Int(v)), DataType::Float) => Value::float(*v as f64),
        _ => Value::new(Raw::String(value.formatted().to_string()), data_type),
    }
}

/// Arrow field covering every `data_type` cell in `values`.
///
/// Struct members are unioned in first-seen order, list items merged, and
/// members or items that are null everywhere become Utf8. Cells of another
/// kind are ignored. `None` when no cell has the column's kind.
pub fn field_for_values<'a>(
    name: &str,
    data_type: DataType,
    values: impl IntoIterator<Item = &'a Value>,
) -> Option<Field> {
    values
        .into_iter()
        .filter(|value| value.raw().map(Raw::natural_type) == Some(data_type))
        .map(arrow_type_for_value)
        .reduce(merge_arrow_types)
        .map(|merged| Field::new(name, settle(merged), true))
}

/// Type of one cell; null cells are `Null` so they merge into anything
fn arrow_type_for_value(value: &Value) -> ArrowType {
    match value.raw() {
        None => ArrowType::Null,
        Some(Raw::Struct(children)) => ArrowType::Struct(Fields::from(
            children
                .iter()
                .map(|(child, child_value)| Field::new(child, arrow_type_for_value(child_value), true))
                .collect::<Vec<_>>(),
        )),
        Some(Raw::List(items)) => {
            let item_type = items
                .iter()
                .map(arrow_type_for_value)
                .fold(ArrowType::Null, merge_arrow_types);
            ArrowType::List(Arc::new(Field::new("item", item_type, true)))
        }
        Some(_) => value.data_type().to_arrow(),
    }
}

fn merge_arrow_types(left: ArrowType, right: ArrowType) -> ArrowType {
    match (left, right) {
        (left, right) if left == right => left,
        (ArrowType::Null, other) | (other, ArrowType::Null) => other,
        (ArrowType::Int64, ArrowType::Float64) | (ArrowType::Float64, ArrowType::Int64) => ArrowType::Float64,
        (ArrowType::Struct(left), ArrowType::Struct(right)) => {
            let mut merged: Vec<Field> = left.iter().map(|field| field.as_ref().clone()).collect();
            for field in right.iter() {
                match merged.iter_mut().find(|existing| existing.name() == field.name()) {
                    Some(existing) => {
                        let data_type = merge_arrow_types(existing.data_type().clone(), field.data_type().clone());
                        *existing = Field::new(field.name(), data_type, true);
                    }
                    None => merged.push(field.as_ref().clone()),
                }
            }
            ArrowType::Struct(Fields::from(merged))
        }
        (ArrowType::List(left), ArrowType::List(right)) => {
            let item_type = merge_arrow_types(left.data_type().clone(), right.data_type().clone());
            ArrowType::List(Arc::new(Field::new("item", item_type, true)))
        }
        // Text holds any payload
        _ => ArrowType::Utf8,
    }
}

/// Replace types nothing was learned about with Utf8
fn settle(data_type: ArrowType) -> ArrowType {
    match data_type {
        ArrowType::Null => ArrowType::Utf8,
        ArrowType::Struct(fields) => ArrowType::Struct(Fields::from(
            fields
                .iter()
                .map(|field| Field::new(field.name(), settle(field.data_type().clone()), true))
                .collect::<Vec<_>>(),
        )),
        ArrowType::List(item) => ArrowType::List(Arc::new(Field::new("item", settle(item.data_type().clone()), true))),
        other => other,
    }
}
