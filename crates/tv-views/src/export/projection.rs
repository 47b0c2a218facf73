//! Rebuilding the visible part of a view as a new Arrow dataset

use std::sync::Arc;

use arrow::array::{
    new_null_array, ArrayRef, BinaryArray, BooleanArray, FixedSizeBinaryArray,
    LargeBinaryArray, LargeListArray, LargeStringArray, ListArray, PrimitiveArray, StringArray,
    StructArray,
};
use arrow::buffer::{NullBuffer, OffsetBuffer};
use arrow::compute::cast;
use arrow::datatypes::{
    ArrowPrimitiveType, ArrowTimestampType, DataType as ArrowType, Date32Type, Date64Type,
    Decimal128Type, DecimalType, Field, FieldRef, Fields, Float32Type, Float64Type, Int16Type,
    Int32Type, Int64Type, Int8Type, Schema, TimeUnit, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType, UInt16Type, UInt32Type,
    UInt64Type, UInt8Type,
};
use arrow::record_batch::RecordBatch;
use tracing::{debug, warn};
use tv_core::{CancelFlag, Raw, Result, TableError, Value};
use tv_data::ArrowSource;

use super::ExportMode;
use crate::model::{TableModel, ViewSnapshot};

/// A new, independent dataset holding exactly the visible rows and columns
/// of a view, in view order, with the source's declared column types.
#[derive(Debug, Clone)]
pub struct Projection {
    batch: RecordBatch,
}

impl Projection {
    /// Project the current state of `model`
    pub fn from_model(model: &TableModel, mode: ExportMode, cancel: Option<&CancelFlag>) -> Result<Self> {
        Self::build(&model.snapshot(), mode, cancel)
    }

    /// Project a view snapshot.
    ///
    /// Fails with `EmptyData` when no rows or no columns are visible and
    /// with `Cancelled` as soon as `cancel` is raised.
    pub fn build(snapshot: &ViewSnapshot, mode: ExportMode, cancel: Option<&CancelFlag>) -> Result<Self> {
        if snapshot.rows.is_empty() {
            return Err(TableError::EmptyData("no rows are visible".to_string()));
        }
        if snapshot.columns.is_empty() {
            return Err(TableError::EmptyData("no columns are visible".to_string()));
        }

        let source = &snapshot.source;
        let mut cells: Vec<Vec<Value>> = snapshot
            .columns
            .iter()
            .map(|_| Vec::with_capacity(snapshot.rows.len()))
            .collect();
        for &row in &snapshot.rows {
            if let Some(cancel) = cancel {
                cancel.check()?;
            }
            for (values, &col) in cells.iter_mut().zip(&snapshot.columns) {
                values.push(source.cell(row, col)?);
            }
        }

        let mut fields = Vec::with_capacity(snapshot.columns.len());
        let mut arrays = Vec::with_capacity(snapshot.columns.len());
        for (values, &col) in cells.iter().zip(&snapshot.columns) {
            let field = nullable_field(&source.column_field(col)?);
            let column = ColumnContext {
                name: field.name(),
                mode,
            };
            arrays.push(build_array(field.data_type(), values, &column)?);
            fields.push(field);
        }

        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
            .map_err(|e| TableError::TypeMismatch(e.to_string()))?;
        debug!(
            "Projected {} rows x {} columns",
            batch.num_rows(),
            batch.num_columns()
        );
        Ok(Self { batch })
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    /// Reopen the projection as a data source of its own
    pub fn into_source(self) -> Result<ArrowSource> {
        ArrowSource::new(self.batch).map_err(|e| TableError::ExportFailed(e.to_string()))
    }
}

/// The output may hold nulls anywhere the lenient policy substitutes them
fn nullable_field(field: &Field) -> Field {
    field
        .clone()
        .with_nullable(true)
        .with_data_type(nullable_type(field.data_type()))
}

fn nullable_type(data_type: &ArrowType) -> ArrowType {
    match data_type {
        ArrowType::Struct(fields) => ArrowType::Struct(
            fields
                .iter()
                .map(|f| nullable_field(f))
                .collect::<Vec<_>>()
                .into(),
        ),
        ArrowType::List(item) => ArrowType::List(Arc::new(nullable_field(item))),
        ArrowType::LargeList(item) => ArrowType::LargeList(Arc::new(nullable_field(item))),
        other => other.clone(),
    }
}

struct ColumnContext<'a> {
    name: &'a str,
    mode: ExportMode,
}

impl ColumnContext<'_> {
    /// A non-null cell that cannot be stored in `data_type`
    fn mismatch<T>(&self, value: &Value, row: usize, data_type: &ArrowType) -> Result<Option<T>> {
        let message = format!(
            "column '{}' row {}: {} value {:?} cannot be stored as {}",
            self.name,
            row,
            value.data_type(),
            value.formatted(),
            data_type
        );
        match self.mode {
            ExportMode::Strict => Err(TableError::TypeMismatch(message)),
            ExportMode::Lenient => {
                warn!("{}, exporting null", message);
                Ok(None)
            }
        }
    }

    /// A column type the projection cannot rebuild
    fn unsupported(&self, data_type: &ArrowType, len: usize) -> Result<ArrayRef> {
        let message = format!("column '{}' has unsupported type {}", self.name, data_type);
        match self.mode {
            ExportMode::Strict => Err(TableError::TypeMismatch(message)),
            ExportMode::Lenient => {
                warn!("{}, exporting nulls", message);
                Ok(new_null_array(data_type, len))
            }
        }
    }
}

/// Convert each non-null cell with `convert`; cells it rejects go through
/// the mismatch policy
fn convert_all<T>(
    values: &[Value],
    column: &ColumnContext<'_>,
    data_type: &ArrowType,
    convert: impl Fn(&Value) -> Option<T>,
) -> Result<Vec<Option<T>>> {
    let mut out = Vec::with_capacity(values.len());
    for (row, value) in values.iter().enumerate() {
        if value.is_null() {
            out.push(None);
            continue;
        }
        match convert(value) {
            Some(converted) => out.push(Some(converted)),
            None => out.push(column.mismatch(value, row, data_type)?),
        }
    }
    Ok(out)
}

fn primitive<T: ArrowPrimitiveType>(
    values: &[Value],
    column: &ColumnContext<'_>,
    data_type: &ArrowType,
    convert: impl Fn(&Value) -> Option<T::Native>,
) -> Result<ArrayRef> {
    let converted = convert_all(values, column, data_type, convert)?;
    let array = PrimitiveArray::<T>::from_iter(converted).with_data_type(data_type.clone());
    Ok(Arc::new(array))
}

fn integer<T>(values: &[Value], column: &ColumnContext<'_>, data_type: &ArrowType) -> Result<ArrayRef>
where
    T: ArrowPrimitiveType,
    T::Native: TryFrom<i128>,
{
    primitive::<T>(values, column, data_type, |v| {
        v.as_i128().and_then(|i| T::Native::try_from(i).ok())
    })
}

fn timestamp<T: ArrowTimestampType>(
    values: &[Value],
    column: &ColumnContext<'_>,
    data_type: &ArrowType,
) -> Result<ArrayRef> {
    primitive::<T>(values, column, data_type, |v| T::make_value(v.as_timestamp()?))
}

/// Build one output column of `data_type` from its cells
fn build_array(data_type: &ArrowType, values: &[Value], column: &ColumnContext<'_>) -> Result<ArrayRef> {
    let array: ArrayRef = match data_type {
        ArrowType::Null => new_null_array(data_type, values.len()),
        ArrowType::Utf8 => Arc::new(StringArray::from_iter(text_cells(values))),
        ArrowType::LargeUtf8 => Arc::new(LargeStringArray::from_iter(text_cells(values))),
        ArrowType::Int8 => integer::<Int8Type>(values, column, data_type)?,
        ArrowType::Int16 => integer::<Int16Type>(values, column, data_type)?,
        ArrowType::Int32 => integer::<Int32Type>(values, column, data_type)?,
        ArrowType::Int64 => integer::<Int64Type>(values, column, data_type)?,
        ArrowType::UInt8 => integer::<UInt8Type>(values, column, data_type)?,
        ArrowType::UInt16 => integer::<UInt16Type>(values, column, data_type)?,
        ArrowType::UInt32 => integer::<UInt32Type>(values, column, data_type)?,
        ArrowType::UInt64 => integer::<UInt64Type>(values, column, data_type)?,
        ArrowType::Float16 => {
            let wide = primitive::<Float64Type>(values, column, &ArrowType::Float64, Value::as_f64)?;
            cast(&wide, data_type).map_err(|e| TableError::TypeMismatch(e.to_string()))?
        }
        ArrowType::Float32 => primitive::<Float32Type>(values, column, data_type, |v| v.as_f64().map(|f| f as f32))?,
        ArrowType::Float64 => primitive::<Float64Type>(values, column, data_type, Value::as_f64)?,
        ArrowType::Boolean => Arc::new(BooleanArray::from(convert_all(
            values,
            column,
            data_type,
            Value::as_bool,
        )?)),
        ArrowType::Date32 => primitive::<Date32Type>(values, column, data_type, |v| {
            Some(Date32Type::from_naive_date(v.as_date()?))
        })?,
        ArrowType::Date64 => primitive::<Date64Type>(values, column, data_type, |v| {
            Some(Date64Type::from_naive_date(v.as_date()?))
        })?,
        ArrowType::Timestamp(unit, _) => match unit {
            TimeUnit::Second => timestamp::<TimestampSecondType>(values, column, data_type)?,
            TimeUnit::Millisecond => timestamp::<TimestampMillisecondType>(values, column, data_type)?,
            TimeUnit::Microsecond => timestamp::<TimestampMicrosecondType>(values, column, data_type)?,
            TimeUnit::Nanosecond => timestamp::<TimestampNanosecondType>(values, column, data_type)?,
        },
        ArrowType::Decimal128(precision, scale) => primitive::<Decimal128Type>(values, column, data_type, |v| {
            let mantissa = v.as_decimal(*scale)?;
            Decimal128Type::validate_decimal_precision(mantissa, *precision)
                .ok()
                .map(|_| mantissa)
        })?,
        ArrowType::Binary => Arc::new(BinaryArray::from_iter(convert_all(
            values,
            column,
            data_type,
            |v| v.as_bytes().map(<[u8]>::to_vec),
        )?)),
        ArrowType::LargeBinary => Arc::new(LargeBinaryArray::from_iter(convert_all(
            values,
            column,
            data_type,
            |v| v.as_bytes().map(<[u8]>::to_vec),
        )?)),
        ArrowType::FixedSizeBinary(size) => {
            let width = usize::try_from(*size).unwrap_or_default();
            let cells = convert_all(values, column, data_type, |v| {
                v.as_bytes().filter(|bytes| bytes.len() == width).map(<[u8]>::to_vec)
            })?;
            let array = FixedSizeBinaryArray::try_from_sparse_iter_with_size(cells.into_iter(), *size)
                .map_err(|e| TableError::TypeMismatch(e.to_string()))?;
            Arc::new(array)
        }
        ArrowType::Struct(fields) if fields.is_empty() => {
            // A field-less struct holds nothing, so every value is a mismatch
            convert_all(values, column, data_type, |_| None::<()>)?;
            new_null_array(data_type, values.len())
        }
        ArrowType::Struct(fields) => build_struct(fields, data_type, values, column)?,
        ArrowType::List(item) => {
            let (offsets, child, nulls) = build_list_parts(item, data_type, values, column)?;
            let array = ListArray::try_new(item.clone(), OffsetBuffer::<i32>::from_lengths(offsets), child, nulls)
                .map_err(|e| TableError::TypeMismatch(e.to_string()))?;
            Arc::new(array)
        }
        ArrowType::LargeList(item) => {
            let (offsets, child, nulls) = build_list_parts(item, data_type, values, column)?;
            let array =
                LargeListArray::try_new(item.clone(), OffsetBuffer::<i64>::from_lengths(offsets), child, nulls)
                    .map_err(|e| TableError::TypeMismatch(e.to_string()))?;
            Arc::new(array)
        }
        other => column.unsupported(other, values.len())?,
    };
    Ok(array)
}

/// Text columns take any payload as its display text
fn text_cells(values: &[Value]) -> impl Iterator<Item = Option<&str>> + '_ {
    values
        .iter()
        .map(|v| if v.is_null() { None } else { Some(v.formatted()) })
}

fn build_struct(
    fields: &Fields,
    data_type: &ArrowType,
    values: &[Value],
    column: &ColumnContext<'_>,
) -> Result<ArrayRef> {
    let mut valid = Vec::with_capacity(values.len());
    let mut children: Vec<Vec<Value>> = fields.iter().map(|_| Vec::with_capacity(values.len())).collect();

    for (row, value) in values.iter().enumerate() {
        let members = match value.raw() {
            None => None,
            Some(Raw::Struct(members)) => Some(members),
            Some(_) => {
                column.mismatch::<()>(value, row, data_type)?;
                None
            }
        };
        valid.push(members.is_some());

        for (name, member) in members.into_iter().flatten() {
            if !member.is_null() && fields.find(name).is_none() {
                let member_column = ColumnContext {
                    name: &format!("{}.{}", column.name, name),
                    mode: column.mode,
                };
                member_column.mismatch::<()>(member, row, data_type)?;
            }
        }

        for (field, child_values) in fields.iter().zip(children.iter_mut()) {
            let child_type = tv_core::DataType::from_arrow(field.data_type());
            let child = members
                .and_then(|members| members.iter().find(|(name, _)| name == field.name()))
                .map(|(_, value)| value.clone())
                .unwrap_or_else(|| Value::null(child_type));
            child_values.push(child);
        }
    }

    let mut arrays = Vec::with_capacity(fields.len());
    for (field, child_values) in fields.iter().zip(&children) {
        let name = format!("{}.{}", column.name, field.name());
        let child_column = ColumnContext {
            name: &name,
            mode: column.mode,
        };
        arrays.push(build_array(field.data_type(), child_values, &child_column)?);
    }

    let array = StructArray::try_new(fields.clone(), arrays, Some(NullBuffer::from(valid)))
        .map_err(|e| TableError::TypeMismatch(e.to_string()))?;
    Ok(Arc::new(array))
}

/// Lengths, flattened child array and validity of a list column
fn build_list_parts(
    item: &FieldRef,
    data_type: &ArrowType,
    values: &[Value],
    column: &ColumnContext<'_>,
) -> Result<(Vec<usize>, ArrayRef, Option<NullBuffer>)> {
    let mut lengths = Vec::with_capacity(values.len());
    let mut valid = Vec::with_capacity(values.len());
    let mut flat = Vec::new();

    for (row, value) in values.iter().enumerate() {
        match value.raw() {
            Some(Raw::List(items)) => {
                lengths.push(items.len());
                valid.push(true);
                flat.extend(items.iter().cloned());
            }
            None => {
                lengths.push(0);
                valid.push(false);
            }
            Some(_) => {
                column.mismatch::<()>(value, row, data_type)?;
                lengths.push(0);
                valid.push(false);
            }
        }
    }

    let name = format!("{}[]", column.name);
    let item_column = ColumnContext {
        name: &name,
        mode: column.mode,
    };
    let child = build_array(item.data_type(), &flat, &item_column)?;
    Ok((lengths, child, Some(NullBuffer::from(valid))))
}
