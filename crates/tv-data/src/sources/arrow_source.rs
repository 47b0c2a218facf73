//! Data source over a single Arrow record batch

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::{cast, concat_batches};
use arrow::datatypes::{
    DataType as ArrowType, Date32Type, Date64Type, Decimal128Type, Field, Float16Type, Float32Type,
    Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, Schema, SchemaRef, TimeUnit,
    TimestampMicrosecondType, TimestampMillisecondType, TimestampNanosecondType,
    TimestampSecondType, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::debug;
use tv_core::{check_column, check_row, DataSource, DataType, Decimal, Metadata, Raw, Result, Value};

use crate::DataError;

/// Columnar data held as one Arrow record batch.
///
/// Dictionary-encoded columns are decoded when the source is built, so
/// every column reads and exports as its value type.
#[derive(Debug, Clone)]
pub struct ArrowSource {
    batch: RecordBatch,
    types: Vec<DataType>,
    metadata: Metadata,
}

impl ArrowSource {
    pub fn new(batch: RecordBatch) -> Result<Self, DataError> {
        let batch = decode_dictionaries(batch)?;
        let types = batch
            .schema()
            .fields()
            .iter()
            .map(|field| DataType::from_arrow(field.data_type()))
            .collect();

        Ok(Self {
            batch,
            types,
            metadata: Metadata::new(),
        })
    }

    /// Concatenate batches that share `schema` into one source
    pub fn from_batches(schema: SchemaRef, batches: &[RecordBatch]) -> Result<Self, DataError> {
        let batch = concat_batches(&schema, batches)?;
        Self::new(batch)
    }

    /// Read a whole Parquet file
    pub fn from_parquet(path: &Path) -> Result<Self, DataError> {
        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let schema = builder.schema().clone();
        let reader = builder.build()?;

        let batches = reader.collect::<Result<Vec<_>, _>>()?;
        debug!("Read {} record batches from {}", batches.len(), path.display());

        Ok(Self::from_batches(schema, &batches)?
            .with_metadata("format", "parquet")
            .with_metadata("path", path.display().to_string()))
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        self.with_metadata("name", name.into())
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The underlying record batch
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }
}

fn decode_dictionaries(batch: RecordBatch) -> Result<RecordBatch, DataError> {
    let schema = batch.schema();
    if !schema
        .fields()
        .iter()
        .any(|field| matches!(field.data_type(), ArrowType::Dictionary(_, _)))
    {
        return Ok(batch);
    }

    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        match field.data_type() {
            ArrowType::Dictionary(_, value_type) => {
                columns.push(cast(column, value_type)?);
                fields.push(field.as_ref().clone().with_data_type(value_type.as_ref().clone()));
            }
            _ => {
                columns.push(column.clone());
                fields.push(field.as_ref().clone());
            }
        }
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Read one element of an Arrow array as a cell.
///
/// Types without a semantic counterpart are read as their display text.
pub fn value_at(array: &dyn Array, row: usize) -> Value {
    let data_type = DataType::from_arrow(array.data_type());
    if array.is_null(row) {
        return Value::null(data_type);
    }

    let raw = match array.data_type() {
        ArrowType::Utf8 => Raw::String(array.as_string::<i32>().value(row).to_string()),
        ArrowType::LargeUtf8 => Raw::String(array.as_string::<i64>().value(row).to_string()),
        ArrowType::Int8 => Raw::Int(array.as_primitive::<Int8Type>().value(row) as i64),
        ArrowType::Int16 => Raw::Int(array.as_primitive::<Int16Type>().value(row) as i64),
        ArrowType::Int32 => Raw::Int(array.as_primitive::<Int32Type>().value(row) as i64),
        ArrowType::Int64 => Raw::Int(array.as_primitive::<Int64Type>().value(row)),
        ArrowType::UInt8 => Raw::Int(array.as_primitive::<UInt8Type>().value(row) as i64),
        ArrowType::UInt16 => Raw::Int(array.as_primitive::<UInt16Type>().value(row) as i64),
        ArrowType::UInt32 => Raw::Int(array.as_primitive::<UInt32Type>().value(row) as i64),
        ArrowType::UInt64 => {
            let v = array.as_primitive::<UInt64Type>().value(row);
            match i64::try_from(v) {
                Ok(v) => Raw::Int(v),
                // Beyond i64: keep the exact value
                Err(_) => Raw::Decimal(Decimal::new(v as i128, 20, 0)),
            }
        }
        ArrowType::Float16 => Raw::Float(array.as_primitive::<Float16Type>().value(row).to_f64()),
        ArrowType::Float32 => Raw::Float(array.as_primitive::<Float32Type>().value(row) as f64),
        ArrowType::Float64 => Raw::Float(array.as_primitive::<Float64Type>().value(row)),
        ArrowType::Boolean => Raw::Bool(array.as_boolean().value(row)),
        ArrowType::Date32 => match array.as_primitive::<Date32Type>().value_as_date(row) {
            Some(date) => Raw::Date(date),
            None => return Value::null(data_type),
        },
        ArrowType::Date64 => match array.as_primitive::<Date64Type>().value_as_date(row) {
            Some(date) => Raw::Date(date),
            None => return Value::null(data_type),
        },
        ArrowType::Timestamp(unit, _) => {
            let ts = match unit {
                TimeUnit::Second => array.as_primitive::<TimestampSecondType>().value_as_datetime(row),
                TimeUnit::Millisecond => array
                    .as_primitive::<TimestampMillisecondType>()
                    .value_as_datetime(row),
                TimeUnit::Microsecond => array
                    .as_primitive::<TimestampMicrosecondType>()
                    .value_as_datetime(row),
                TimeUnit::Nanosecond => array
                    .as_primitive::<TimestampNanosecondType>()
                    .value_as_datetime(row),
            };
            match ts {
                Some(ts) => Raw::Timestamp(ts),
                None => return Value::null(data_type),
            }
        }
        ArrowType::Binary => Raw::Binary(array.as_binary::<i32>().value(row).to_vec()),
        ArrowType::LargeBinary => Raw::Binary(array.as_binary::<i64>().value(row).to_vec()),
        ArrowType::FixedSizeBinary(_) => Raw::Binary(array.as_fixed_size_binary().value(row).to_vec()),
        ArrowType::Decimal128(precision, scale) => Raw::Decimal(Decimal::new(
            array.as_primitive::<Decimal128Type>().value(row),
            *precision,
            *scale,
        )),
        ArrowType::Struct(fields) => {
            let structure = array.as_struct();
            Raw::Struct(
                fields
                    .iter()
                    .zip(structure.columns())
                    .map(|(field, child)| (field.name().clone(), value_at(child.as_ref(), row)))
                    .collect(),
            )
        }
        ArrowType::List(_) => list_items(array.as_list::<i32>().value(row)),
        ArrowType::LargeList(_) => list_items(array.as_list::<i64>().value(row)),
        _ => Raw::String(array_value_to_string(array, row).unwrap_or_default()),
    };

    Value::new(raw, data_type)
}

fn list_items(items: ArrayRef) -> Raw {
    Raw::List((0..items.len()).map(|idx| value_at(items.as_ref(), idx)).collect())
}

impl DataSource for ArrowSource {
    fn row_count(&self) -> usize {
        self.batch.num_rows()
    }

    fn column_count(&self) -> usize {
        self.batch.num_columns()
    }

    fn column_name(&self, col: usize) -> Result<String> {
        check_column(col, self.column_count())?;
        Ok(self.batch.schema().field(col).name().clone())
    }

    fn column_type(&self, col: usize) -> Result<DataType> {
        check_column(col, self.column_count())?;
        Ok(self.types[col])
    }

    fn cell(&self, row: usize, col: usize) -> Result<Value> {
        check_row(row, self.row_count())?;
        check_column(col, self.column_count())?;
        Ok(value_at(self.batch.column(col).as_ref(), row))
    }

    fn metadata(&self) -> Metadata {
        self.metadata.clone()
    }

    fn column_field(&self, col: usize) -> Result<Field> {
        check_column(col, self.column_count())?;
        Ok(self.batch.schema().field(col).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{
        BinaryArray, BooleanArray, Decimal128Array, DictionaryArray, Int32Array, ListArray,
        StringArray, StructArray, TimestampMillisecondArray, UInt64Array,
    };
    use chrono::NaiveDate;
    use parquet::arrow::ArrowWriter;

    fn sample_batch() -> RecordBatch {
        let ids = Int32Array::from(vec![Some(1), None, Some(3)]);
        let names = StringArray::from(vec![Some("ann"), Some("bob"), None]);
        let flags = BooleanArray::from(vec![true, false, true]);
        let prices = Decimal128Array::from(vec![1250, -5, 0])
            .with_precision_and_scale(10, 2)
            .unwrap();
        let at = TimestampMillisecondArray::from(vec![0, 1_700_000_000_000, 86_400_000]);
        let blobs = BinaryArray::from(vec![&b"ok"[..], &[0xff][..], &b""[..]]);

        let schema = Schema::new(vec![
            Field::new("id", ArrowType::Int32, true),
            Field::new("name", ArrowType::Utf8, true),
            Field::new("flag", ArrowType::Boolean, false),
            Field::new("price", ArrowType::Decimal128(10, 2), false),
            Field::new("at", ArrowType::Timestamp(TimeUnit::Millisecond, None), false),
            Field::new("blob", ArrowType::Binary, false),
        ]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(ids),
                Arc::new(names),
                Arc::new(flags),
                Arc::new(prices),
                Arc::new(at),
                Arc::new(blobs),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_scalar_cells() {
        let source = ArrowSource::new(sample_batch()).unwrap();
        assert_eq!(source.row_count(), 3);
        assert_eq!(source.column_type(0).unwrap(), DataType::Int);
        assert_eq!(source.cell(0, 0).unwrap(), Value::int(1));
        assert!(source.cell(1, 0).unwrap().is_null());
        assert!(source.cell(2, 1).unwrap().is_null());
        assert_eq!(source.cell(1, 2).unwrap(), Value::bool(false));
        assert_eq!(source.cell(0, 3).unwrap().formatted(), "12.50");
        assert_eq!(source.cell(1, 3).unwrap().formatted(), "-0.05");
        assert_eq!(source.cell(2, 4).unwrap().formatted(), "1970-01-02 00:00:00");
        assert_eq!(source.cell(1, 5).unwrap().formatted(), "0xff");
        assert!(source.cell(3, 0).is_err());

        let field = source.column_field(0).unwrap();
        assert_eq!(field.data_type(), &ArrowType::Int32);
    }

    #[test]
    fn test_nested_cells() {
        let tags = ListArray::from_iter_primitive::<Int32Type, _, _>(vec![
            Some(vec![Some(1), Some(2)]),
            None,
        ]);
        let point = StructArray::from(vec![
            (
                Arc::new(Field::new("x", ArrowType::Int32, false)),
                Arc::new(Int32Array::from(vec![1, 2])) as ArrayRef,
            ),
            (
                Arc::new(Field::new("label", ArrowType::Utf8, true)),
                Arc::new(StringArray::from(vec![Some("a"), None])) as ArrayRef,
            ),
        ]);
        let schema = Schema::new(vec![
            Field::new("tags", tags.data_type().clone(), true),
            Field::new("point", point.data_type().clone(), false),
        ]);
        let batch = RecordBatch::try_new(Arc::new(schema), vec![Arc::new(tags), Arc::new(point)]).unwrap();
        let source = ArrowSource::new(batch).unwrap();

        assert_eq!(source.column_type(0).unwrap(), DataType::List);
        assert_eq!(source.cell(0, 0).unwrap().formatted(), "[1, 2]");
        assert!(source.cell(1, 0).unwrap().is_null());
        assert_eq!(source.column_type(1).unwrap(), DataType::Struct);
        assert_eq!(source.cell(1, 1).unwrap().formatted(), "{x: 2, label: null}");
    }

    #[test]
    fn test_dictionary_decoded() {
        let dict: DictionaryArray<Int32Type> = vec!["red", "blue", "red"].into_iter().collect();
        let schema = Schema::new(vec![Field::new("color", dict.data_type().clone(), false)]);
        let batch = RecordBatch::try_new(Arc::new(schema), vec![Arc::new(dict)]).unwrap();

        let source = ArrowSource::new(batch).unwrap();
        assert_eq!(source.column_type(0).unwrap(), DataType::String);
        assert_eq!(source.column_field(0).unwrap().data_type(), &ArrowType::Utf8);
        assert_eq!(source.cell(2, 0).unwrap(), Value::string("red"));
    }

    #[test]
    fn test_uint64_beyond_i64() {
        let values = UInt64Array::from(vec![5, u64::MAX]);
        let schema = Schema::new(vec![Field::new("n", ArrowType::UInt64, false)]);
        let batch = RecordBatch::try_new(Arc::new(schema), vec![Arc::new(values)]).unwrap();
        let source = ArrowSource::new(batch).unwrap();

        assert_eq!(source.cell(0, 0).unwrap(), Value::int(5));
        let big = source.cell(1, 0).unwrap();
        assert_eq!(big.data_type(), DataType::Int);
        assert_eq!(big.formatted(), u64::MAX.to_string());
    }

    #[test]
    fn test_parquet_round_trip() {
        let batch = sample_batch();
        let file = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        let mut writer = ArrowWriter::try_new(File::create(file.path()).unwrap(), batch.schema(), None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let source = ArrowSource::from_parquet(file.path()).unwrap();
        assert_eq!(source.row_count(), 3);
        assert_eq!(source.column_names().unwrap()[1], "name");
        assert_eq!(source.cell(0, 1).unwrap(), Value::string("ann"));
        assert_eq!(
            source.cell(0, 4).unwrap().as_date(),
            NaiveDate::from_ymd_opt(1970, 1, 1)
        );
        assert_eq!(source.metadata()["format"], "parquet");
    }
}
