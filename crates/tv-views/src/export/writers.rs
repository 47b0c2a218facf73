//! Format writers for projected datasets

use std::io::Write;

use arrow::json::writer::JsonArray;
use arrow::json::WriterBuilder as JsonWriterBuilder;
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tv_core::{Result, TableError};

fn export_failed(error: impl std::fmt::Display) -> TableError {
    TableError::ExportFailed(error.to_string())
}

/// Delimited text with an optional header row; nulls are written as empty fields
pub fn write_csv<W: Write>(batch: &RecordBatch, writer: W, delimiter: u8, header: bool) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(writer);

    let schema = batch.schema();
    if header {
        csv_writer
            .write_record(schema.fields().iter().map(|field| field.name()))
            .map_err(export_failed)?;
    }

    let options = FormatOptions::default().with_null("");
    let formatters = batch
        .columns()
        .iter()
        .map(|column| ArrayFormatter::try_new(column.as_ref(), &options))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(export_failed)?;

    let mut record = Vec::with_capacity(formatters.len());
    for row in 0..batch.num_rows() {
        record.clear();
        for formatter in &formatters {
            record.push(formatter.value(row).try_to_string().map_err(export_failed)?);
        }
        csv_writer.write_record(&record).map_err(export_failed)?;
    }

    csv_writer.flush().map_err(export_failed)
}

/// A JSON array of records, with explicit nulls
pub fn write_json<W: Write>(batch: &RecordBatch, writer: W) -> Result<()> {
    let mut json_writer = JsonWriterBuilder::new()
        .with_explicit_nulls(true)
        .build::<_, JsonArray>(writer);
    json_writer.write(batch).map_err(export_failed)?;
    json_writer.finish().map_err(export_failed)
}

/// Parquet with Snappy compression
pub fn write_parquet<W: Write + Send>(batch: &RecordBatch, writer: W) -> Result<()> {
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut parquet_writer = ArrowWriter::try_new(writer, batch.schema(), Some(props)).map_err(export_failed)?;
    parquet_writer.write(batch).map_err(export_failed)?;
    parquet_writer.close().map_err(export_failed)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn batch() -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new("name", DataType::Utf8, true),
            Field::new("age", DataType::Int64, true),
        ]);
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec![Some("Ann, Jr."), None])),
            Arc::new(Int64Array::from(vec![Some(31), None])),
        ];
        RecordBatch::try_new(Arc::new(schema), columns).unwrap()
    }

    #[test]
    fn test_csv_output() {
        let mut out = Vec::new();
        write_csv(&batch(), &mut out, b',', true).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "name,age\n\"Ann, Jr.\",31\n,\n");

        let mut out = Vec::new();
        write_csv(&batch(), &mut out, b';', false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Ann, Jr.;31\n;\n");
    }

    #[test]
    fn test_json_output() {
        let mut out = Vec::new();
        write_json(&batch(), &mut out).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!([
                {"name": "Ann, Jr.", "age": 31},
                {"name": null, "age": null}
            ])
        );
    }

    #[test]
    fn test_parquet_output() {
        let mut out = Vec::new();
        write_parquet(&batch(), &mut out).unwrap();
        assert_eq!(&out[..4], b"PAR1");
    }
}
