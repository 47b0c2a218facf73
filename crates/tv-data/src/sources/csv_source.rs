use std::fs;
use std::io::Read;

use arrow::datatypes::Field;
use csv::{ReaderBuilder, Trim};
use tracing::{debug, warn};
use tv_core::{DataSource, DataType, Metadata, Result, Value};

use crate::config::FileConfig;
use crate::schema::SchemaDetector;
use crate::sources::memory_source::{ColumnSpec, MemorySource};
use crate::{ColumnInfo, DataError};

/// Candidate delimiters, in tie-break order
const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Delimited text loaded fully into memory with inferred column types
#[derive(Debug, Clone)]
pub struct CsvSource {
    data: MemorySource,
    columns: Vec<ColumnInfo>,
    delimiter: u8,
}

impl CsvSource {
    /// Load the file named by `config`
    pub fn open(config: &FileConfig) -> Result<Self, DataError> {
        let text = fs::read_to_string(&config.path)?;
        let source = Self::from_text(&text, config)?;
        let data = source
            .data
            .with_metadata("path", config.path.display().to_string());
        Ok(Self { data, ..source })
    }

    /// Parse delimited text, detecting the delimiter unless `config` names one
    pub fn from_text(text: &str, config: &FileConfig) -> Result<Self, DataError> {
        let text = text.trim_start_matches('\u{feff}');
        let delimiter = match config.delimiter {
            Some(c) if c.is_ascii() => c as u8,
            Some(c) => {
                return Err(DataError::Csv(format!(
                    "delimiter must be a single ASCII character, got {:?}",
                    c
                )))
            }
            None => detect_delimiter(text.lines().next().unwrap_or("")),
        };
        Self::from_reader(text.as_bytes(), config, delimiter)
    }

    /// Parse delimited records from any reader
    pub fn from_reader<R: Read>(reader: R, config: &FileConfig, delimiter: u8) -> Result<Self, DataError> {
        let mut csv_reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .trim(if config.trim_whitespace { Trim::All } else { Trim::None })
            .from_reader(reader);

        let mut records = Vec::new();
        for result in csv_reader.records() {
            let record = result?;
            records.push(record.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        }

        let mut records = records.into_iter();
        let headers: Vec<String> = if config.has_headers {
            let first = records
                .next()
                .ok_or_else(|| DataError::Empty("file has no header row".to_string()))?;
            first
                .into_iter()
                .enumerate()
                .map(|(idx, name)| if name.is_empty() { default_column_name(idx) } else { name })
                .collect()
        } else {
            Vec::new()
        };
        let rows: Vec<Vec<String>> = records.collect();

        let headers = if config.has_headers {
            headers
        } else {
            let width = rows
                .first()
                .map(|row| row.len())
                .ok_or_else(|| DataError::Empty("file has no records".to_string()))?;
            (0..width).map(default_column_name).collect()
        };

        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != headers.len() {
                return Err(DataError::RaggedRow {
                    row: row_idx,
                    expected: headers.len(),
                    found: row.len(),
                });
            }
        }

        let detector = SchemaDetector::new()
            .with_sample_size(config.sample_size)
            .with_null_config(config.null_config.clone());
        let mut columns = detector.detect(&headers, &rows);
        for column in &mut columns {
            if let Some(data_type) = config.column_type_override(&column.name) {
                column.data_type = data_type;
            }
        }

        let values = rows
            .iter()
            .enumerate()
            .map(|(row_idx, row)| {
                row.iter()
                    .zip(&columns)
                    .map(|(text, column)| {
                        detector.parse_cell(text, column.data_type).unwrap_or_else(|| {
                            warn!(
                                "Row {} column '{}': {:?} is not a valid {}, loading as null",
                                row_idx, column.name, text, column.data_type
                            );
                            Value::null(column.data_type)
                        })
                    })
                    .collect()
            })
            .collect();

        let specs = columns
            .iter()
            .map(|column| ColumnSpec::new(column.name.clone(), column.data_type))
            .collect();
        let data = MemorySource::new(specs, values)?
            .with_metadata("format", "csv")
            .with_metadata("delimiter", (delimiter as char).to_string());

        debug!(
            "Parsed {} rows x {} columns with delimiter {:?}",
            rows.len(),
            columns.len(),
            delimiter as char
        );

        Ok(Self {
            data,
            columns,
            delimiter,
        })
    }

    /// Inferred column descriptions
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }
}

/// Pick the delimiter that occurs most often in the first line; `,` when none occur
pub fn detect_delimiter(first_line: &str) -> u8 {
    let mut best = b',';
    let mut best_count = 0;
    for candidate in DELIMITERS {
        let count = first_line.bytes().filter(|b| *b == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

fn default_column_name(idx: usize) -> String {
    format!("column_{}", idx + 1)
}

impl DataSource for CsvSource {
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
