use tv_core::{parse_date, parse_decimal, parse_timestamp, DataType, Raw, Value};

use crate::config::NullConfig;
use crate::sources::memory_source::value_from_json;
use crate::ColumnInfo;

/// Schema detector for inferring column types from text cells
#[derive(Debug, Clone)]
pub struct SchemaDetector {
    sample_size: usize,
    null_config: NullConfig,
}

impl SchemaDetector {
    /// Create a new schema detector
    pub fn new() -> Self {
        Self {
            sample_size: 1000,
            null_config: NullConfig::default(),
        }
    }

    /// Set the sample size for detection
    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = size.max(1);
        self
    }

    pub fn with_null_config(mut self, null_config: NullConfig) -> Self {
        self.null_config = null_config;
        self
    }

    pub fn null_config(&self) -> &NullConfig {
        &self.null_config
    }

    /// Detect column types from the first `sample_size` rows.
    ///
    /// `null_count` covers every row, not just the sample.
    pub fn detect(&self, headers: &[String], rows: &[Vec<String>]) -> Vec<ColumnInfo> {
        headers
            .iter()
            .enumerate()
            .map(|(col_idx, name)| ColumnInfo {
                name: name.clone(),
                data_type: self.analyze_column(rows, col_idx),
                null_count: rows
                    .iter()
                    .filter(|row| row.get(col_idx).map_or(true, |cell| self.null_config.is_null(cell)))
                    .count(),
            })
            .collect()
    }

    /// Analyze a single column
    fn analyze_column(&self, rows: &[Vec<String>], col_idx: usize) -> DataType {
        let mut seen = 0;
        let mut is_bool = true;
        let mut is_int = true;
        let mut is_float = true;
        let mut is_date = true;
        let mut is_timestamp = true;

        for row in rows.iter().take(self.sample_size) {
            let value = match row.get(col_idx) {
                Some(value) if !self.null_config.is_null(value) => value.trim(),
                _ => continue,
            };
            seen += 1;

            if is_bool && !matches!(value.to_lowercase().as_str(), "true" | "false") {
                is_bool = false;
            }
            if is_int && value.parse::<i64>().is_err() {
                is_int = false;
            }
            if is_float && value.parse::<f64>().is_err() {
                is_float = false;
            }
            if is_date && parse_date(value).is_none() {
                is_date = false;
            }
            if is_timestamp && parse_timestamp(value).is_none() {
                is_timestamp = false;
            }
        }

        if seen == 0 {
            DataType::String
        } else if is_bool {
            DataType::Bool
        } else if is_int {
            DataType::Int
        } else if is_float {
            DataType::Float
        } else if is_date {
            DataType::Date
        } else if is_timestamp {
            DataType::Timestamp
        } else {
            DataType::String
        }
    }

    /// Convert one text cell to a value of `data_type`.
    ///
    /// Null patterns yield a null value; text that does not parse as the
    /// requested type yields `None`.
    pub fn parse_cell(&self, text: &str, data_type: DataType) -> Option<Value> {
        if self.null_config.is_null(text) {
            return Some(Value::null(data_type));
        }
        parse_text(text, data_type)
    }
}

impl Default for SchemaDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Typed value from text, without any null handling
pub fn parse_text(text: &str, data_type: DataType) -> Option<Value> {
    let trimmed = text.trim();
    let raw = match data_type {
        DataType::String => Raw::String(text.to_string()),
        DataType::Int => Raw::Int(trimmed.parse().ok()?),
        DataType::Float => Raw::Float(trimmed.parse().ok()?),
        DataType::Bool => match trimmed.to_lowercase().as_str() {
            "true" | "1" | "yes" => Raw::Bool(true),
            "false" | "0" | "no" => Raw::Bool(false),
            _ => return None,
        },
        DataType::Date => Raw::Date(parse_date(trimmed)?),
        DataType::Timestamp => Raw::Timestamp(
            parse_timestamp(trimmed).or_else(|| parse_date(trimmed)?.and_hms_opt(0, 0, 0))?,
        ),
        DataType::Binary => Raw::Binary(text.as_bytes().to_vec()),
        DataType::Decimal => Raw::Decimal(parse_decimal(trimmed)?),
        DataType::Struct | DataType::List => {
            let json: serde_json::Value = serde_json::from_str(trimmed).ok()?;
            let value = value_from_json(&json);
            return (value.data_type() == data_type).then_some(value);
        }
    };
    Some(Value::new(raw, data_type))
}
