//! Typed value model: column types, cell payloads and sort state

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arrow::datatypes::{DataType as ArrowType, Field, Fields, TimeUnit};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Free-form metadata attached to a data source
pub type Metadata = HashMap<String, serde_json::Value>;

/// Semantic type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    String,
    Int,
    Float,
    Bool,
    Date,
    Timestamp,
    Binary,
    Decimal,
    Struct,
    List,
}

impl DataType {
    /// Every variant, in declaration order
    pub const ALL: [DataType; 10] = [
        DataType::String,
        DataType::Int,
        DataType::Float,
        DataType::Bool,
        DataType::Date,
        DataType::Timestamp,
        DataType::Binary,
        DataType::Decimal,
        DataType::Struct,
        DataType::List,
    ];

    /// Whether values of this type compare numerically
    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Int | DataType::Float | DataType::Decimal)
    }

    /// Whether values of this type compare chronologically
    pub fn is_temporal(self) -> bool {
        matches!(self, DataType::Date | DataType::Timestamp)
    }

    /// Default Arrow representation used when a source has no richer field
    pub fn to_arrow(self) -> ArrowType {
        match self {
            DataType::String => ArrowType::Utf8,
            DataType::Int => ArrowType::Int64,
            DataType::Float => ArrowType::Float64,
            DataType::Bool => ArrowType::Boolean,
            DataType::Date => ArrowType::Date32,
            DataType::Timestamp => ArrowType::Timestamp(TimeUnit::Microsecond, None),
            DataType::Binary => ArrowType::Binary,
            DataType::Decimal => ArrowType::Decimal128(38, 10),
            DataType::Struct => ArrowType::Struct(Fields::empty()),
            DataType::List => ArrowType::List(Arc::new(Field::new("item", ArrowType::Utf8, true))),
        }
    }

    /// Semantic type for an Arrow type; anything without a counterpart is shown as text
    pub fn from_arrow(data_type: &ArrowType) -> Self {
        match data_type {
            ArrowType::Utf8 | ArrowType::LargeUtf8 => DataType::String,
            ArrowType::Int8
            | ArrowType::Int16
            | ArrowType::Int32
            | ArrowType::Int64
            | ArrowType::UInt8
            | ArrowType::UInt16
            | ArrowType::UInt32
            | ArrowType::UInt64 => DataType::Int,
            ArrowType::Float16 | ArrowType::Float32 | ArrowType::Float64 => DataType::Float,
            ArrowType::Boolean => DataType::Bool,
            ArrowType::Date32 | ArrowType::Date64 => DataType::Date,
            ArrowType::Timestamp(_, _) => DataType::Timestamp,
            ArrowType::Binary | ArrowType::LargeBinary | ArrowType::FixedSizeBinary(_) => DataType::Binary,
            ArrowType::Decimal128(_, _) => DataType::Decimal,
            ArrowType::Struct(_) => DataType::Struct,
            ArrowType::List(_) | ArrowType::LargeList(_) => DataType::List,
            ArrowType::Dictionary(_, value_type) => DataType::from_arrow(value_type),
            _ => DataType::String,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::String => "String",
            DataType::Int => "Int",
            DataType::Float => "Float",
            DataType::Bool => "Bool",
            DataType::Date => "Date",
            DataType::Timestamp => "Timestamp",
            DataType::Binary => "Binary",
            DataType::Decimal => "Decimal",
            DataType::Struct => "Struct",
            DataType::List => "List",
        };
        f.write_str(name)
    }
}

/// Fixed-point decimal: `mantissa * 10^-scale`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    pub mantissa: i128,
    pub precision: u8,
    pub scale: i8,
}

impl Decimal {
    pub fn new(mantissa: i128, precision: u8, scale: i8) -> Self {
        Self { mantissa, precision, scale }
    }

    pub fn to_f64(&self) -> f64 {
        self.mantissa as f64 / 10f64.powi(self.scale as i32)
    }

    /// Mantissa expressed at another scale, rounding half away from zero when
    /// digits are dropped. `None` on overflow.
    pub fn rescale(&self, scale: i8) -> Option<i128> {
        let diff = scale as i32 - self.scale as i32;
        if diff >= 0 {
            10i128.checked_pow(diff as u32)?.checked_mul(self.mantissa)
        } else {
            let divisor = 10i128.checked_pow((-diff) as u32)?;
            let quotient = self.mantissa / divisor;
            let remainder = self.mantissa % divisor;
            if remainder.unsigned_abs() * 2 >= divisor.unsigned_abs() {
                Some(quotient + self.mantissa.signum())
            } else {
                Some(quotient)
            }
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale <= 0 {
            return match 10i128
                .checked_pow(self.scale.unsigned_abs() as u32)
                .and_then(|factor| factor.checked_mul(self.mantissa))
            {
                Some(value) => write!(f, "{}", value),
                None => write!(f, "{}e{}", self.mantissa, -self.scale),
            };
        }

        let scale = self.scale as usize;
        let digits = self.mantissa.unsigned_abs().to_string();
        let digits = if digits.len() <= scale {
            format!("{}{}", "0".repeat(scale + 1 - digits.len()), digits)
        } else {
            digits
        };
        let (whole, fraction) = digits.split_at(digits.len() - scale);
        let sign = if self.mantissa < 0 { "-" } else { "" };
        write!(f, "{}{}.{}", sign, whole, fraction)
    }
}

/// The typed payload of a non-null cell
#[derive(Debug, Clone, PartialEq)]
pub enum Raw {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Binary(Vec<u8>),
    Decimal(Decimal),
    Struct(Vec<(String, Value)>),
    List(Vec<Value>),
}

impl Raw {
    /// The data type this payload represents on its own
    pub fn natural_type(&self) -> DataType {
        match self {
            Raw::String(_) => DataType::String,
            Raw::Int(_) => DataType::Int,
            Raw::Float(_) => DataType::Float,
            Raw::Bool(_) => DataType::Bool,
            Raw::Date(_) => DataType::Date,
            Raw::Timestamp(_) => DataType::Timestamp,
            Raw::Binary(_) => DataType::Binary,
            Raw::Decimal(_) => DataType::Decimal,
            Raw::Struct(_) => DataType::Struct,
            Raw::List(_) => DataType::List,
        }
    }

    fn format(&self) -> String {
        match self {
            Raw::String(s) => s.clone(),
            Raw::Int(v) => v.to_string(),
            Raw::Float(v) => v.to_string(),
            Raw::Bool(v) => v.to_string(),
            Raw::Date(d) => d.format(DATE_FORMAT).to_string(),
            Raw::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            Raw::Binary(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => text.to_string(),
                Err(_) => {
                    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
                    format!("0x{}", hex)
                }
            },
            Raw::Decimal(d) => d.to_string(),
            Raw::Struct(fields) => {
                let parts: Vec<String> = fields
                    .iter()
                    .map(|(name, value)| format!("{}: {}", name, value.display_or_null()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Raw::List(items) => {
                let parts: Vec<&str> = items.iter().map(Value::display_or_null).collect();
                format!("[{}]", parts.join(", "))
            }
        }
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d";

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Parse a calendar date (`2024-01-31` or `2024/01/31`)
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y/%m/%d"))
        .ok()
}

/// Parse a timestamp; RFC 3339 values with an offset are normalized to UTC
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

/// One cell: typed payload, declared type and the pre-rendered display text
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    raw: Option<Raw>,
    data_type: DataType,
    formatted: String,
}

impl Value {
    /// Create a non-null value. The display text is rendered once, here.
    pub fn new(raw: Raw, data_type: DataType) -> Self {
        let formatted = raw.format();
        Self {
            raw: Some(raw),
            data_type,
            formatted,
        }
    }

    /// Create a null value of the given type
    pub fn null(data_type: DataType) -> Self {
        Self {
            raw: None,
            data_type,
            formatted: String::new(),
        }
    }

    pub fn from_option(raw: Option<Raw>, data_type: DataType) -> Self {
        match raw {
            Some(raw) => Self::new(raw, data_type),
            None => Self::null(data_type),
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(Raw::String(value.into()), DataType::String)
    }

    pub fn int(value: i64) -> Self {
        Self::new(Raw::Int(value), DataType::Int)
    }

    pub fn float(value: f64) -> Self {
        Self::new(Raw::Float(value), DataType::Float)
    }

    pub fn bool(value: bool) -> Self {
        Self::new(Raw::Bool(value), DataType::Bool)
    }

    pub fn date(value: NaiveDate) -> Self {
        Self::new(Raw::Date(value), DataType::Date)
    }

    pub fn timestamp(value: NaiveDateTime) -> Self {
        Self::new(Raw::Timestamp(value), DataType::Timestamp)
    }

    pub fn binary(value: Vec<u8>) -> Self {
        Self::new(Raw::Binary(value), DataType::Binary)
    }

    pub fn decimal(value: Decimal) -> Self {
        Self::new(Raw::Decimal(value), DataType::Decimal)
    }

    pub fn structure(fields: Vec<(String, Value)>) -> Self {
        Self::new(Raw::Struct(fields), DataType::Struct)
    }

    pub fn list(items: Vec<Value>) -> Self {
        Self::new(Raw::List(items), DataType::List)
    }

    pub fn raw(&self) -> Option<&Raw> {
        self.raw.as_ref()
    }

    pub fn into_raw(self) -> Option<Raw> {
        self.raw
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_null(&self) -> bool {
        self.raw.is_none()
    }

    /// Display text; empty for nulls
    pub fn formatted(&self) -> &str {
        &self.formatted
    }

    fn display_or_null(&self) -> &str {
        if self.is_null() {
            "null"
        } else {
            &self.formatted
        }
    }

    /// Numeric view of the cell, parsing the display text when the payload is not numeric
    pub fn as_f64(&self) -> Option<f64> {
        match self.raw.as_ref()? {
            Raw::Int(v) => Some(*v as f64),
            Raw::Float(v) => Some(*v),
            Raw::Decimal(d) => Some(d.to_f64()),
            Raw::Struct(_) | Raw::List(_) => None,
            _ => self.formatted.trim().parse::<f64>().ok(),
        }
    }

    /// Exact integer view; fractional floats and decimals yield `None`
    pub fn as_i128(&self) -> Option<i128> {
        match self.raw.as_ref()? {
            Raw::Int(v) => Some(*v as i128),
            Raw::Float(v) if v.is_finite() && v.fract() == 0.0 => Some(*v as i128),
            Raw::Float(_) => None,
            Raw::Decimal(d) => {
                let whole = d.rescale(0)?;
                let back = Decimal::new(whole, d.precision, 0).rescale(d.scale)?;
                (back == d.mantissa).then_some(whole)
            }
            Raw::Bool(v) => Some(*v as i128),
            Raw::Struct(_) | Raw::List(_) => None,
            _ => self.formatted.trim().parse::<i128>().ok(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.raw.as_ref()? {
            Raw::Bool(v) => Some(*v),
            Raw::Int(v) => Some(*v != 0),
            Raw::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self.raw.as_ref()? {
            Raw::Date(d) => Some(*d),
            Raw::Timestamp(ts) => Some(ts.date()),
            Raw::String(s) => parse_date(s).or_else(|| parse_timestamp(s).map(|ts| ts.date())),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self.raw.as_ref()? {
            Raw::Timestamp(ts) => Some(*ts),
            Raw::Date(d) => d.and_hms_opt(0, 0, 0),
            Raw::String(s) => parse_timestamp(s).or_else(|| parse_date(s).and_then(|d| d.and_hms_opt(0, 0, 0))),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self.raw.as_ref()? {
            Raw::Binary(bytes) => Some(bytes),
            Raw::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Mantissa at the requested decimal scale
    pub fn as_decimal(&self, scale: i8) -> Option<i128> {
        match self.raw.as_ref()? {
            Raw::Decimal(d) => d.rescale(scale),
            Raw::Int(v) => Decimal::new(*v as i128, 38, 0).rescale(scale),
            Raw::Float(v) if v.is_finite() => {
                let scaled = (v * 10f64.powi(scale as i32)).round();
                (scaled.abs() < i128::MAX as f64).then_some(scaled as i128)
            }
            Raw::String(s) => parse_decimal(s)?.rescale(scale),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted)
    }
}

/// Parse plain decimal text such as `-12.50`
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }
    let combined = format!("{}{}", whole, fraction);
    let mantissa: i128 = combined.parse().ok()?;
    let precision = combined.trim_start_matches('0').len().clamp(1, 38) as u8;
    let scale = i8::try_from(fraction.len()).ok()?;
    Some(Decimal::new(if negative { -mantissa } else { mantissa }, precision, scale))
}

/// Direction of the active sort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    None,
    Ascending,
    Descending,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SortDirection::None => "None",
            SortDirection::Ascending => "Ascending",
            SortDirection::Descending => "Descending",
        };
        f.write_str(name)
    }
}

/// The single active sort of a view. `column` is a source column index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortState {
    pub column: Option<usize>,
    pub direction: SortDirection,
}

impl SortState {
    pub fn unsorted() -> Self {
        Self::default()
    }

    pub fn is_sorted(&self) -> bool {
        self.column.is_some() && self.direction != SortDirection::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_has_empty_text() {
        let value = Value::null(DataType::Int);
        assert!(value.is_null());
        assert!(value.raw().is_none());
        assert_eq!(value.formatted(), "");
        assert_eq!(value.data_type(), DataType::Int);
    }

    #[test]
    fn test_formatting() {
        assert_eq!(Value::int(42).formatted(), "42");
        assert_eq!(Value::float(2.5).formatted(), "2.5");
        assert_eq!(Value::bool(false).formatted(), "false");
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(Value::date(date).formatted(), "2024-03-09");
        let ts = date.and_hms_opt(14, 5, 0).unwrap();
        assert_eq!(Value::timestamp(ts).formatted(), "2024-03-09 14:05:00");
        assert_eq!(Value::binary(vec![0xff, 0x01]).formatted(), "0xff01");
        assert_eq!(Value::binary(b"abc".to_vec()).formatted(), "abc");
    }

    #[test]
    fn test_composite_formatting() {
        let value = Value::structure(vec![
            ("id".to_string(), Value::int(1)),
            ("tag".to_string(), Value::null(DataType::String)),
        ]);
        assert_eq!(value.formatted(), "{id: 1, tag: null}");

        let list = Value::list(vec![Value::int(1), Value::int(2)]);
        assert_eq!(list.formatted(), "[1, 2]");
    }

    #[test]
    fn test_decimal_display_and_rescale() {
        assert_eq!(Decimal::new(12345, 5, 2).to_string(), "123.45");
        assert_eq!(Decimal::new(-5, 3, 2).to_string(), "-0.05");
        assert_eq!(Decimal::new(7, 1, -2).to_string(), "700");
        assert_eq!(Decimal::new(12345, 5, 2).rescale(4), Some(1_234_500));
        assert_eq!(Decimal::new(12345, 5, 2).rescale(1), Some(1235));
        assert_eq!(Decimal::new(-12345, 5, 2).rescale(1), Some(-1235));
    }

    #[test]
    fn test_parse_decimal() {
        let d = parse_decimal("-12.50").unwrap();
        assert_eq!(d.mantissa, -1250);
        assert_eq!(d.scale, 2);
        assert!(parse_decimal("12a").is_none());
        assert!(parse_decimal(".").is_none());
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(Value::string(" 10 ").as_f64(), Some(10.0));
        assert_eq!(Value::string("abc").as_f64(), None);
        assert_eq!(Value::float(3.0).as_i128(), Some(3));
        assert_eq!(Value::float(3.5).as_i128(), None);
        assert_eq!(Value::decimal(Decimal::new(300, 3, 2)).as_i128(), Some(3));
        assert_eq!(Value::decimal(Decimal::new(301, 3, 2)).as_i128(), None);
    }

    #[test]
    fn test_temporal_parsing() {
        assert!(parse_date("2024-01-31").is_some());
        assert!(parse_timestamp("2024-01-31 10:00:00").is_some());
        assert!(parse_timestamp("2024-01-31T10:00:00Z").is_some());
        assert!(parse_timestamp("yesterday").is_none());
        let value = Value::string("2024-01-31");
        assert_eq!(value.as_date(), NaiveDate::from_ymd_opt(2024, 1, 31));
    }

    #[test]
    fn test_sort_state() {
        assert!(!SortState::unsorted().is_sorted());
        let state = SortState {
            column: Some(0),
            direction: SortDirection::None,
        };
        assert!(!state.is_sorted());
        let state = SortState {
            column: Some(0),
            direction: SortDirection::Descending,
        };
        assert!(state.is_sorted());
    }

    #[test]
    fn test_arrow_mapping_round_trip() {
        for data_type in DataType::ALL {
            assert_eq!(DataType::from_arrow(&data_type.to_arrow()), data_type);
        }
    }
}
