//! Ordering of cells for column sorts

use std::cmp::Ordering;

use tv_core::{DataType, SortDirection, Value};

/// Order two non-null cells of a column typed `data_type`.
///
/// Numbers compare numerically, booleans false before true, dates and
/// timestamps chronologically. Anything else, and any pair that cannot be
/// read as the column type, compares by lowercase display text.
pub fn compare_values(a: &Value, b: &Value, data_type: DataType) -> Ordering {
    let typed = match data_type {
        DataType::Int => match (a.as_i128(), b.as_i128()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => compare_f64(a, b),
        },
        DataType::Float | DataType::Decimal => compare_f64(a, b),
        DataType::Bool => match (a.as_bool(), b.as_bool()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => None,
        },
        DataType::Date | DataType::Timestamp => match (a.as_timestamp(), b.as_timestamp()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => None,
        },
        DataType::String | DataType::Binary | DataType::Struct | DataType::List => None,
    };

    typed.unwrap_or_else(|| a.formatted().to_lowercase().cmp(&b.formatted().to_lowercase()))
}

fn compare_f64(a: &Value, b: &Value) -> Option<Ordering> {
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

/// Order two cells for a sort in `direction`. Nulls come last either way.
pub fn compare_for_sort(a: &Value, b: &Value, data_type: DataType, direction: SortDirection) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => match direction {
            SortDirection::Descending => compare_values(b, a, data_type),
            SortDirection::Ascending | SortDirection::None => compare_values(a, b, data_type),
        },
    }
}

/// Sort `(row, key)` pairs and return the rows.
///
/// Rows are first put in ascending index order, so tied rows stay in that
/// order regardless of the input order.
pub fn sort_rows(mut keyed: Vec<(usize, Value)>, data_type: DataType, direction: SortDirection) -> Vec<usize> {
    keyed.sort_unstable_by_key(|(row, _)| *row);
    if direction != SortDirection::None {
        keyed.sort_by(|(_, a), (_, b)| compare_for_sort(a, b, data_type, direction));
    }
    keyed.into_iter().map(|(row, _)| row).collect()
}
