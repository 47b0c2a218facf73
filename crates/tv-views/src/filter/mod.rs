//! Row filters: the query language and boolean composition

pub mod composite;
pub mod query;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tv_core::{Result, TableError, Value};

pub use composite::CompositeFilter;
pub use query::{CompOp, Expression, Query, QueryParser};

/// A predicate over one source row.
///
/// `row` holds every cell of the row in source column order and
/// `column_names` the matching column names.
pub trait Filter: Send + Sync + fmt::Debug {
    fn evaluate(&self, row: &[Value], column_names: &[String]) -> Result<bool>;

    /// Human-readable summary of the predicate
    fn description(&self) -> String;
}

/// Boolean connective between filters or query expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicOp {
    And,
    Or,
}

impl LogicOp {
    pub fn apply(self, left: bool, right: bool) -> bool {
        match self {
            LogicOp::And => left && right,
            LogicOp::Or => left || right,
        }
    }
}

impl FromStr for LogicOp {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("and") {
            Ok(LogicOp::And)
        } else if s.eq_ignore_ascii_case("or") {
            Ok(LogicOp::Or)
        } else {
            Err(TableError::InvalidFilter(format!("unknown logic operator: {}", s)))
        }
    }
}

impl fmt::Display for LogicOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicOp::And => f.write_str("AND"),
            LogicOp::Or => f.write_str("OR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logic_op_parsing() {
        assert_eq!("and".parse::<LogicOp>().unwrap(), LogicOp::And);
        assert_eq!("OR".parse::<LogicOp>().unwrap(), LogicOp::Or);
        assert!(matches!("xor".parse::<LogicOp>(), Err(TableError::InvalidFilter(_))));
        assert_eq!(LogicOp::Or.to_string(), "OR");
    }
}
