//! The search query language.
//!
//! A query is one or more expressions joined by `AND` / `OR`:
//!
//! ```text
//! age >= 18 AND city = "New York" OR vip = true
//! ```
//!
//! Each expression is `column OP value` with `OP` one of `>= <= != = > < ~`,
//! or a bare term that matches rows where any cell contains it. Expressions
//! are combined strictly left to right, without precedence.

use std::cmp::Ordering;
use std::fmt;

use ahash::AHashMap;
use tv_core::{Result, TableError, Value};

use super::{Filter, LogicOp};

/// Comparison operator of one expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    Contains,
}

impl CompOp {
    /// Operators in the order the parser looks for them
    const SEARCH_ORDER: [CompOp; 7] = [
        CompOp::GreaterEqual,
        CompOp::LessEqual,
        CompOp::NotEqual,
        CompOp::Equal,
        CompOp::Greater,
        CompOp::Less,
        CompOp::Contains,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            CompOp::Equal => "=",
            CompOp::NotEqual => "!=",
            CompOp::Greater => ">",
            CompOp::Less => "<",
            CompOp::GreaterEqual => ">=",
            CompOp::LessEqual => "<=",
            CompOp::Contains => "~",
        }
    }

    /// Whether an ordering of cell against value satisfies the operator
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            CompOp::Greater => ordering == Ordering::Greater,
            CompOp::Less => ordering == Ordering::Less,
            CompOp::GreaterEqual => ordering != Ordering::Less,
            CompOp::LessEqual => ordering != Ordering::Greater,
            CompOp::Equal | CompOp::NotEqual | CompOp::Contains => false,
        }
    }
}

impl fmt::Display for CompOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A single comparison
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    /// Column to test; `None` searches every column
    column: Option<String>,
    operator: CompOp,
    value: String,
    /// `value` lowercased once for case-insensitive matching
    needle: String,
}

impl Expression {
    /// Bare search term matched against every cell
    pub fn search(term: impl Into<String>) -> Self {
        Self::new(None, CompOp::Contains, term.into())
    }

    pub fn compare(column: impl Into<String>, operator: CompOp, value: impl Into<String>) -> Self {
        Self::new(Some(column.into()), operator, value.into())
    }

    fn new(column: Option<String>, operator: CompOp, value: String) -> Self {
        let needle = value.to_lowercase();
        Self {
            column,
            operator,
            value,
            needle,
        }
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn operator(&self) -> CompOp {
        self.operator
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    fn matches_cell(&self, cell: &str) -> bool {
        let cell = cell.to_lowercase();
        match self.operator {
            CompOp::Equal => cell == self.needle,
            CompOp::NotEqual => cell != self.needle,
            CompOp::Contains => cell.contains(&self.needle),
            op => compare_text(&cell, &self.needle).is_some_and(|ordering| op.accepts(ordering)),
        }
    }
}

/// Numeric ordering when both sides parse as numbers, otherwise
/// lexicographic ordering of the (already lowercased) text. `None` when
/// either number is NaN, which no range operator accepts.
fn compare_text(cell: &str, value: &str) -> Option<Ordering> {
    match (cell.trim().parse::<f64>(), value.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b),
        _ => Some(cell.cmp(value)),
    }
}

impl Filter for Expression {
    fn evaluate(&self, row: &[Value], column_names: &[String]) -> Result<bool> {
        let Some(column) = &self.column else {
            return Ok(row.iter().any(|cell| self.matches_cell(cell.formatted())));
        };

        let col_idx = column_names
            .iter()
            .position(|name| name == column)
            .or_else(|| {
                column_names
                    .iter()
                    .position(|name| name.eq_ignore_ascii_case(column))
            })
            .ok_or_else(|| TableError::InvalidFilter(format!("unknown column: {}", column)))?;

        let cell = row.get(col_idx).ok_or(TableError::InvalidColumn {
            index: col_idx,
            count: row.len(),
        })?;
        Ok(self.matches_cell(cell.formatted()))
    }

    fn description(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(column) => write!(f, "{} {} {}", column, self.operator, self.value),
            None => write!(f, "any column ~ {}", self.value),
        }
    }
}

/// A parsed query: `expressions[0] ops[0] expressions[1] ops[1] ...`
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    expressions: Vec<Expression>,
    logic_ops: Vec<LogicOp>,
}

impl Query {
    /// Assemble a query; there must be exactly one operator between each
    /// pair of expressions.
    pub fn new(expressions: Vec<Expression>, logic_ops: Vec<LogicOp>) -> Result<Self> {
        if expressions.is_empty() || logic_ops.len() + 1 != expressions.len() {
            return Err(TableError::InvalidFilter(format!(
                "mismatched expressions and operators ({} expressions, {} operators)",
                expressions.len(),
                logic_ops.len()
            )));
        }
        Ok(Self {
            expressions,
            logic_ops,
        })
    }

    pub fn expressions(&self) -> &[Expression] {
        &self.expressions
    }

    pub fn logic_ops(&self) -> &[LogicOp] {
        &self.logic_ops
    }
}

impl Filter for Query {
    fn evaluate(&self, row: &[Value], column_names: &[String]) -> Result<bool> {
        let mut result = self.expressions[0].evaluate(row, column_names)?;
        for (op, expression) in self.logic_ops.iter().zip(&self.expressions[1..]) {
            let next = expression.evaluate(row, column_names)?;
            result = op.apply(result, next);
        }
        Ok(result)
    }

    fn description(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expressions[0])?;
        for (op, expression) in self.logic_ops.iter().zip(&self.expressions[1..]) {
            write!(f, " {} {}", op, expression)?;
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
enum Part<'a> {
    Text(&'a str),
    Op(LogicOp),
}

/// Parses query text against a fixed set of column names
#[derive(Debug, Clone)]
pub struct QueryParser {
    headers: Vec<String>,
    /// Lowercased column name to column index
    column_map: AHashMap<String, usize>,
}

impl QueryParser {
    pub fn new(headers: &[String]) -> Self {
        let mut column_map = AHashMap::with_capacity(headers.len());
        for (idx, header) in headers.iter().enumerate() {
            column_map.entry(header.to_lowercase()).or_insert(idx);
        }
        Self {
            headers: headers.to_vec(),
            column_map,
        }
    }

    /// Parse query text. Blank text parses to `None` (no filter).
    pub fn parse(&self, text: &str) -> Result<Option<Query>> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let mut expressions = Vec::new();
        let mut logic_ops = Vec::new();
        for part in split_logic_ops(text) {
            match part {
                Part::Op(op) => logic_ops.push(op),
                Part::Text(text) => expressions.push(self.parse_expression(text)?),
            }
        }

        Query::new(expressions, logic_ops).map(Some)
    }

    fn parse_expression(&self, text: &str) -> Result<Expression> {
        let text = text.trim();

        for op in CompOp::SEARCH_ORDER {
            let idx = match text.find(op.symbol()) {
                Some(idx) if idx > 0 => idx,
                _ => continue,
            };

            let column = text[..idx].trim();
            let raw_value = text[idx + op.symbol().len()..].trim();
            if raw_value.is_empty() {
                return Err(TableError::InvalidFilter(format!(
                    "missing value after '{}' in '{}'",
                    op, text
                )));
            }

            let col_idx = self
                .column_map
                .get(&column.to_lowercase())
                .copied()
                .ok_or_else(|| TableError::InvalidFilter(format!("unknown column: {}", column)))?;

            return Ok(Expression::compare(
                self.headers[col_idx].clone(),
                op,
                strip_quotes(raw_value),
            ));
        }

        Ok(Expression::search(strip_quotes(text)))
    }
}

fn strip_quotes(text: &str) -> &str {
    text.trim_matches(|c| c == '"' || c == '\'')
}

/// Split on whitespace-delimited `AND` / `OR` (any case) outside quotes
fn split_logic_ops(text: &str) -> Vec<Part<'_>> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    let mut prev: Option<char> = None;
    let mut skip_until = 0;

    for (idx, c) in text.char_indices() {
        if idx < skip_until {
            prev = Some(c);
            continue;
        }

        match quote {
            Some(open) if c == open => quote = None,
            Some(_) => {}
            None if (c == '"' || c == '\'') && prev.map_or(true, opens_quote) => quote = Some(c),
            None if prev.map_or(true, char::is_whitespace) => {
                if let Some((op, len)) = logic_op_at(text, idx) {
                    push_text(&mut parts, &text[start..idx]);
                    parts.push(Part::Op(op));
                    start = idx + len;
                    skip_until = start;
                }
            }
            None => {}
        }
        prev = Some(c);
    }
    push_text(&mut parts, &text[start..]);
    parts
}

fn logic_op_at(text: &str, idx: usize) -> Option<(LogicOp, usize)> {
    for (word, op) in [("and", LogicOp::And), ("or", LogicOp::Or)] {
        let end = idx + word.len();
        if !text.get(idx..end).is_some_and(|s| s.eq_ignore_ascii_case(word)) {
            continue;
        }
        if text[end..].chars().next().map_or(true, char::is_whitespace) {
            return Some((op, word.len()));
        }
    }
    None
}

/// A quote only opens at the start of a value, so apostrophes inside words are literal
fn opens_quote(prev: char) -> bool {
    prev.is_whitespace() || matches!(prev, '=' | '<' | '>' | '!' | '~')
}

fn push_text<'a>(parts: &mut Vec<Part<'a>>, text: &'a str) {
    let text = text.trim();
    if !text.is_empty() {
        parts.push(Part::Text(text));
    }
}
