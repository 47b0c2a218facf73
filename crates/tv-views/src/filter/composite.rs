use tv_core::{Result, Value};

use super::{Filter, LogicOp};

/// Combines filters with AND or OR logic
#[derive(Debug)]
pub struct CompositeFilter {
    pub filters: Vec<Box<dyn Filter>>,
    pub logic: LogicOp,
}

impl CompositeFilter {
    pub fn new(logic: LogicOp) -> Self {
        Self {
            filters: Vec::new(),
            logic,
        }
    }

    pub fn all(filters: Vec<Box<dyn Filter>>) -> Self {
        Self {
            filters,
            logic: LogicOp::And,
        }
    }

    pub fn any(filters: Vec<Box<dyn Filter>>) -> Self {
        Self {
            filters,
            logic: LogicOp::Or,
        }
    }

    pub fn with(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl Filter for CompositeFilter {
    /// An empty filter passes every row. AND stops at the first failing
    /// child, OR at the first passing one.
    fn evaluate(&self, row: &[Value], column_names: &[String]) -> Result<bool> {
        match self.logic {
            LogicOp::And => {
                for filter in &self.filters {
                    if !filter.evaluate(row, column_names)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            LogicOp::Or => {
                if self.filters.is_empty() {
                    return Ok(true);
                }
                for filter in &self.filters {
                    if filter.evaluate(row, column_names)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    fn description(&self) -> String {
        if self.filters.is_empty() {
            return "empty filter".to_string();
        }
        let parts: Vec<String> = self.filters.iter().map(|f| f.description()).collect();
        format!("({})", parts.join(&format!(" {} ", self.logic)))
    }
}
