//! The table model: filtered, sorted and column-limited views over a source

use std::sync::Arc;

use tracing::debug;
use tv_core::{check_column, DataSource, DataType, Result, SortDirection, SortState, TableError, Value};

use crate::filter::{Filter, Query, QueryParser};
use crate::sort::sort_rows;

/// The filter currently narrowing the visible rows
#[derive(Debug)]
enum ActiveFilter {
    Query(Query),
    Custom(Box<dyn Filter>),
}

impl ActiveFilter {
    fn as_filter(&self) -> &dyn Filter {
        match self {
            ActiveFilter::Query(query) => query,
            ActiveFilter::Custom(filter) => filter.as_ref(),
        }
    }
}

/// An owned copy of a view's projections.
///
/// Holds its own handle on the source, so it stays valid while the model
/// that produced it keeps changing.
#[derive(Clone)]
pub struct ViewSnapshot {
    pub source: Arc<dyn DataSource>,
    /// Source row indices, in view order
    pub rows: Vec<usize>,
    /// Source column indices, in view order
    pub columns: Vec<usize>,
}

/// A mutable view over an immutable data source.
///
/// The model never changes the source. It keeps two index projections, the
/// visible rows and the visible columns, and recomputes them when the
/// filter, the sort or the column selection changes. Every mutation either
/// succeeds completely or leaves the model as it was.
pub struct TableModel {
    source: Arc<dyn DataSource>,
    column_names: Vec<String>,
    visible_rows: Vec<usize>,
    visible_columns: Vec<usize>,
    sort_state: SortState,
    active_filter: Option<ActiveFilter>,
}

impl TableModel {
    /// Create a model over `source`, failing with `NoDataSource` when absent
    pub fn try_new(source: Option<Arc<dyn DataSource>>) -> Result<Self> {
        Self::new(source.ok_or(TableError::NoDataSource)?)
    }

    /// Create a model showing every row and column of `source`
    pub fn new(source: Arc<dyn DataSource>) -> Result<Self> {
        if source.column_count() == 0 {
            return Err(TableError::EmptyData("data source has no columns".to_string()));
        }
        let column_names = source.column_names()?;
        let visible_rows = (0..source.row_count()).collect();
        let visible_columns = (0..source.column_count()).collect();

        Ok(Self {
            source,
            column_names,
            visible_rows,
            visible_columns,
            sort_state: SortState::unsorted(),
            active_filter: None,
        })
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    /// Every source column name, in source order
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn visible_row_count(&self) -> usize {
        self.visible_rows.len()
    }

    pub fn visible_column_count(&self) -> usize {
        self.visible_columns.len()
    }

    pub fn visible_row_indices(&self) -> &[usize] {
        &self.visible_rows
    }

    pub fn visible_column_indices(&self) -> &[usize] {
        &self.visible_columns
    }

    pub fn sort_state(&self) -> SortState {
        self.sort_state
    }

    /// The last query installed with `set_filter`, if it is still active
    pub fn active_query(&self) -> Option<&Query> {
        match &self.active_filter {
            Some(ActiveFilter::Query(query)) => Some(query),
            _ => None,
        }
    }

    pub fn filter_description(&self) -> Option<String> {
        self.active_filter.as_ref().map(|filter| filter.as_filter().description())
    }

    fn source_row(&self, view_row: usize) -> Result<usize> {
        self.visible_rows
            .get(view_row)
            .copied()
            .ok_or(TableError::InvalidRow {
                index: view_row,
                count: self.visible_rows.len(),
            })
    }

    fn source_column(&self, view_col: usize) -> Result<usize> {
        self.visible_columns
            .get(view_col)
            .copied()
            .ok_or(TableError::InvalidColumn {
                index: view_col,
                count: self.visible_columns.len(),
            })
    }

    /// Cell at a position of the view
    pub fn visible_cell(&self, view_row: usize, view_col: usize) -> Result<Value> {
        let row = self.source_row(view_row)?;
        let col = self.source_column(view_col)?;
        self.source.cell(row, col)
    }

    /// The visible cells of one view row
    pub fn visible_row(&self, view_row: usize) -> Result<Vec<Value>> {
        let row = self.source_row(view_row)?;
        self.visible_columns
            .iter()
            .map(|&col| self.source.cell(row, col))
            .collect()
    }

    pub fn visible_column_name(&self, view_col: usize) -> Result<String> {
        let col = self.source_column(view_col)?;
        Ok(self.column_names[col].clone())
    }

    pub fn visible_column_type(&self, view_col: usize) -> Result<DataType> {
        let col = self.source_column(view_col)?;
        self.source.column_type(col)
    }

    /// Show exactly `indices`, in that order.
    ///
    /// Fails with `InvalidColumn` for an index outside the source or one
    /// listed twice.
    pub fn set_visible_columns(&mut self, indices: &[usize]) -> Result<()> {
        let count = self.source.column_count();
        let mut seen = vec![false; count];
        for &index in indices {
            check_column(index, count)?;
            if std::mem::replace(&mut seen[index], true) {
                return Err(TableError::InvalidColumn { index, count });
            }
        }

        self.visible_columns = indices.to_vec();
        debug!("Visible columns set to {:?}", self.visible_columns);
        Ok(())
    }

    /// Show the named columns, in that order (names match case-insensitively)
    pub fn set_visible_columns_by_name<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        let indices = names
            .iter()
            .map(|name| self.source.column_index(name.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        self.set_visible_columns(&indices)
    }

    pub fn show_all_columns(&mut self) {
        self.visible_columns = (0..self.source.column_count()).collect();
    }

    /// Sort the visible rows by source column `column`.
    ///
    /// `SortDirection::None` clears the sort and restores source order over
    /// the rows the filter lets through.
    pub fn sort(&mut self, column: usize, direction: SortDirection) -> Result<()> {
        if direction == SortDirection::None {
            self.visible_rows.sort_unstable();
            self.sort_state = SortState::unsorted();
            debug!("Sort cleared");
            return Ok(());
        }

        let count = self.source.column_count();
        if column >= count {
            return Err(TableError::InvalidSortColumn { index: column, count });
        }

        let rows = self.sorted(self.visible_rows.clone(), column, direction)?;
        self.visible_rows = rows;
        self.sort_state = SortState {
            column: Some(column),
            direction,
        };
        debug!("Sorted {} rows by column {} {}", self.visible_rows.len(), column, direction);
        Ok(())
    }

    /// Sort by a column name (case-insensitive)
    pub fn sort_by_name(&mut self, name: &str, direction: SortDirection) -> Result<()> {
        let column = self.source.column_index(name)?;
        self.sort(column, direction)
    }

    fn sorted(&self, rows: Vec<usize>, column: usize, direction: SortDirection) -> Result<Vec<usize>> {
        let data_type = self.source.column_type(column)?;
        let keyed = rows
            .into_iter()
            .map(|row| Ok((row, self.source.cell(row, column)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(sort_rows(keyed, data_type, direction))
    }

    /// Replace the filter with a parsed query.
    ///
    /// Blank text clears the filter. On a parse or evaluation error the
    /// previous filter and rows stay in place.
    pub fn set_filter(&mut self, text: &str) -> Result<()> {
        match QueryParser::new(&self.column_names).parse(text)? {
            Some(query) => self.install_filter(Some(ActiveFilter::Query(query))),
            None => self.install_filter(None),
        }
    }

    /// Replace the filter with any programmatic filter
    pub fn apply_filter(&mut self, filter: Box<dyn Filter>) -> Result<()> {
        self.install_filter(Some(ActiveFilter::Custom(filter)))
    }

    pub fn clear_filter(&mut self) -> Result<()> {
        self.install_filter(None)
    }

    fn install_filter(&mut self, filter: Option<ActiveFilter>) -> Result<()> {
        let mut rows = Vec::new();
        for row in 0..self.source.row_count() {
            let keep = match &filter {
                Some(filter) => filter
                    .as_filter()
                    .evaluate(&self.source.row(row)?, &self.column_names)?,
                None => true,
            };
            if keep {
                rows.push(row);
            }
        }

        if let SortState {
            column: Some(column),
            direction,
        } = self.sort_state
        {
            if direction != SortDirection::None {
                rows = self.sorted(rows, column, direction)?;
            }
        }

        debug!(
            "Filter {:?} keeps {} of {} rows",
            filter.as_ref().map(|f| f.as_filter().description()),
            rows.len(),
            self.source.row_count()
        );
        self.visible_rows = rows;
        self.active_filter = filter;
        Ok(())
    }

    /// Owned copy of the current projections, for export
    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            source: self.source.clone(),
            rows: self.visible_rows.clone(),
            columns: self.visible_columns.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tv_data::{ColumnSpec, MemorySource};

    fn people() -> Arc<dyn DataSource> {
        let rows = [("Ann", 31), ("bob", 17), ("Cid", 45), ("dee", 17)]
            .iter()
            .map(|(name, age)| vec![Value::string(*name), Value::int(*age)])
            .collect();
        Arc::new(
            MemorySource::new(
                vec![ColumnSpec::new("name", DataType::String), ColumnSpec::new("age", DataType::Int)],
                rows,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_new_shows_everything() {
        let model = TableModel::new(people()).unwrap();
        assert_eq!(model.visible_row_indices(), &[0, 1, 2, 3]);
        assert_eq!(model.visible_column_indices(), &[0, 1]);
        assert!(!model.sort_state().is_sorted());
        assert!(model.active_query().is_none());
    }

    #[test]
    fn test_missing_or_columnless_source() {
        assert!(matches!(TableModel::try_new(None), Err(TableError::NoDataSource)));
        let empty: Arc<dyn DataSource> = Arc::new(MemorySource::new(vec![], vec![]).unwrap());
        assert!(matches!(TableModel::new(empty), Err(TableError::EmptyData(_))));
    }

    #[test]
    fn test_visible_cell_bounds() {
        let model = TableModel::new(people()).unwrap();
        assert_eq!(model.visible_cell(1, 0).unwrap(), Value::string("bob"));
        assert!(matches!(
            model.visible_cell(4, 0),
            Err(TableError::InvalidRow { index: 4, count: 4 })
        ));
        assert!(matches!(
            model.visible_cell(0, 2),
            Err(TableError::InvalidColumn { index: 2, count: 2 })
        ));
    }

    #[test]
    fn test_column_selection() {
        let mut model = TableModel::new(people()).unwrap();
        model.set_visible_columns(&[1]).unwrap();
        assert_eq!(model.visible_row(0).unwrap(), vec![Value::int(31)]);

        assert!(matches!(
            model.set_visible_columns(&[0, 0]),
            Err(TableError::InvalidColumn { index: 0, .. })
        ));
        assert!(model.set_visible_columns(&[7]).is_err());
        assert_eq!(model.visible_column_indices(), &[1]);

        model.set_visible_columns_by_name(&["AGE", "name"]).unwrap();
        assert_eq!(model.visible_column_name(0).unwrap(), "age");
        assert!(matches!(
            model.set_visible_columns_by_name(&["zip"]),
            Err(TableError::ColumnNotFound(_))
        ));

        model.show_all_columns();
        assert_eq!(model.visible_column_count(), 2);
    }

    #[test]
    fn test_sort_keeps_ties_in_source_order() {
        let mut model = TableModel::new(people()).unwrap();
        model.sort(1, SortDirection::Ascending).unwrap();
        assert_eq!(model.visible_row_indices(), &[1, 3, 0, 2]);
        model.sort(1, SortDirection::Descending).unwrap();
        assert_eq!(model.visible_row_indices(), &[2, 0, 1, 3]);
        model.sort_by_name("name", SortDirection::Ascending).unwrap();
        assert_eq!(model.visible_row_indices(), &[0, 1, 2, 3]);

        assert!(matches!(
            model.sort(9, SortDirection::Ascending),
            Err(TableError::InvalidSortColumn { index: 9, count: 2 })
        ));
    }

    #[test]
    fn test_filter_then_sort_then_clear() {
        let mut model = TableModel::new(people()).unwrap();
        model.sort(1, SortDirection::Descending).unwrap();
        model.set_filter("age < 40").unwrap();
        assert_eq!(model.visible_row_indices(), &[0, 1, 3]);
        assert_eq!(model.filter_description().unwrap(), "age < 40");

        model.sort(0, SortDirection::None).unwrap();
        assert_eq!(model.visible_row_indices(), &[0, 1, 3]);

        model.set_filter("  ").unwrap();
        assert!(model.active_query().is_none());
        assert_eq!(model.visible_row_count(), 4);
    }

    #[test]
    fn test_failed_filter_keeps_previous_state() {
        let mut model = TableModel::new(people()).unwrap();
        model.set_filter("age = 17").unwrap();
        let before = model.visible_row_indices().to_vec();

        assert!(model.set_filter("zip = 1").is_err());
        assert_eq!(model.visible_row_indices(), before.as_slice());
        assert_eq!(model.active_query().unwrap().to_string(), "age = 17");
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut model = TableModel::new(people()).unwrap();
        let snapshot = model.snapshot();
        model.set_filter("bob").unwrap();
        assert_eq!(snapshot.rows.len(), 4);
        assert_eq!(model.visible_row_count(), 1);
    }
}
