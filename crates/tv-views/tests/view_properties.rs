use std::fs;
use std::sync::Arc;

use arrow::array::Array;
use arrow::datatypes::DataType as ArrowType;
use tv_core::{CancelFlag, DataSource, DataType, SortDirection, TableError, Value};
use tv_data::{ArrowSource, ColumnSpec, MemorySource};
use tv_views::{
    export_in_background, export_to_path, CompOp, CompositeFilter, ExportFormat, ExportMode, ExportOptions,
    Expression, Filter, LogicOp, Projection, TableModel,
};

fn staff() -> Arc<dyn DataSource> {
    let rows = vec![
        vec![Value::string("Bob Smith"), Value::string("Designer"), Value::int(17)],
        vec![Value::string("Ann Lee"), Value::string("Engineer"), Value::int(18)],
        vec![Value::string("Cid Moss"), Value::null(DataType::String), Value::int(64)],
        vec![Value::string("Dee Park"), Value::string("Manager"), Value::int(65)],
    ];
    Arc::new(
        MemorySource::new(
            vec![
                ColumnSpec::new("name", DataType::String),
                ColumnSpec::new("role", DataType::String),
                ColumnSpec::new("age", DataType::Int),
            ],
            rows,
        )
        .unwrap(),
    )
}

fn nested() -> Arc<dyn DataSource> {
    let point = |x: i64, label: &str| {
        Value::structure(vec![
            ("x".to_string(), Value::int(x)),
            ("label".to_string(), Value::string(label)),
        ])
    };
    let rows = vec![
        vec![Value::int(1), point(3, "a"), Value::list(vec![Value::int(1), Value::int(2)])],
        vec![Value::int(2), Value::null(DataType::Struct), Value::list(vec![])],
        vec![Value::int(3), point(5, "c"), Value::null(DataType::List)],
    ];
    Arc::new(
        MemorySource::new(
            vec![
                ColumnSpec::new("id", DataType::Int),
                ColumnSpec::new("point", DataType::Struct),
                ColumnSpec::new("tags", DataType::List),
            ],
            rows,
        )
        .unwrap(),
    )
}

#[test]
fn visible_cells_match_the_source() {
    let source = staff();
    let mut model = TableModel::new(source.clone()).unwrap();
    model.set_filter("age > 17").unwrap();
    model.sort_by_name("name", SortDirection::Descending).unwrap();
    model.set_visible_columns(&[2, 1]).unwrap();

    for view_row in 0..model.visible_row_count() {
        for view_col in 0..model.visible_column_count() {
            let row = model.visible_row_indices()[view_row];
            let col = model.visible_column_indices()[view_col];
            let expected = source.cell(row, col).unwrap();
            let actual = model.visible_cell(view_row, view_col).unwrap();
            assert_eq!(actual.data_type(), expected.data_type());
            assert_eq!(actual.is_null(), expected.is_null());
            assert_eq!(actual, expected);
        }
    }
}

#[test]
fn reverse_sort_reverses_and_none_restores_order() {
    let mut model = TableModel::new(staff()).unwrap();
    model.set_filter("age < 65").unwrap();

    model.sort(2, SortDirection::Ascending).unwrap();
    let ascending = model.visible_row_indices().to_vec();
    model.sort(2, SortDirection::Descending).unwrap();
    let mut descending = model.visible_row_indices().to_vec();
    descending.reverse();
    assert_eq!(ascending, descending);

    model.sort(0, SortDirection::Descending).unwrap();
    model.sort(0, SortDirection::None).unwrap();
    assert_eq!(model.visible_row_indices(), &[0, 1, 2]);
    assert!(!model.sort_state().is_sorted());
}

#[test]
fn filtering_is_idempotent() {
    let mut model = TableModel::new(staff()).unwrap();
    model.set_filter("role = designer OR age >= 65").unwrap();
    let once = model.visible_row_indices().to_vec();
    model.set_filter("role = designer OR age >= 65").unwrap();
    assert_eq!(model.visible_row_indices(), once.as_slice());
    assert_eq!(once, vec![0, 3]);
}

#[test]
fn empty_composite_matches_every_row() {
    for logic in [LogicOp::And, LogicOp::Or] {
        let mut model = TableModel::new(staff()).unwrap();
        model.apply_filter(Box::new(CompositeFilter::new(logic))).unwrap();
        assert_eq!(model.visible_row_count(), 4);
    }
}

#[test]
fn range_query_selects_inner_ages() {
    let mut model = TableModel::new(staff()).unwrap();
    model.set_filter("age >= 18 AND age < 65").unwrap();
    let ages: Vec<Value> = (0..model.visible_row_count())
        .map(|row| model.visible_cell(row, 2).unwrap())
        .collect();
    assert_eq!(ages, vec![Value::int(18), Value::int(64)]);
}

#[test]
fn search_terms_ignore_case() {
    let columns = vec!["name".to_string(), "role".to_string()];
    let row = vec![Value::string("Bob Smith"), Value::string("Designer")];
    for term in ["bob", "BOB"] {
        assert!(Expression::search(term).evaluate(&row, &columns).unwrap());
    }

    let mut model = TableModel::new(staff()).unwrap();
    model.set_filter("BOB").unwrap();
    assert_eq!(model.visible_row_indices(), &[0]);
}

#[test]
fn visible_columns_follow_the_given_order() {
    let mut model = TableModel::new(staff()).unwrap();
    model.set_visible_columns(&[2, 0]).unwrap();
    let names: Vec<String> = (0..model.visible_column_count())
        .map(|col| model.visible_column_name(col).unwrap())
        .collect();
    assert_eq!(names, vec!["age", "name"]);
    assert_eq!(model.visible_column_type(0).unwrap(), DataType::Int);
}

#[test]
fn export_needs_visible_rows_and_keeps_nulls() {
    let mut model = TableModel::new(staff()).unwrap();
    model.set_filter("age > 100").unwrap();
    assert!(matches!(
        Projection::from_model(&model, ExportMode::Lenient, None),
        Err(TableError::EmptyData(_))
    ));

    model.clear_filter().unwrap();
    let projection = Projection::from_model(&model, ExportMode::Strict, None).unwrap();
    let roles = projection.batch().column(1);
    assert!(roles.is_null(2));
    assert!(roles.is_valid(0));
}

#[test]
fn bad_queries_leave_previous_rows() {
    let mut model = TableModel::new(staff()).unwrap();
    model.set_filter("age < 60").unwrap();
    let before = model.visible_row_indices().to_vec();

    for text in ["price >", "bogus = 1"] {
        assert!(matches!(model.set_filter(text), Err(TableError::InvalidFilter(_))));
        assert_eq!(model.visible_row_indices(), before.as_slice());
    }
    assert_eq!(model.filter_description().unwrap(), "age < 60");
}

#[test]
fn composite_of_query_expressions() {
    let mut model = TableModel::new(staff()).unwrap();
    let older_moss = CompositeFilter::new(LogicOp::And)
        .with(Expression::compare("age", CompOp::Greater, "60"))
        .with(Expression::search("moss"));
    let filter = CompositeFilter::new(LogicOp::Or)
        .with(Expression::search("manager"))
        .with(older_moss);
    model.apply_filter(Box::new(filter)).unwrap();
    assert_eq!(model.visible_row_indices(), &[2, 3]);
    assert!(model.active_query().is_none());
}

#[test]
fn nested_columns_survive_export() {
    let model = TableModel::new(nested()).unwrap();
    let projection = Projection::from_model(&model, ExportMode::Strict, None).unwrap();
    let schema = projection.batch().schema();
    assert!(matches!(schema.field(1).data_type(), ArrowType::Struct(fields) if fields.len() == 2));
    assert!(matches!(schema.field(2).data_type(), ArrowType::List(_)));
    assert!(projection.batch().column(1).is_null(1));
    assert!(projection.batch().column(2).is_null(2));

    let dir = tempfile::tempdir().unwrap();
    let parquet_path = dir.path().join("nested.parquet");
    let summary = export_to_path(&model.snapshot(), &parquet_path, &ExportOptions::default(), None).unwrap();
    assert_eq!(summary.format, ExportFormat::Parquet);
    assert_eq!(summary.rows, 3);

    let reopened = ArrowSource::from_parquet(&parquet_path).unwrap();
    for (read, written) in reopened.batch().schema().fields().iter().zip(schema.fields()) {
        assert_eq!(read.data_type(), written.data_type());
    }
    assert_eq!(reopened.column_type(1).unwrap(), DataType::Struct);
    assert_eq!(reopened.column_type(2).unwrap(), DataType::List);
    assert!(reopened.cell(1, 1).unwrap().is_null());

    let csv_path = dir.path().join("nested.csv");
    export_to_path(&model.snapshot(), &csv_path, &ExportOptions::default(), None).unwrap();
    let text = fs::read_to_string(&csv_path).unwrap();
    assert_eq!(text.lines().count(), 4);
    assert!(text.starts_with("id,point,tags\n"));
}

#[test]
fn export_writes_the_view_in_view_order() {
    let mut model = TableModel::new(staff()).unwrap();
    model.set_filter("age >= 18").unwrap();
    model.sort(2, SortDirection::Descending).unwrap();
    model.set_visible_columns_by_name(&["age", "role"]).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.csv");
    let summary = export_to_path(&model.snapshot(), &path, &ExportOptions::default(), None).unwrap();
    assert_eq!((summary.rows, summary.columns), (3, 2));
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "age,role\n65,Manager\n64,\n18,Engineer\n"
    );

    let json_path = dir.path().join("out.json");
    export_to_path(&model.snapshot(), &json_path, &ExportOptions::default(), None).unwrap();
    let records: serde_json::Value = serde_json::from_slice(&fs::read(&json_path).unwrap()).unwrap();
    assert_eq!(records[1], serde_json::json!({"age": 64, "role": null}));
}

#[test]
fn failed_export_creates_no_file() {
    let mut model = TableModel::new(staff()).unwrap();
    model.set_filter("age > 100").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.csv");
    assert!(matches!(
        export_to_path(&model.snapshot(), &path, &ExportOptions::default(), None),
        Err(TableError::EmptyData(_))
    ));
    assert!(!path.exists());

    assert!(matches!(
        export_to_path(&model.snapshot(), &dir.path().join("out.xyz"), &ExportOptions::default(), None),
        Err(TableError::ExportFailed(_))
    ));
}

#[tokio::test]
async fn background_export_completes() {
    let model = TableModel::new(staff()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("staff.txt");
    let options = ExportOptions {
        format: Some(ExportFormat::Csv),
        csv_delimiter: b'\t',
        csv_header: false,
        ..ExportOptions::default()
    };

    let summary = export_in_background(model.snapshot(), path.clone(), options, CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(summary.rows, 4);
    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().next().unwrap(), "Bob Smith\tDesigner\t17");
}

#[tokio::test]
async fn cancelled_background_export() {
    let model = TableModel::new(staff()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("staff.parquet");
    let cancel = CancelFlag::new();
    cancel.cancel();

    let result = export_in_background(model.snapshot(), path.clone(), ExportOptions::default(), cancel).await;
    assert!(matches!(result, Err(TableError::Cancelled)));
    assert!(!path.exists());
}

#[test]
fn nan_scores_match_no_range_query() {
    let source: Arc<dyn DataSource> = Arc::new(
        MemorySource::new(
            vec![ColumnSpec::new("score", DataType::Float)],
            vec![vec![Value::float(f64::NAN)], vec![Value::float(3.0)]],
        )
        .unwrap(),
    );
    let mut model = TableModel::new(source).unwrap();
    for (query, expected) in [
        ("score >= 5", Vec::<usize>::new()),
        ("score <= 1", vec![]),
        ("score > 1", vec![1]),
        ("score < 5", vec![1]),
    ] {
        model.set_filter(query).unwrap();
        assert_eq!(model.visible_row_indices(), expected.as_slice(), "{}", query);
    }
}

#[test]
fn json_struct_members_from_every_record_export_strictly() {
    let source: Arc<dyn DataSource> =
        Arc::new(MemorySource::from_json_str(r#"[{"info": {"x": 1}}, {"info": {"y": 2}}]"#).unwrap());
    let model = TableModel::new(source).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("info.json");
    let options = ExportOptions {
        mode: ExportMode::Strict,
        ..ExportOptions::default()
    };
    export_to_path(&model.snapshot(), &path, &options, None).unwrap();

    let records: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(
        records,
        serde_json::json!([
            {"info": {"x": 1, "y": null}},
            {"info": {"x": null, "y": 2}}
        ])
    );
}
