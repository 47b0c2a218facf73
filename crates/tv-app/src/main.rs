//! Command-line table browser
//!
//! Opens a data file, applies an optional query, sort and column selection,
//! then prints the first rows of the view or exports the whole view.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use arrow::util::pretty::print_batches;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};

use tv_core::{CancelFlag, SortDirection};
use tv_data::{FileConfig, FileType, SqliteSource};
use tv_views::{
    export_in_background, ExportFormat, ExportMode, ExportOptions, Projection, TableModel, ViewSnapshot,
};

/// Browse, filter and export tabular data files
#[derive(Parser, Debug)]
#[command(name = "tablebrowse")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data file (CSV/TSV, JSON, Parquet or SQLite)
    file: PathBuf,

    /// Query, e.g. "age >= 18 AND city = Paris"
    #[arg(short, long)]
    filter: Option<String>,

    /// Sort column, optionally suffixed with ":asc" or ":desc"
    #[arg(short, long, value_name = "COL[:DIR]")]
    sort: Option<String>,

    /// Comma-separated columns to show, in order
    #[arg(short, long, value_delimiter = ',')]
    columns: Vec<String>,

    /// Rows to print
    #[arg(short = 'n', long, default_value = "20")]
    limit: usize,

    /// Export the view to this file instead of printing it
    #[arg(short, long, value_name = "PATH")]
    export: Option<PathBuf>,

    /// Export format (defaults to the export file extension)
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Fail the export on values that do not fit their column type
    #[arg(long)]
    strict: bool,

    /// SQLite table to open (defaults to the first table)
    #[arg(long)]
    table: Option<String>,

    /// CSV delimiter (detected from the first line when omitted)
    #[arg(long)]
    delimiter: Option<char>,

    /// List the tables of a SQLite file and exit
    #[arg(long)]
    tables: bool,

    /// Print the column names and types and exit
    #[arg(long)]
    schema: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Csv,
    Json,
    Parquet,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Parquet => ExportFormat::Parquet,
        }
    }
}

fn parse_sort(spec: &str) -> Result<(String, SortDirection)> {
    let (column, direction) = match spec.rsplit_once(':') {
        Some((column, dir)) => {
            let direction = match dir.to_lowercase().as_str() {
                "asc" => SortDirection::Ascending,
                "desc" => SortDirection::Descending,
                "none" => SortDirection::None,
                other => bail!("unknown sort direction '{}' (use asc or desc)", other),
            };
            (column, direction)
        }
        None => (spec, SortDirection::Ascending),
    };
    Ok((column.trim().to_string(), direction))
}

fn open_model(cli: &Cli) -> Result<TableModel> {
    let mut config = FileConfig::for_path(&cli.file)
        .with_context(|| format!("Cannot open {}", cli.file.display()))?;
    if let Some(delimiter) = cli.delimiter {
        config = config.with_delimiter(delimiter);
    }
    if let Some(table) = &cli.table {
        config = config.with_table(table.as_str());
    }

    let source = tv_data::load(&config).with_context(|| format!("Failed to load {}", config.file_name()))?;
    let mut model = TableModel::new(source).context("Nothing to show")?;

    if let Some(query) = &cli.filter {
        model.set_filter(query).with_context(|| format!("Bad filter '{}'", query))?;
    }
    if let Some(spec) = &cli.sort {
        let (column, direction) = parse_sort(spec)?;
        model
            .sort_by_name(&column, direction)
            .with_context(|| format!("Cannot sort by '{}'", column))?;
    }
    if !cli.columns.is_empty() {
        model
            .set_visible_columns_by_name(&cli.columns)
            .context("Bad column selection")?;
    }
    Ok(model)
}

fn print_schema(model: &TableModel) -> Result<()> {
    for (col, name) in model.column_names().iter().enumerate() {
        let data_type = model.source().column_type(col)?;
        println!("{:<24} {}", name, data_type);
    }
    let mut metadata: Vec<_> = model.source().metadata().into_iter().collect();
    metadata.sort_by(|a, b| a.0.cmp(&b.0));
    for (key, value) in metadata {
        println!("# {}: {}", key, value);
    }
    Ok(())
}

fn print_view(model: &TableModel, limit: usize) -> Result<()> {
    let total = model.visible_row_count();
    if total == 0 {
        println!("No rows match");
        return Ok(());
    }

    let mut snapshot: ViewSnapshot = model.snapshot();
    snapshot.rows.truncate(limit.max(1));
    let projection = Projection::build(&snapshot, ExportMode::Lenient, None)?;
    print_batches(&[projection.into_batch()])?;

    if let Some(filter) = model.filter_description() {
        println!("filter: {}", filter);
    }
    println!(
        "{} of {} rows, {} of {} columns",
        snapshot.rows.len(),
        total,
        model.visible_column_count(),
        model.column_names().len()
    );
    Ok(())
}

async fn export(cli: &Cli, model: &TableModel, path: PathBuf) -> Result<()> {
    let options = ExportOptions {
        format: cli.format.map(ExportFormat::from),
        mode: if cli.strict { ExportMode::Strict } else { ExportMode::Lenient },
        ..ExportOptions::default()
    };

    let cancel = CancelFlag::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling export");
                cancel.cancel();
            }
        })
    };

    let result = export_in_background(model.snapshot(), path.clone(), options, cancel).await;
    watcher.abort();

    let summary = result.with_context(|| format!("Export to {} failed", path.display()))?;
    println!(
        "Wrote {} rows x {} columns to {} ({})",
        summary.rows,
        summary.columns,
        summary.path.display(),
        summary.format.filter_name()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    info!("Opening {}", cli.file.display());

    if cli.tables {
        if FileType::detect(&cli.file) != Some(FileType::Sqlite) {
            bail!("{} is not a SQLite database", cli.file.display());
        }
        for table in SqliteSource::list_tables(&cli.file)? {
            println!("{}", table);
        }
        return Ok(());
    }

    let model = open_model(&cli)?;
    if cli.schema {
        return print_schema(&model);
    }

    match cli.export.clone() {
        Some(path) => export(&cli, &model, path).await,
        None => print_view(&model, cli.limit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sort() {
        assert_eq!(parse_sort("age").unwrap(), ("age".to_string(), SortDirection::Ascending));
        assert_eq!(
            parse_sort("age:DESC").unwrap(),
            ("age".to_string(), SortDirection::Descending)
        );
        assert_eq!(
            parse_sort("a:b:asc").unwrap(),
            ("a:b".to_string(), SortDirection::Ascending)
        );
        assert!(parse_sort("age:sideways").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "tablebrowse",
            "people.csv",
            "--filter",
            "age > 30",
            "--columns",
            "name,age",
            "--format",
            "parquet",
            "--strict",
        ])
        .unwrap();
        assert_eq!(cli.columns, vec!["name", "age"]);
        assert!(matches!(cli.format, Some(FormatArg::Parquet)));
        assert_eq!(cli.limit, 20);
        assert!(cli.strict);
    }
}
