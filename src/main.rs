use std::path::{Path, PathBuf};

use clap::Parser;
use jemallocator::Jemalloc;
use olap_cube::processor::fact_table::FactTable;
use olap_cube::processor::writer::write_csv;
use olap_cube::{BuildConfig, DimensionSpec, MetricSpec, build_cube_with};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// Build an OLAP cube from a sales fact table
#[derive(Parser, Debug)]
#[command(name = "olap-cube", version)]
struct Args {
    /// Fact table CSV
    #[arg(long)]
    facts: PathBuf,

    /// Dimension table to left-join onto the facts, as PATH:KEY (repeatable)
    #[arg(long = "join", value_name = "PATH:KEY")]
    joins: Vec<String>,

    /// Date column to derive DayOfWeek, Month and Year from
    #[arg(long, value_name = "COLUMN")]
    date_parts: Option<String>,

    /// Grouping columns, in output order
    #[arg(long, value_delimiter = ',', required = true)]
    dimensions: Vec<String>,

    /// Metric aggregation as COLUMN=FN or COLUMN=FN,FN (repeatable)
    #[arg(long = "metric", value_name = "COLUMN=FN[,FN]")]
    metrics: Vec<String>,

    /// Record identifier column
    #[arg(long, default_value = "transaction_id")]
    id_column: String,

    /// Aggregation threads
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Output CSV path
    #[arg(long, default_value = "data/olap_cubing_outputs/multidimensional_olap_cube.csv")]
    output: PathBuf,
}

fn load(path: &Path) -> Result<FactTable, Box<dyn std::error::Error>> {
    let mut table = FactTable::new();
    let summary = table.load_csv(path)?;
    for e in summary.errors.iter().take(10) {
        warn!(
            "{}:{} column '{}' value '{}': {}",
            path.display(),
            e.line,
            e.column,
            e.value,
            e.error.as_deref().unwrap_or("invalid")
        );
    }
    Ok(table)
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut facts = load(&args.facts)?;

    for join in &args.joins {
        let (path, key) = join
            .rsplit_once(':')
            .ok_or_else(|| format!("--join expects PATH:KEY, got '{join}'"))?;
        let right = load(Path::new(path))?;
        facts = facts.left_join(&right, key)?;
    }

    if let Some(source) = &args.date_parts {
        facts.add_date_parts(source)?;
    }

    let dimensions = DimensionSpec::new(args.dimensions)?;
    let mut metrics = MetricSpec::new();
    for assignment in &args.metrics {
        metrics.insert_assignment(assignment)?;
    }
    let config = BuildConfig::default()
        .with_id_column(args.id_column)
        .with_workers(args.workers);

    let cube = build_cube_with(&facts, &dimensions, &metrics, &config)?;
    write_csv(&cube, &args.output)?;
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("Starting OLAP cubing of {}", args.facts.display());

    if let Err(e) = run(args) {
        error!("OLAP cubing failed: {e}");
        std::process::exit(1);
    }
    info!("OLAP cubing completed successfully");
}
