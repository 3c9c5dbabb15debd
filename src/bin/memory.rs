use std::path::Path;

use olap_cube::processor::fact_table::FactTable;
use olap_cube::{DimensionSpec, MetricSpec, build_cube};

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _profiler = dhat::Profiler::new_heap();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "data/sales_1m.csv".to_string());
    let mut facts = FactTable::new();
    facts.load_csv(Path::new(&path))?;
    facts.add_date_parts("sale_date")?;

    // Build the cube the analysis scripts read
    let cube = build_cube(
        &facts,
        &DimensionSpec::new(["sale_date", "DayOfWeek", "region", "category"])?,
        &MetricSpec::new()
            .with("sale_amount", ["sum", "mean"])
            .with("transaction_id", "count"),
    )?;

    println!(
        "Memory benchmark finished ({} cube rows). See dhat-heap.json for details",
        cube.row_count()
    );
    Ok(())
}
