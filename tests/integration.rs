use std::collections::HashSet;
use std::rc::Rc;

use olap_cube::processor::column::Column;
use olap_cube::processor::cube::ColumnData;
use olap_cube::processor::cube_builder::CubeCache;
use olap_cube::processor::writer::write_csv_to;
use olap_cube::{
    BuildConfig, CubeError, DimensionSpec, FactTable, MetricSpec, Value, build_cube,
    build_cube_with, name_columns,
};

fn four_sales() -> FactTable {
    FactTable::from_columns(vec![
        ("transaction_id", Column::from(vec![1i64, 2, 3, 4])),
        ("id", Column::from(vec![1i64, 2, 3, 4])),
        ("region", Column::from(vec!["East", "East", "West", "West"])),
        ("store", Column::from(vec!["E1", "E2", "W1", "W1"])),
        ("amount", Column::from(vec![10.0, 20.0, 30.0, 40.0])),
    ])
    .unwrap()
}

#[test]
fn test_naming_example() {
    let dims = DimensionSpec::new(["region", "day"]).unwrap();
    let metrics = MetricSpec::new().with("amount", ["sum", "mean"]);
    assert_eq!(
        name_columns(&dims, &metrics),
        vec!["region", "day", "amount_sum", "amount_mean", "transaction_id"]
    );
}

#[test]
fn test_region_scenario() {
    let cube = build_cube(
        &four_sales(),
        &DimensionSpec::new(["region"]).unwrap(),
        &MetricSpec::new().with("amount", ["sum"]).with("id", "count"),
    )
    .unwrap();

    assert_eq!(
        cube.column_names(),
        vec!["region", "amount_sum", "id_count", "transaction_id"]
    );
    assert_eq!(cube.row_count(), 2);

    let east = cube.find(&[Value::from("East")]).unwrap();
    assert_eq!(east.get("amount_sum"), Some(&Value::Float(30.0)));
    assert_eq!(east.get("id_count"), Some(&Value::Int(2)));
    assert_eq!(east.contributions(), [Value::Int(1), Value::Int(2)]);

    let west = cube.find(&[Value::from("West")]).unwrap();
    assert_eq!(west.get("amount_sum"), Some(&Value::Float(70.0)));
    assert_eq!(west.get("id_count"), Some(&Value::Int(2)));
    assert_eq!(west.contributions(), [Value::Int(3), Value::Int(4)]);
}

#[test]
fn test_multi_key_splits_east() {
    let facts = four_sales();
    let metrics = MetricSpec::new().with("amount", "sum");
    let by_region = build_cube(&facts, &DimensionSpec::new(["region"]).unwrap(), &metrics).unwrap();
    let by_store =
        build_cube(&facts, &DimensionSpec::new(["region", "store"]).unwrap(), &metrics).unwrap();

    let east_rows: Vec<_> = by_store
        .rows()
        .filter(|r| r.key()[0] == &Value::from("East"))
        .collect();
    assert_eq!(east_rows.len(), 2);

    let mut split_ids: Vec<Value> = east_rows
        .iter()
        .flat_map(|r| r.contributions().iter().cloned())
        .collect();
    split_ids.sort();
    let original = by_region.find(&[Value::from("East")]).unwrap();
    assert_eq!(split_ids, original.contributions());

    let west_rows = by_store
        .rows()
        .filter(|r| r.key()[0] == &Value::from("West"))
        .count();
    assert_eq!(west_rows, 1);
}

#[test]
fn test_unknown_function_names_it() {
    let result = build_cube(
        &four_sales(),
        &DimensionSpec::new(["region"]).unwrap(),
        &MetricSpec::new().with("amount", "median"),
    );
    match result {
        Err(CubeError::UnknownAggregation { metric, function }) => {
            assert_eq!(metric, "amount");
            assert_eq!(function, "median");
        }
        other => panic!("Expected UnknownAggregation, got {other:?}"),
    }
}

#[test]
fn test_empty_facts_give_empty_cube_with_headers() {
    let facts = FactTable::from_columns(vec![
        ("transaction_id", Column::from(Vec::<i64>::new())),
        ("region", Column::from(Vec::<&str>::new())),
        ("amount", Column::from(Vec::<f64>::new())),
    ])
    .unwrap();
    let cube = build_cube(
        &facts,
        &DimensionSpec::new(["region"]).unwrap(),
        &MetricSpec::new().with("amount", ["sum", "mean"]),
    )
    .unwrap();

    assert!(cube.is_empty());
    assert_eq!(
        cube.column_names(),
        vec!["region", "amount_sum", "amount_mean", "transaction_id"]
    );

    let mut out = Vec::new();
    write_csv_to(&cube, &mut out).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "region,amount_sum,amount_mean,transaction_id\n"
    );
}

fn mixed_sales() -> FactTable {
    let n = 200i64;
    let regions = ["East", "West", "North"];
    let days = ["Mon", "Tue", "Wed", "Thu", "Fri"];
    FactTable::from_columns(vec![
        ("transaction_id", Column::from((0..n).map(|i| 1000 + i).collect::<Vec<_>>())),
        (
            "region",
            Column::from(
                (0..n)
                    .map(|i| (i % 7 != 0).then_some(regions[(i % 3) as usize]))
                    .collect::<Vec<_>>(),
            ),
        ),
        (
            "day",
            Column::from((0..n).map(|i| days[(i * 7 % 5) as usize]).collect::<Vec<_>>()),
        ),
        (
            "amount",
            Column::from(
                (0..n)
                    .map(|i| {
                        // large terms of both signs make the sum depend on fold order
                        let magnitude = 1e15 * ((i % 3) as f64 - 1.0);
                        (i % 11 != 0).then_some(magnitude + 0.1 * i as f64)
                    })
                    .collect::<Vec<_>>(),
            ),
        ),
        ("units", Column::from((0..n).map(|i| i % 4).collect::<Vec<_>>())),
    ])
    .unwrap()
}

#[test]
fn test_determinism_across_runs_and_workers() {
    let facts = mixed_sales();
    let dims = DimensionSpec::new(["region", "day"]).unwrap();
    let metrics = MetricSpec::new()
        .with("amount", ["sum", "mean", "min", "max"])
        .with("units", ["sum", "count"]);

    let baseline = build_cube(&facts, &dims, &metrics).unwrap();
    let mut baseline_csv = Vec::new();
    write_csv_to(&baseline, &mut baseline_csv).unwrap();

    for workers in [1, 2, 5, 16] {
        let config = BuildConfig::default().with_workers(workers);
        let cube = build_cube_with(&facts, &dims, &metrics, &config).unwrap();
        let mut csv = Vec::new();
        write_csv_to(&cube, &mut csv).unwrap();
        assert_eq!(csv, baseline_csv, "workers = {workers}");
    }
}

#[test]
fn test_parallel_float_sums_match_single_worker() {
    let facts = FactTable::from_columns(vec![
        ("transaction_id", Column::from(vec![1i64, 2, 3, 4])),
        ("region", Column::from(vec!["East"; 4])),
        ("amount", Column::from(vec![1e16, 1.0, -1e16, 1.0])),
    ])
    .unwrap();
    let dims = DimensionSpec::new(["region"]).unwrap();
    let metrics = MetricSpec::new().with("amount", "sum");

    let single = build_cube(&facts, &dims, &metrics).unwrap();
    assert_eq!(single.row(0).unwrap().get("amount_sum"), Some(&Value::Float(1.0)));
    let parallel =
        build_cube_with(&facts, &dims, &metrics, &BuildConfig::default().with_workers(2)).unwrap();
    assert_eq!(parallel, single);
}

#[test]
fn test_partition_completeness_and_column_count() {
    let facts = mixed_sales();
    let dims = DimensionSpec::new(["region", "day"]).unwrap();
    let metrics = MetricSpec::new()
        .with("amount", ["sum", "mean"])
        .with("units", "count");
    let cube = build_cube(&facts, &dims, &metrics).unwrap();

    assert_eq!(cube.columns().len(), dims.len() + metrics.output_width() + 1);
    assert!(matches!(
        cube.columns().last().map(|c| &c.data),
        Some(ColumnData::List(_))
    ));

    // One row per distinct key, no key twice
    let region = facts.get_col("region").unwrap();
    let day = facts.get_col("day").unwrap();
    let distinct: HashSet<(Value, Value)> = (0..facts.row_count())
        .map(|r| (region.value(r), day.value(r)))
        .collect();
    assert_eq!(cube.row_count(), distinct.len());

    // Contribution lists partition the id set
    let mut seen = HashSet::new();
    let ids = facts.get_col("transaction_id").unwrap();
    for row in cube.rows() {
        let key = row.key();
        for id in row.contributions() {
            assert!(seen.insert(id.clone()), "id {id} listed twice");
            let fact_row = (0..facts.row_count())
                .find(|&r| &ids.value(r) == id)
                .unwrap();
            assert_eq!(&region.value(fact_row), key[0]);
            assert_eq!(&day.value(fact_row), key[1]);
        }
        assert_eq!(
            row.get("units_count"),
            Some(&Value::Int(row.contributions().len() as i64))
        );
    }
    assert_eq!(seen.len(), facts.row_count());
}

#[test]
fn test_mean_excludes_missing_values() {
    let facts = FactTable::from_columns(vec![
        ("transaction_id", Column::from(vec![1i64, 2, 3])),
        ("region", Column::from(vec!["East", "East", "East"])),
        ("amount", Column::from(vec![Some(10.0), None, Some(20.0)])),
    ])
    .unwrap();
    let cube = build_cube(
        &facts,
        &DimensionSpec::new(["region"]).unwrap(),
        &MetricSpec::new().with("amount", ["sum", "mean", "count"]),
    )
    .unwrap();
    let east = cube.row(0).unwrap();
    assert_eq!(east.get("amount_sum"), Some(&Value::Float(30.0)));
    assert_eq!(east.get("amount_mean"), Some(&Value::Float(15.0)));
    assert_eq!(east.get("amount_count"), Some(&Value::Int(3)));
}

#[test]
fn test_csv_pipeline_with_enrichment() {
    use std::io::Write;
    use tempfile::NamedTempFile;

    let mut sales = NamedTempFile::new().unwrap();
    write!(
        sales,
        "transaction_id,sale_date,customer_id,sale_amount\n\
         1,2024-01-15,1001,100\n\
         2,2024-01-15,1002,50\n\
         3,2024-01-16,1001,25.5\n\
         4,2024-01-22,1002,10.0\n"
    )
    .unwrap();
    let mut customers = NamedTempFile::new().unwrap();
    write!(customers, "customer_id,region\n1001,East\n1002,West\n").unwrap();

    let mut facts = FactTable::new();
    let summary = facts.load_csv(sales.path()).unwrap();
    assert!(summary.errors.is_empty());
    let mut customer_table = FactTable::new();
    customer_table.load_csv(customers.path()).unwrap();

    let mut facts = facts.left_join(&customer_table, "customer_id").unwrap();
    facts.add_date_parts("sale_date").unwrap();

    let facts = Rc::new(facts);
    let cache = Rc::new(CubeCache::new());
    let cube = facts
        .cube_with_cache(&cache)
        .dimensions(vec!["DayOfWeek", "region"])
        .metrics("sale_amount", vec!["sum", "mean"])
        .metric("transaction_id", "count")
        .build()
        .unwrap();

    let mut out = Vec::new();
    write_csv_to(&cube, &mut out).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "DayOfWeek,region,sale_amount_sum,sale_amount_mean,transaction_id_count,transaction_id\n\
         Monday,East,100.0,100.0,1,[1]\n\
         Monday,West,60.0,30.0,2,\"[2, 4]\"\n\
         Tuesday,East,25.5,25.5,1,[3]\n"
    );
}
