//! # olap_cube
//!
//! `olap_cube` turns a flat table of sales facts into an explicitly named
//! OLAP cube: one row per distinct combination of dimension values, one
//! column per metric×function pair, and the list of record identifiers that
//! contributed to each row. It supports:
//!
//! - Memory-mapped CSV loading with per-column type inference (int, float, date, string)
//! - Dimension-table left joins and derived calendar dimensions
//! - Multi-key grouping with `sum`, `mean`, `count`, `min`, `max`
//! - Partition-parallel aggregation with Rayon
//! - Strict column-count validation before names are applied
//! - CSV and Arrow export, and an LRU cache of built cubes
//!
//! # Example
//!
//! ```rust
//! use olap_cube::processor::column::Column;
//! use olap_cube::processor::cube::build_cube;
//! use olap_cube::processor::definition::{DimensionSpec, MetricSpec};
//! use olap_cube::processor::fact_table::FactTable;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let facts = FactTable::from_columns(vec![
//!         ("transaction_id", Column::from(vec![1i64, 2, 3, 4])),
//!         ("region", Column::from(vec!["East", "East", "West", "West"])),
//!         ("amount", Column::from(vec![10.0, 20.0, 30.0, 40.0])),
//!     ])?;
//!
//!     let cube = build_cube(
//!         &facts,
//!         &DimensionSpec::new(["region"])?,
//!         &MetricSpec::new()
//!             .with("amount", ["sum", "mean"])
//!             .with("transaction_id", "count"),
//!     )?;
//!
//!     assert_eq!(
//!         cube.column_names(),
//!         ["region", "amount_sum", "amount_mean", "transaction_id_count", "transaction_id"]
//!     );
//!     for row in cube.rows() {
//!         println!("{:?} => {:?}", row.key(), row.contributions());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod processor;

pub use processor::cube::{BuildConfig, Cube, build_cube, build_cube_with};
pub use processor::definition::{DimensionSpec, MetricSpec};
pub use processor::fact_table::FactTable;
pub use processor::naming::{name_columns, name_columns_with};
pub use processor::{AggregateOp, CubeError, Value};
