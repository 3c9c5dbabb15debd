use std::fs::File;
use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::processor::cube::{ColumnData, Cube};
use crate::processor::{CubeError, Value};

/// Writes the cube as CSV: a header row, then one row per partition.
///
/// Contribution lists are rendered as `[1, 2]` or `['a', 'b']`.
pub fn write_csv(cube: &Cube, path: &Path) -> Result<(), CubeError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    write_csv_to(cube, file)?;
    info!("OLAP cube saved to {}", path.display());
    Ok(())
}

pub fn write_csv_to<W: Write>(cube: &Cube, writer: W) -> Result<(), CubeError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(cube.column_names())?;

    let mut record = Vec::with_capacity(cube.columns().len());
    for row in 0..cube.row_count() {
        record.clear();
        for column in cube.columns() {
            record.push(match &column.data {
                ColumnData::Scalar(values) => values[row].to_string(),
                ColumnData::List(lists) => render_list(&lists[row]),
            });
        }
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

fn render_list(values: &[Value]) -> String {
    let items: Vec<String> = values
        .iter()
        .map(|v| match v {
            Value::Str(s) => format!("'{s}'"),
            Value::Date(_) => format!("'{v}'"),
            Value::Null => "None".to_string(),
            other => other.to_string(),
        })
        .collect();
    format!("[{}]", items.join(", "))
}
