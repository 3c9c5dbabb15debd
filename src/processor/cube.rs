use std::collections::HashSet;
use std::sync::Arc;

use arrow2::{
    array::{
        Array, Float64Array, Int64Array, ListArray, MutableListArray, MutableUtf8Array, TryExtend,
        Utf8Array,
    },
    chunk::Chunk,
    datatypes::{Field, Schema},
};
use tracing::{debug, error, info};

use crate::processor::aggregator::aggregate;
use crate::processor::contribution::collect_contributions;
use crate::processor::definition::{DimensionSpec, MetricSpec, ResolvedMetric};
use crate::processor::fact_table::FactTable;
use crate::processor::naming::name_columns_with;
use crate::processor::{CubeError, Value};

/// Naming conventions and execution settings for a cube build
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildConfig {
    /// Fact column holding the record identifier
    pub id_column: String,
    /// Output column holding the contributing identifiers
    pub contribution_column: String,
    /// Joins metric and function in output names
    pub separator: char,
    /// Aggregation threads; 1 runs single-threaded
    pub workers: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            id_column: "transaction_id".to_string(),
            contribution_column: "transaction_id".to_string(),
            separator: '_',
            workers: 1,
        }
    }
}

impl BuildConfig {
    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    pub fn with_contribution_column(mut self, column: impl Into<String>) -> Self {
        self.contribution_column = column.into();
        self
    }

    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

/// Cells of one cube column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// One value per row (dimensions and metrics)
    Scalar(Vec<Value>),
    /// One list per row (contributing identifiers)
    List(Vec<Vec<Value>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Scalar(v) => v.len(),
            ColumnData::List(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CubeColumn {
    pub name: String,
    pub data: ColumnData,
}

/// The aggregated output table: one row per distinct dimension tuple,
/// ordered by that tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct Cube {
    columns: Vec<CubeColumn>,
    dimension_count: usize,
    row_count: usize,
}

impl Cube {
    /// Names positional columns after validating the shape.
    ///
    /// `names` and `data` must have the same length, every column the same
    /// number of rows and every name must be unique. The first
    /// `dimension_count` columns and the metric columns after them are
    /// scalar; the last column is the list of contributing identifiers.
    pub fn from_columns(
        names: Vec<String>,
        data: Vec<ColumnData>,
        dimension_count: usize,
    ) -> Result<Self, CubeError> {
        if names.len() != data.len() {
            error!(
                "Column length mismatch: cube has {}, expected {}",
                data.len(),
                names.len()
            );
            return Err(CubeError::SchemaMismatch {
                expected: names.len(),
                actual: data.len(),
            });
        }

        if data.len() <= dimension_count {
            error!(
                "Cube needs {} dimension column(s) plus identifiers, got {} column(s)",
                dimension_count,
                data.len()
            );
            return Err(CubeError::SchemaMismatch {
                expected: dimension_count + 1,
                actual: data.len(),
            });
        }
        let last = data.len() - 1;
        for (index, (name, column)) in names.iter().zip(&data).enumerate() {
            match (index == last, column) {
                (true, ColumnData::Scalar(_)) => {
                    return Err(CubeError::MalformedCube {
                        column: name.clone(),
                        reason: "must hold identifier lists",
                    });
                }
                (false, ColumnData::List(_)) => {
                    return Err(CubeError::MalformedCube {
                        column: name.clone(),
                        reason: "must hold one value per row",
                    });
                }
                _ => {}
            }
        }

        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(CubeError::DuplicateColumn(name.clone()));
            }
        }

        let row_count = data.first().map_or(0, ColumnData::len);
        for (name, column) in names.iter().zip(&data) {
            if column.len() != row_count {
                return Err(CubeError::RaggedColumn {
                    column: name.clone(),
                    expected: row_count,
                    actual: column.len(),
                });
            }
        }

        let columns = names
            .into_iter()
            .zip(data)
            .map(|(name, data)| CubeColumn { name, data })
            .collect();

        Ok(Cube {
            columns,
            dimension_count,
            row_count,
        })
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn columns(&self) -> &[CubeColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&CubeColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn dimension_names(&self) -> Vec<&str> {
        self.columns[..self.dimension_count]
            .iter()
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn row(&self, index: usize) -> Option<CubeRow<'_>> {
        (index < self.row_count).then_some(CubeRow { cube: self, index })
    }

    pub fn rows(&self) -> impl Iterator<Item = CubeRow<'_>> + '_ {
        (0..self.row_count).map(move |index| CubeRow { cube: self, index })
    }

    /// Row whose dimension values equal `key`
    pub fn find(&self, key: &[Value]) -> Option<CubeRow<'_>> {
        self.rows().find(|row| {
            key.len() == self.dimension_count
                && row.key().into_iter().zip(key).all(|(a, b)| a == b)
        })
    }

    /// Exports the cube as an arrow2 chunk.
    ///
    /// Scalar columns become int64, float64 or utf8 arrays depending on the
    /// values they hold; the contribution column becomes a list of utf8.
    pub fn to_arrow(&self) -> Result<(Schema, Chunk<Arc<dyn Array>>), CubeError> {
        let mut fields = Vec::with_capacity(self.columns.len());
        let mut arrays: Vec<Arc<dyn Array>> = Vec::with_capacity(self.columns.len());

        for column in &self.columns {
            let array: Arc<dyn Array> = match &column.data {
                ColumnData::Scalar(values) => scalar_array(values),
                ColumnData::List(lists) => {
                    let mut arr = MutableListArray::<i32, MutableUtf8Array<i32>>::new();
                    arr.try_extend(lists.iter().map(|ids| {
                        Some(ids.iter().map(|id| Some(id.to_string())).collect::<Vec<_>>())
                    }))?;
                    Arc::new(ListArray::<i32>::from(arr))
                }
            };
            fields.push(Field::new(&column.name, array.data_type().clone(), true));
            arrays.push(array);
        }

        Ok((Schema::from(fields), Chunk::try_new(arrays)?))
    }
}

fn scalar_array(values: &[Value]) -> Arc<dyn Array> {
    let non_null = || values.iter().filter(|v| !v.is_null());
    if non_null().all(|v| matches!(v, Value::Int(_))) {
        let ints: Vec<Option<i64>> = values
            .iter()
            .map(|v| match v {
                Value::Int(i) => Some(*i),
                _ => None,
            })
            .collect();
        Arc::new(Int64Array::from(ints))
    } else if non_null().all(|v| matches!(v, Value::Int(_) | Value::Float(_))) {
        let floats: Vec<Option<f64>> = values
            .iter()
            .map(|v| match v {
                Value::Int(i) => Some(*i as f64),
                Value::Float(f) => Some(*f),
                _ => None,
            })
            .collect();
        Arc::new(Float64Array::from(floats))
    } else {
        let mut arr = MutableUtf8Array::<i32>::with_capacity(values.len());
        for v in values {
            match v {
                Value::Null => arr.push::<&str>(None),
                other => arr.push(Some(other.to_string())),
            }
        }
        let array: Utf8Array<i32> = arr.into();
        Arc::new(array)
    }
}

/// Borrowed view of one cube row
#[derive(Debug, Clone, Copy)]
pub struct CubeRow<'a> {
    cube: &'a Cube,
    index: usize,
}

impl<'a> CubeRow<'a> {
    /// Dimension values, in dimension order
    pub fn key(&self) -> Vec<&'a Value> {
        self.cube.columns[..self.cube.dimension_count]
            .iter()
            .filter_map(|c| self.scalar(c))
            .collect()
    }

    /// Scalar cell by column name
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.scalar(self.cube.column(name)?)
    }

    /// Identifiers of the fact rows summarized by this row
    pub fn contributions(&self) -> &'a [Value] {
        match self.cube.columns.last().map(|c| &c.data) {
            Some(ColumnData::List(lists)) => lists[self.index].as_slice(),
            _ => &[],
        }
    }

    fn scalar(&self, column: &'a CubeColumn) -> Option<&'a Value> {
        match &column.data {
            ColumnData::Scalar(values) => values.get(self.index),
            ColumnData::List(_) => None,
        }
    }
}

/// Builds a cube using the default [`BuildConfig`].
///
/// # Example
/// ```rust
/// # use olap_cube::processor::column::Column;
/// # use olap_cube::processor::cube::build_cube;
/// # use olap_cube::processor::definition::{DimensionSpec, MetricSpec};
/// # use olap_cube::processor::fact_table::FactTable;
/// # use olap_cube::processor::Value;
/// let facts = FactTable::from_columns(vec![
///     ("transaction_id", Column::from(vec![1i64, 2, 3])),
///     ("region", Column::from(vec!["East", "West", "East"])),
///     ("amount", Column::from(vec![10.0, 5.0, 20.0])),
/// ])
/// .unwrap();
/// let cube = build_cube(
///     &facts,
///     &DimensionSpec::new(["region"]).unwrap(),
///     &MetricSpec::new().with("amount", ["sum", "mean"]),
/// )
/// .unwrap();
/// let east = cube.find(&[Value::from("East")]).unwrap();
/// assert_eq!(east.get("amount_sum"), Some(&Value::Float(30.0)));
/// assert_eq!(east.contributions(), [Value::Int(1), Value::Int(3)]);
/// ```
pub fn build_cube(
    facts: &FactTable,
    dimensions: &DimensionSpec,
    metrics: &MetricSpec,
) -> Result<Cube, CubeError> {
    build_cube_with(facts, dimensions, metrics, &BuildConfig::default())
}

/// Builds a cube: aggregates, collects contributions, joins both by
/// partition key and names the columns after checking the column count.
pub fn build_cube_with(
    facts: &FactTable,
    dimensions: &DimensionSpec,
    metrics: &MetricSpec,
    config: &BuildConfig,
) -> Result<Cube, CubeError> {
    let resolved = validate(facts, dimensions, metrics, config)?;
    debug!(
        "Building cube over {} rows: dimensions {:?}, {} metric column(s)",
        facts.row_count(),
        dimensions.names(),
        metrics.output_width()
    );

    let aggregates = aggregate(facts, dimensions, &resolved, config.workers)?;
    let mut contributions =
        collect_contributions(facts, dimensions, &config.id_column, config.workers)?;

    if aggregates.len() != contributions.len() {
        error!(
            "Partition count mismatch: {} aggregated, {} with contributions",
            aggregates.len(),
            contributions.len()
        );
    }

    // Join on partition key
    let width = metrics.output_width();
    let mut dim_data: Vec<Vec<Value>> = vec![Vec::with_capacity(aggregates.len()); dimensions.len()];
    let mut metric_data: Vec<Vec<Value>> = vec![Vec::with_capacity(aggregates.len()); width];
    let mut id_data: Vec<Vec<Value>> = Vec::with_capacity(aggregates.len());

    for (key, results) in aggregates {
        let ids = contributions
            .remove(&key)
            .ok_or_else(|| CubeError::PartitionMismatch {
                key: key.to_string(),
            })?;
        for (column, value) in dim_data.iter_mut().zip(key.0) {
            column.push(value);
        }
        for (column, result) in metric_data.iter_mut().zip(results) {
            column.push(result.into());
        }
        id_data.push(ids);
    }
    if let Some((key, _)) = contributions.into_iter().next() {
        return Err(CubeError::PartitionMismatch {
            key: key.to_string(),
        });
    }

    let data: Vec<ColumnData> = dim_data
        .into_iter()
        .chain(metric_data)
        .map(ColumnData::Scalar)
        .chain(std::iter::once(ColumnData::List(id_data)))
        .collect();

    let names = name_columns_with(dimensions, metrics, config);
    let cube = Cube::from_columns(names, data, dimensions.len())?;

    info!(
        "Built cube with {} rows and {} columns from {} fact rows",
        cube.row_count(),
        cube.columns().len(),
        facts.row_count()
    );
    Ok(cube)
}

/// Checks functions, columns and column types before any partition work
fn validate(
    facts: &FactTable,
    dimensions: &DimensionSpec,
    metrics: &MetricSpec,
    config: &BuildConfig,
) -> Result<Vec<ResolvedMetric>, CubeError> {
    let resolved = metrics.resolve()?;

    for name in dimensions.names() {
        facts.get_col(name)?;
    }
    facts.get_col(&config.id_column)?;

    for metric in &resolved {
        let column = facts.get_col(&metric.column)?;
        if let Some(op) = metric.ops.iter().find(|op| op.needs_numeric()) {
            if !column.column_type().is_numeric() {
                return Err(CubeError::NonNumericMetric {
                    metric: metric.column.clone(),
                    function: op.name().to_string(),
                });
            }
        }
    }

    Ok(resolved)
}
