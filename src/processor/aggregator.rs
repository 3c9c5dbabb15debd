use std::collections::{BTreeMap, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::ops::Range;

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::debug;

use crate::processor::column::Column;
use crate::processor::definition::{DimensionSpec, ResolvedMetric};
use crate::processor::fact_table::FactTable;
use crate::processor::{AggregateOp, AggregateResult, CubeError, PartitionKey};

/// Aggregates per partition, one result per metric×function in request order
pub type AggregateTable = BTreeMap<PartitionKey, Vec<AggregateResult>>;

/// Running state for one metric column inside one partition.
///
/// Every requested function is derived from this state, so functions of the
/// same metric never see each other's output.
#[derive(Debug, Clone)]
enum MetricState {
    Int {
        sum: i128,
        valid: usize,
        min: Option<i64>,
        max: Option<i64>,
    },
    Float {
        sum: f64,
        valid: usize,
        min: Option<f64>,
        max: Option<f64>,
    },
    /// Non-numeric column: only `count` is allowed
    Rows,
}

impl MetricState {
    fn for_column(column: &Column) -> Self {
        match column {
            Column::Int64(_) => MetricState::Int {
                sum: 0,
                valid: 0,
                min: None,
                max: None,
            },
            Column::Float64(_) => MetricState::Float {
                sum: 0.0,
                valid: 0,
                min: None,
                max: None,
            },
            Column::Date(_) | Column::Str(_) => MetricState::Rows,
        }
    }

    /// Missing cells and NaN are skipped
    fn observe(&mut self, column: &Column, row: usize) {
        match (self, column) {
            (
                MetricState::Int {
                    sum,
                    valid,
                    min,
                    max,
                },
                Column::Int64(values),
            ) => {
                if let Some(v) = values[row] {
                    *sum += v as i128;
                    *valid += 1;
                    *min = Some(min.map_or(v, |m| m.min(v)));
                    *max = Some(max.map_or(v, |m| m.max(v)));
                }
            }
            (
                MetricState::Float {
                    sum,
                    valid,
                    min,
                    max,
                },
                Column::Float64(values),
            ) => {
                if let Some(v) = values[row].filter(|v| !v.is_nan()) {
                    *sum += v;
                    *valid += 1;
                    *min = Some(min.map_or(v, |m| m.min(v)));
                    *max = Some(max.map_or(v, |m| m.max(v)));
                }
            }
            _ => {}
        }
    }

    fn finish(&self, op: AggregateOp, rows: usize, metric: &str) -> Result<AggregateResult, CubeError> {
        let result = match (op, self) {
            (AggregateOp::Count, _) => AggregateResult::Int(rows as i64),

            (AggregateOp::Sum, MetricState::Int { sum, .. }) => i64::try_from(*sum)
                .map(AggregateResult::Int)
                .map_err(|_| CubeError::SumOverflow {
                    metric: metric.to_string(),
                })?,
            (AggregateOp::Sum, MetricState::Float { sum, .. }) => AggregateResult::Float(*sum),

            (AggregateOp::Mean, MetricState::Int { sum, valid, .. }) if *valid > 0 => {
                AggregateResult::Float(*sum as f64 / *valid as f64)
            }
            (AggregateOp::Mean, MetricState::Float { sum, valid, .. }) if *valid > 0 => {
                AggregateResult::Float(*sum / *valid as f64)
            }

            (AggregateOp::Min, MetricState::Int { min: Some(v), .. }) => AggregateResult::Int(*v),
            (AggregateOp::Max, MetricState::Int { max: Some(v), .. }) => AggregateResult::Int(*v),
            (AggregateOp::Min, MetricState::Float { min: Some(v), .. }) => {
                AggregateResult::Float(*v)
            }
            (AggregateOp::Max, MetricState::Float { max: Some(v), .. }) => {
                AggregateResult::Float(*v)
            }

            _ => AggregateResult::Missing,
        };
        Ok(result)
    }
}

#[derive(Debug, Clone)]
struct PartitionState {
    rows: usize,
    metrics: Vec<MetricState>,
}

/// Groups fact rows by their dimension tuple and applies every requested
/// function of every metric to each group.
///
/// Rows are ordered by [`PartitionKey`]. With `workers > 1` partitions are
/// spread over workers by key hash; each partition is still folded by a
/// single worker in row order, so float sums come out bit-identical to the
/// single-threaded run.
pub fn aggregate(
    facts: &FactTable,
    dimensions: &DimensionSpec,
    metrics: &[ResolvedMetric],
    workers: usize,
) -> Result<AggregateTable, CubeError> {
    let dim_cols = dimension_columns(facts, dimensions)?;
    let metric_cols = metrics
        .iter()
        .map(|m| facts.get_col(&m.column))
        .collect::<Result<Vec<_>, _>>()?;

    let shards = shard_rows(&dim_cols, facts.row_count(), workers);
    let fold_shard = |rows: &Vec<usize>| {
        let mut groups: HashMap<PartitionKey, PartitionState> = HashMap::new();
        for &row in rows {
            let state = groups
                .entry(partition_key(&dim_cols, row))
                .or_insert_with(|| PartitionState {
                    rows: 0,
                    metrics: metric_cols.iter().map(|c| MetricState::for_column(c)).collect(),
                });
            state.rows += 1;
            for (metric_state, column) in state.metrics.iter_mut().zip(&metric_cols) {
                metric_state.observe(column, row);
            }
        }
        groups
    };

    let partials: Vec<HashMap<PartitionKey, PartitionState>> = if shards.len() > 1 {
        shards.par_iter().map(fold_shard).collect()
    } else {
        shards.iter().map(fold_shard).collect()
    };

    // Shards hold disjoint partitions
    let merged: BTreeMap<PartitionKey, PartitionState> = partials.into_iter().flatten().collect();
    debug!(
        "Aggregated {} rows into {} partitions using {} shard(s)",
        facts.row_count(),
        merged.len(),
        shards.len()
    );

    let mut table = AggregateTable::new();
    for (key, state) in merged {
        let mut results = Vec::with_capacity(metrics.iter().map(|m| m.ops.len()).sum());
        for (metric, metric_state) in metrics.iter().zip(&state.metrics) {
            for op in &metric.ops {
                results.push(metric_state.finish(*op, state.rows, &metric.column)?);
            }
        }
        table.insert(key, results);
    }
    Ok(table)
}

pub(crate) fn dimension_columns<'a>(
    facts: &'a FactTable,
    dimensions: &DimensionSpec,
) -> Result<Vec<&'a Column>, CubeError> {
    dimensions
        .names()
        .iter()
        .map(|name| facts.get_col(name))
        .collect()
}

pub(crate) fn partition_key(dim_cols: &[&Column], row: usize) -> PartitionKey {
    PartitionKey(dim_cols.iter().map(|c| c.value(row)).collect())
}

/// Splits `0..row_count` into at most `workers` contiguous ranges
fn row_ranges(row_count: usize, workers: usize) -> Vec<Range<usize>> {
    let workers = workers.max(1);
    if row_count == 0 {
        return vec![];
    }
    let size = row_count.div_ceil(workers);
    (0..row_count)
        .step_by(size)
        .map(|start| start..(start + size).min(row_count))
        .collect()
}

/// Assigns each row to one of `workers` shards by the hash of its dimension
/// values. A partition never spans two shards, and every shard lists its
/// rows in ascending order. Empty shards are dropped.
pub(crate) fn shard_rows(dim_cols: &[&Column], row_count: usize, workers: usize) -> Vec<Vec<usize>> {
    let workers = workers.max(1);
    if workers == 1 {
        return vec![(0..row_count).collect()];
    }

    let assign = |range: &Range<usize>| {
        let mut shards = vec![Vec::new(); workers];
        for row in range.clone() {
            let mut hasher = DefaultHasher::new();
            for column in dim_cols {
                column.value(row).hash(&mut hasher);
            }
            shards[(hasher.finish() % workers as u64) as usize].push(row);
        }
        shards
    };
    let partials: Vec<Vec<Vec<usize>>> = row_ranges(row_count, workers)
        .par_iter()
        .map(assign)
        .collect();

    // Ranges are appended in order so rows stay ascending
    let mut shards: Vec<Vec<usize>> = vec![Vec::new(); workers];
    for partial in partials {
        for (shard, mut rows) in shards.iter_mut().zip(partial) {
            shard.append(&mut rows);
        }
    }
    shards.retain(|rows| !rows.is_empty());
    shards
}
