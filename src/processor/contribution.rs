use std::collections::{BTreeMap, HashMap, HashSet};

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::processor::aggregator::{dimension_columns, partition_key, shard_rows};
use crate::processor::column::Column;
use crate::processor::definition::DimensionSpec;
use crate::processor::fact_table::FactTable;
use crate::processor::{CubeError, PartitionKey, Value};

/// Record identifiers per partition, in fact-table order
pub type ContributionMap = BTreeMap<PartitionKey, Vec<Value>>;

/// Collects the identifiers of the fact rows that fall into each partition.
///
/// Independent of the requested metrics: only the grouping columns and
/// `id_column` are read. Identifiers must be non-null and unique.
pub fn collect_contributions(
    facts: &FactTable,
    dimensions: &DimensionSpec,
    id_column: &str,
    workers: usize,
) -> Result<ContributionMap, CubeError> {
    let dim_cols = dimension_columns(facts, dimensions)?;
    let ids = facts.get_col(id_column)?;
    check_identifiers(ids, facts.row_count())?;

    let shards = shard_rows(&dim_cols, facts.row_count(), workers);
    let collect_shard = |rows: &Vec<usize>| {
        let mut groups: HashMap<PartitionKey, Vec<Value>> = HashMap::new();
        for &row in rows {
            groups
                .entry(partition_key(&dim_cols, row))
                .or_default()
                .push(ids.value(row));
        }
        groups
    };

    let partials: Vec<HashMap<PartitionKey, Vec<Value>>> = if shards.len() > 1 {
        shards.par_iter().map(collect_shard).collect()
    } else {
        shards.iter().map(collect_shard).collect()
    };

    // Shards hold disjoint partitions, each list already in row order
    Ok(partials.into_iter().flatten().collect())
}

fn check_identifiers(ids: &Column, row_count: usize) -> Result<(), CubeError> {
    let mut seen = HashSet::with_capacity(row_count);
    for row in 0..row_count {
        let id = ids.value(row);
        if id.is_null() {
            return Err(CubeError::MissingRecordId { row });
        }
        if !seen.insert(id) {
            return Err(CubeError::DuplicateRecordId(ids.value(row).to_string()));
        }
    }
    Ok(())
}
