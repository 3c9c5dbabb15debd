use crate::processor::cube::BuildConfig;
use crate::processor::definition::{DimensionSpec, MetricSpec};

/// Explicit cube column names using the default conventions.
///
/// Dimensions come first (verbatim), then one `{metric}_{function}` per
/// requested function, then the contribution column.
///
/// # Example
/// ```rust
/// # use olap_cube::processor::definition::{DimensionSpec, MetricSpec};
/// # use olap_cube::processor::naming::name_columns;
/// let dims = DimensionSpec::new(["region", "day"]).unwrap();
/// let metrics = MetricSpec::new().with("amount", ["sum", "mean"]);
/// assert_eq!(
///     name_columns(&dims, &metrics),
///     ["region", "day", "amount_sum", "amount_mean", "transaction_id"]
/// );
/// ```
pub fn name_columns(dimensions: &DimensionSpec, metrics: &MetricSpec) -> Vec<String> {
    name_columns_with(dimensions, metrics, &BuildConfig::default())
}

pub fn name_columns_with(
    dimensions: &DimensionSpec,
    metrics: &MetricSpec,
    config: &BuildConfig,
) -> Vec<String> {
    let mut names = Vec::with_capacity(dimensions.len() + metrics.output_width() + 1);
    names.extend(dimensions.names().iter().cloned());

    for (metric, spec) in metrics.iter() {
        for function in spec.functions() {
            names.push(metric_column_name(metric, function, config.separator));
        }
    }

    names.push(config.contribution_column.clone());
    names
}

fn metric_column_name(metric: &str, function: &str, separator: char) -> String {
    format!("{metric}{separator}{function}")
        .trim_end_matches(separator)
        .to_string()
}
