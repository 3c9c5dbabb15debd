//! Declarative cube layout: which columns to group by and which functions
//! to apply to which metric columns.

use std::collections::HashSet;

use crate::processor::{AggregateOp, CubeError};

/// Ordered, non-empty list of unique grouping columns
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DimensionSpec {
    names: Vec<String>,
}

impl DimensionSpec {
    pub fn new<I, S>(names: I) -> Result<Self, CubeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(CubeError::EmptyDimensions);
        }

        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(CubeError::DuplicateDimension(name.clone()));
            }
        }

        Ok(DimensionSpec { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Functions requested for one metric column
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AggregationSpec {
    Single(String),
    List(Vec<String>),
}

impl AggregationSpec {
    pub fn functions(&self) -> &[String] {
        match self {
            AggregationSpec::Single(f) => std::slice::from_ref(f),
            AggregationSpec::List(fs) => fs,
        }
    }
}

impl From<&str> for AggregationSpec {
    fn from(function: &str) -> Self {
        AggregationSpec::Single(function.to_string())
    }
}

impl From<String> for AggregationSpec {
    fn from(function: String) -> Self {
        AggregationSpec::Single(function)
    }
}

impl<const N: usize> From<[&str; N]> for AggregationSpec {
    fn from(functions: [&str; N]) -> Self {
        AggregationSpec::List(functions.iter().map(|f| f.to_string()).collect())
    }
}

impl From<Vec<&str>> for AggregationSpec {
    fn from(functions: Vec<&str>) -> Self {
        AggregationSpec::List(functions.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for AggregationSpec {
    fn from(functions: Vec<String>) -> Self {
        AggregationSpec::List(functions)
    }
}

/// Ordered mapping from metric column to aggregation functions
///
/// Re-inserting a metric replaces its functions but keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MetricSpec {
    entries: Vec<(String, AggregationSpec)>,
}

impl MetricSpec {
    pub fn new() -> Self {
        MetricSpec {
            entries: Vec::new(),
        }
    }

    /// Builder-style [`MetricSpec::insert`]
    pub fn with<S, A>(mut self, metric: S, functions: A) -> Self
    where
        S: Into<String>,
        A: Into<AggregationSpec>,
    {
        self.insert(metric, functions);
        self
    }

    pub fn insert<S, A>(&mut self, metric: S, functions: A)
    where
        S: Into<String>,
        A: Into<AggregationSpec>,
    {
        let metric = metric.into();
        let functions = functions.into();
        match self.entries.iter_mut().find(|(m, _)| *m == metric) {
            Some((_, existing)) => *existing = functions,
            None => self.entries.push((metric, functions)),
        }
    }

    /// Parses `column=fn` or `column=fn1,fn2` and inserts it.
    ///
    /// A comma in the right-hand side always yields a list.
    pub fn insert_assignment(&mut self, assignment: &str) -> Result<(), CubeError> {
        let (metric, functions) = assignment.split_once('=').ok_or_else(|| {
            CubeError::Parse(format!(
                "Metric '{assignment}' must look like column=fn[,fn...]"
            ))
        })?;
        let metric = metric.trim();
        if metric.is_empty() {
            return Err(CubeError::Parse(format!(
                "Metric '{assignment}' has no column name"
            )));
        }

        if functions.contains(',') {
            let list: Vec<String> = functions.split(',').map(|f| f.trim().to_string()).collect();
            self.insert(metric, list);
        } else {
            self.insert(metric, functions.trim());
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AggregationSpec)> {
        self.entries.iter().map(|(m, a)| (m.as_str(), a))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of metric×function output columns
    pub fn output_width(&self) -> usize {
        self.entries.iter().map(|(_, a)| a.functions().len()).sum()
    }

    /// Maps every function name to an [`AggregateOp`], failing on the first
    /// unknown one.
    pub fn resolve(&self) -> Result<Vec<ResolvedMetric>, CubeError> {
        self.entries
            .iter()
            .map(|(metric, spec)| {
                let ops = spec
                    .functions()
                    .iter()
                    .map(|f| {
                        f.parse::<AggregateOp>()
                            .map_err(|_| CubeError::UnknownAggregation {
                                metric: metric.clone(),
                                function: f.clone(),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ResolvedMetric {
                    column: metric.clone(),
                    ops,
                })
            })
            .collect()
    }
}

/// A metric column with its validated operations, in request order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMetric {
    pub column: String,
    pub ops: Vec<AggregateOp>,
}
