use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::str::FromStr;

use chrono::NaiveDate;
use thiserror::Error;

pub mod aggregator;
pub mod column;
pub mod contribution;
pub mod cube;
pub mod cube_builder;
pub mod definition;
pub mod enrich;
pub mod fact_table;
pub mod naming;
pub mod writer;

/// Error type used across the crate
#[derive(Debug, Error)]
pub enum CubeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow2::error::Error),

    #[error("Schema/parse error: {0}")]
    Parse(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("Column '{column}' has type {actual}, expected {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("At least one dimension is required")]
    EmptyDimensions,

    #[error("Dimension listed twice: {0}")]
    DuplicateDimension(String),

    #[error("Unknown aggregation '{function}' for metric '{metric}'")]
    UnknownAggregation { metric: String, function: String },

    #[error("Aggregation '{function}' needs a numeric column, '{metric}' is not")]
    NonNumericMetric { metric: String, function: String },

    #[error("Column length mismatch: cube has {actual} columns, expected {expected}")]
    SchemaMismatch { expected: usize, actual: usize },

    #[error("Cube column '{column}' {reason}")]
    MalformedCube { column: String, reason: &'static str },

    #[error("Column '{column}' has {actual} rows, expected {expected}")]
    RaggedColumn {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Partition {key} is missing from one side of the cube join")]
    PartitionMismatch { key: String },

    #[error("Record identifier is null at row {row}")]
    MissingRecordId { row: usize },

    #[error("Record identifier {0} appears more than once")]
    DuplicateRecordId(String),

    #[error("Join key {key} appears more than once in '{column}'")]
    DuplicateJoinKey { column: String, key: String },

    #[error("Sum of '{metric}' overflows a 64-bit integer")]
    SumOverflow { metric: String },
}

#[derive(Debug, Default)]
pub struct ParseSummary {
    pub rows_processed: usize,
    pub errors: Vec<ParseError>,
}

#[derive(Debug)]
pub struct ParseError {
    /// 1-based line in the source file (the header is line 1)
    pub line: usize,
    pub column: String,
    pub value: String,
    pub error: Option<String>,
}

/// A single cell of a fact table or a cube
#[derive(Debug, Clone)]
pub enum Value {
    /// Missing cell
    Null,
    /// Integer column
    Int(i64),
    /// Float column
    Float(f64),
    /// Calendar date column
    Date(NaiveDate),
    /// String column
    Str(String),
}

impl Value {
    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Int(_) => 1,
            Value::Float(_) => 2,
            Value::Date(_) => 3,
            Value::Str(_) => 4,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Null => {}
            Value::Int(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Date(v) => v.hash(state),
            Value::Str(v) => v.hash(state),
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Value::Str(v) => f.write_str(v),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

/// Aggregate operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateOp {
    /// Sum of the non-missing values
    Sum,
    /// Number of rows in the partition
    Count,
    /// Average of the non-missing values
    Mean,
    /// Minimum value
    Min,
    /// Maximum value
    Max,
}

impl AggregateOp {
    pub fn name(self) -> &'static str {
        match self {
            AggregateOp::Sum => "sum",
            AggregateOp::Count => "count",
            AggregateOp::Mean => "mean",
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
        }
    }

    /// Whether the operation reads metric values (everything but `count`)
    pub fn needs_numeric(self) -> bool {
        !matches!(self, AggregateOp::Count)
    }
}

impl FromStr for AggregateOp {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sum" => Ok(AggregateOp::Sum),
            "count" => Ok(AggregateOp::Count),
            "mean" => Ok(AggregateOp::Mean),
            "min" => Ok(AggregateOp::Min),
            "max" => Ok(AggregateOp::Max),
            _ => Err(()),
        }
    }
}

/// Result of an aggregation
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateResult {
    Int(i64),
    Float(f64),
    /// No non-missing value fed the aggregation
    Missing,
}

impl From<AggregateResult> for Value {
    fn from(result: AggregateResult) -> Self {
        match result {
            AggregateResult::Int(v) => Value::Int(v),
            AggregateResult::Float(v) => Value::Float(v),
            AggregateResult::Missing => Value::Null,
        }
    }
}

/// Tuple of dimension values identifying one partition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey(pub Vec<Value>);

impl PartitionKey {
    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match v {
                Value::Null => f.write_str("null")?,
                other => write!(f, "{other}")?,
            }
        }
        f.write_str(")")
    }
}
