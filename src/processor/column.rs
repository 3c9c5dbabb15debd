use chrono::NaiveDate;

use crate::processor::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int64,
    Float64,
    Date,
    Str,
}

impl ColumnType {
    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Int64 => "int64",
            ColumnType::Float64 => "float64",
            ColumnType::Date => "date",
            ColumnType::Str => "string",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Int64 | ColumnType::Float64)
    }
}

/// A nullable, typed column of a fact table
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Int64(Vec<Option<i64>>),
    Float64(Vec<Option<f64>>),
    Date(Vec<Option<NaiveDate>>),
    Str(Vec<Option<String>>),
}

impl Column {
    pub fn new(column_type: ColumnType) -> Self {
        Self::with_capacity(column_type, 0)
    }

    pub fn with_capacity(column_type: ColumnType, capacity: usize) -> Self {
        match column_type {
            ColumnType::Int64 => Column::Int64(Vec::with_capacity(capacity)),
            ColumnType::Float64 => Column::Float64(Vec::with_capacity(capacity)),
            ColumnType::Date => Column::Date(Vec::with_capacity(capacity)),
            ColumnType::Str => Column::Str(Vec::with_capacity(capacity)),
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Column::Int64(_) => ColumnType::Int64,
            Column::Float64(_) => ColumnType::Float64,
            Column::Date(_) => ColumnType::Date,
            Column::Str(_) => ColumnType::Str,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Int64(v) => v.len(),
            Column::Float64(v) => v.len(),
            Column::Date(v) => v.len(),
            Column::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Owned cell value; out-of-range rows read as `Null`
    pub fn value(&self, row: usize) -> Value {
        match self {
            Column::Int64(v) => v.get(row).copied().flatten().map_or(Value::Null, Value::Int),
            Column::Float64(v) => v
                .get(row)
                .copied()
                .flatten()
                .map_or(Value::Null, Value::Float),
            Column::Date(v) => v.get(row).copied().flatten().map_or(Value::Null, Value::Date),
            Column::Str(v) => match v.get(row) {
                Some(Some(s)) => Value::Str(s.clone()),
                _ => Value::Null,
            },
        }
    }

    pub fn push_null(&mut self) {
        match self {
            Column::Int64(v) => v.push(None),
            Column::Float64(v) => v.push(None),
            Column::Date(v) => v.push(None),
            Column::Str(v) => v.push(None),
        }
    }

    /// Appends a value of the matching type; `Null` always fits
    pub fn push_value(&mut self, value: Value) -> bool {
        match (self, value) {
            (col, Value::Null) => {
                col.push_null();
                true
            }
            (Column::Int64(v), Value::Int(x)) => {
                v.push(Some(x));
                true
            }
            (Column::Float64(v), Value::Float(x)) => {
                v.push(Some(x));
                true
            }
            (Column::Float64(v), Value::Int(x)) => {
                v.push(Some(x as f64));
                true
            }
            (Column::Date(v), Value::Date(x)) => {
                v.push(Some(x));
                true
            }
            (Column::Str(v), Value::Str(x)) => {
                v.push(Some(x));
                true
            }
            _ => false,
        }
    }

    /// Moves all rows of `other` to the end of `self`.
    ///
    /// Both columns must have the same type.
    pub fn append(&mut self, other: Column) -> bool {
        match (self, other) {
            (Column::Int64(a), Column::Int64(mut b)) => a.append(&mut b),
            (Column::Float64(a), Column::Float64(mut b)) => a.append(&mut b),
            (Column::Date(a), Column::Date(mut b)) => a.append(&mut b),
            (Column::Str(a), Column::Str(mut b)) => a.append(&mut b),
            _ => return false,
        }
        true
    }
}

impl From<Vec<i64>> for Column {
    fn from(values: Vec<i64>) -> Self {
        Column::Int64(values.into_iter().map(Some).collect())
    }
}

impl From<Vec<f64>> for Column {
    fn from(values: Vec<f64>) -> Self {
        Column::Float64(values.into_iter().map(Some).collect())
    }
}

impl From<Vec<&str>> for Column {
    fn from(values: Vec<&str>) -> Self {
        Column::Str(values.into_iter().map(|s| Some(s.to_string())).collect())
    }
}

impl From<Vec<NaiveDate>> for Column {
    fn from(values: Vec<NaiveDate>) -> Self {
        Column::Date(values.into_iter().map(Some).collect())
    }
}

impl From<Vec<Option<i64>>> for Column {
    fn from(values: Vec<Option<i64>>) -> Self {
        Column::Int64(values)
    }
}

impl From<Vec<Option<f64>>> for Column {
    fn from(values: Vec<Option<f64>>) -> Self {
        Column::Float64(values)
    }
}

impl From<Vec<Option<&str>>> for Column {
    fn from(values: Vec<Option<&str>>) -> Self {
        Column::Str(values.into_iter().map(|s| s.map(str::to_string)).collect())
    }
}
