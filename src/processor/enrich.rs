//! Fact-table enrichment applied before cubing: joining dimension tables
//! and deriving calendar dimensions from a sale date.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, Weekday};
use tracing::debug;

use crate::processor::column::{Column, ColumnType};
use crate::processor::fact_table::{FactTable, parse_date};
use crate::processor::{CubeError, Value};

pub const DAY_OF_WEEK_COLUMN: &str = "DayOfWeek";
pub const MONTH_COLUMN: &str = "Month";
pub const YEAR_COLUMN: &str = "Year";

impl FactTable {
    /// Left join on `on`: every row of `self` is kept, columns of `right`
    /// (except `on`) are appended, unmatched rows get nulls.
    ///
    /// `right` must have unique, non-null keys.
    pub fn left_join(&self, right: &FactTable, on: &str) -> Result<FactTable, CubeError> {
        let left_keys = self.get_col(on)?;
        let right_keys = right.get_col(on)?;

        let mut index: HashMap<Value, usize> = HashMap::with_capacity(right.row_count());
        for row in 0..right.row_count() {
            let key = right_keys.value(row);
            if key.is_null() {
                continue;
            }
            if index.insert(key, row).is_some() {
                return Err(CubeError::DuplicateJoinKey {
                    column: on.to_string(),
                    key: right_keys.value(row).to_string(),
                });
            }
        }

        let matches: Vec<Option<usize>> = (0..self.row_count())
            .map(|row| index.get(&left_keys.value(row)).copied())
            .collect();

        let mut joined = self.clone();
        for (idx, name) in right.headers().iter().enumerate() {
            if name == on {
                continue;
            }
            let Some(source) = right.column(idx) else {
                continue;
            };
            let mut column = Column::with_capacity(source.column_type(), matches.len());
            for m in &matches {
                match m {
                    Some(r) => {
                        column.push_value(source.value(*r));
                    }
                    None => column.push_null(),
                }
            }
            joined.push_column(name.clone(), column)?;
        }

        debug!(
            "Joined {} columns on '{}': {} of {} rows matched",
            right.headers().len().saturating_sub(1),
            on,
            matches.iter().filter(|m| m.is_some()).count(),
            matches.len()
        );
        Ok(joined)
    }

    /// Adds `DayOfWeek` (e.g. "Monday"), `Month` and `Year` derived from a
    /// date column. String columns holding `%Y-%m-%d` dates are accepted too;
    /// unparsable or missing dates yield nulls.
    pub fn add_date_parts(&mut self, source: &str) -> Result<(), CubeError> {
        let dates: Vec<Option<NaiveDate>> = match self.get_col(source)? {
            Column::Date(values) => values.clone(),
            Column::Str(values) => values
                .iter()
                .map(|v| v.as_deref().and_then(|s| parse_date(s.as_bytes())))
                .collect(),
            other => {
                return Err(CubeError::TypeMismatch {
                    column: source.to_string(),
                    expected: ColumnType::Date.name(),
                    actual: other.column_type().name(),
                });
            }
        };

        let day_names: Vec<Option<&str>> = dates.iter().map(|d| d.map(|d| day_name(d.weekday()))).collect();
        let months: Vec<Option<i64>> = dates.iter().map(|d| d.map(|d| d.month() as i64)).collect();
        let years: Vec<Option<i64>> = dates.iter().map(|d| d.map(|d| d.year() as i64)).collect();

        self.push_column(DAY_OF_WEEK_COLUMN, Column::from(day_names))?;
        self.push_column(MONTH_COLUMN, Column::from(months))?;
        self.push_column(YEAR_COLUMN, Column::from(years))?;
        Ok(())
    }
}

fn day_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}
