use chrono::NaiveDate;
use memchr::memchr_iter;
use memmap2::Mmap;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::{
    fs::File,
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
};
use tracing::{debug, info, warn};

use crate::processor::{
    CubeError, ParseError, ParseSummary, Value,
    column::{Column, ColumnType},
};

/// Rows sampled to infer each column's type
const SCHEMA_SAMPLE_ROWS: usize = 1024;

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

fn next_table_id() -> u64 {
    NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed)
}

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

/// Columns parsed out of one newline-aligned chunk of a CSV file
struct BatchResult {
    columns: Vec<Column>,
    row_count: usize,
    errors: Vec<ParseError>,
    /// Lines seen in the chunk, including skipped ones
    line_count: usize,
}

/// In-memory, column-oriented table of fact rows
///
/// # Examples
///
/// ```rust
/// # use olap_cube::processor::fact_table::FactTable;
/// # use olap_cube::processor::column::Column;
/// let facts = FactTable::from_columns(vec![
///     ("transaction_id", Column::from(vec![1i64, 2])),
///     ("region", Column::from(vec!["East", "West"])),
///     ("amount", Column::from(vec![10.0, 20.0])),
/// ])
/// .unwrap();
/// assert_eq!(facts.row_count(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct FactTable {
    columns: Vec<Column>,
    headers: Vec<String>,
    row_count: usize,
    /// Changes on every mutation; clones share it until one of them changes
    generation: u64,
}

impl Default for FactTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FactTable {
    /// Create an empty table
    pub fn new() -> Self {
        FactTable {
            columns: Vec::new(),
            headers: Vec::new(),
            row_count: 0,
            generation: next_table_id(),
        }
    }

    /// Builds a table from named columns of equal length
    pub fn from_columns<S: Into<String>>(
        columns: Vec<(S, Column)>,
    ) -> Result<Self, CubeError> {
        let mut table = FactTable::new();
        for (name, column) in columns {
            table.push_column(name, column)?;
        }
        Ok(table)
    }

    /// Adds a column; its length must match the rows already present
    pub fn push_column<S: Into<String>>(&mut self, name: S, column: Column) -> Result<(), CubeError> {
        let name = name.into();
        if self.headers.contains(&name) {
            return Err(CubeError::DuplicateColumn(name));
        }
        if !self.columns.is_empty() && column.len() != self.row_count {
            return Err(CubeError::RaggedColumn {
                column: name,
                expected: self.row_count,
                actual: column.len(),
            });
        }

        self.row_count = column.len();
        self.headers.push(name);
        self.columns.push(column);
        self.generation = next_table_id();
        Ok(())
    }

    /// Loads a CSV file using memory mapping
    ///
    /// Column types are inferred from the non-empty values in the first rows
    /// of the file (int, float, `%Y-%m-%d` date, string). A column holding both
    /// integers and decimals loads as float.
    /// Empty fields load as nulls.
    ///
    /// # Errors
    /// Returns a [`CubeError`] if:
    /// - File cannot be opened or mapped
    /// - The header line is missing
    ///
    /// Malformed rows and unparsable cells do not fail the load; they are
    /// reported in the returned [`ParseSummary`].
    pub fn load_csv(&mut self, path: &Path) -> Result<ParseSummary, CubeError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let buf: &[u8] = &mmap[..];

        // Parse header
        let header_end = memchr::memchr(b'\n', buf).unwrap_or(buf.len());
        let header_line = trim_cr(&buf[..header_end]);
        if header_line.is_empty() {
            return Err(CubeError::Parse(format!(
                "Missing header line in {}",
                path.display()
            )));
        }
        let headers: Vec<String> = header_line
            .split(|&b| b == b',')
            .map(|s| String::from_utf8_lossy(s).trim().to_string())
            .collect();

        let data_start = (header_end + 1).min(buf.len());
        let data = &buf[data_start..];

        let schema = Self::infer_schema(data, headers.len());
        debug!(
            "Inferred schema for {}: {:?}",
            path.display(),
            headers.iter().zip(&schema).collect::<Vec<_>>()
        );

        // Find chunk boundaries (split by newlines)
        let num_threads = rayon::current_num_threads();
        let chunks = Self::find_chunk_boundaries(data, num_threads);

        // Parse chunks in parallel
        let batch_results: Vec<BatchResult> = chunks
            .par_iter()
            .map(|(start, end)| Self::parse_chunk(&data[*start..*end], &schema, &headers))
            .collect();

        // Merge batch results in file order
        let mut columns: Vec<Column> = schema.iter().map(|t| Column::new(*t)).collect();
        let mut total_rows = 0;
        let mut lines_before = 1; // header
        let mut all_errors = Vec::new();

        for batch in batch_results {
            total_rows += batch.row_count;
            all_errors.extend(batch.errors.into_iter().map(|mut e| {
                e.line += lines_before;
                e
            }));
            lines_before += batch.line_count;

            for (column, part) in columns.iter_mut().zip(batch.columns) {
                column.append(part);
            }
        }

        if !all_errors.is_empty() {
            warn!(
                "{} parse errors while loading {}",
                all_errors.len(),
                path.display()
            );
        }
        info!("Loaded {} fact rows from {}", total_rows, path.display());

        self.columns = columns;
        self.headers = headers;
        self.row_count = total_rows;
        self.generation = next_table_id();

        Ok(ParseSummary {
            rows_processed: total_rows,
            errors: all_errors,
        })
    }

    fn infer_schema(data: &[u8], num_cols: usize) -> Vec<ColumnType> {
        let mut schema: Vec<Option<ColumnType>> = vec![None; num_cols];

        for line in lines(data).take(SCHEMA_SAMPLE_ROWS) {
            let mut field_start = 0;
            let mut fields = Vec::with_capacity(num_cols);
            for comma_pos in memchr_iter(b',', line) {
                fields.push(&line[field_start..comma_pos]);
                field_start = comma_pos + 1;
            }
            fields.push(&line[field_start..]);
            if fields.len() != num_cols {
                continue;
            }

            for (slot, field) in schema.iter_mut().zip(fields) {
                if field.is_empty() {
                    continue;
                }
                let seen = infer_type(field);
                *slot = Some((*slot).map_or(seen, |current| widen(current, seen)));
            }
        }

        schema
            .into_iter()
            .map(|t| t.unwrap_or(ColumnType::Str))
            .collect()
    }

    /// Splits `data` into about `num_chunks` ranges that each end on a line break
    fn find_chunk_boundaries(data: &[u8], num_chunks: usize) -> Vec<(usize, usize)> {
        if data.is_empty() {
            return vec![];
        }

        let num_chunks = num_chunks.max(1);
        let chunk_size = data.len() / num_chunks;
        let mut boundaries = Vec::with_capacity(num_chunks);
        let mut start = 0;

        for i in 0..num_chunks - 1 {
            let mut end = ((i + 1) * chunk_size).max(start);

            // Find next newline
            while end < data.len() && data[end] != b'\n' {
                end += 1;
            }

            if end < data.len() {
                end += 1; // Include the newline
            }

            if start < end {
                boundaries.push((start, end));
            }
            start = end;
        }

        // Last chunk gets everything remaining
        if start < data.len() {
            boundaries.push((start, data.len()));
        }

        boundaries
    }

    fn parse_chunk(chunk: &[u8], schema: &[ColumnType], headers: &[String]) -> BatchResult {
        let num_cols = schema.len();
        let estimated_rows = memchr_iter(b'\n', chunk).count() + 1;

        let mut columns: Vec<Column> = schema
            .iter()
            .map(|t| Column::with_capacity(*t, estimated_rows))
            .collect();

        let mut errors = Vec::new();
        let mut row_count = 0;
        let mut line_count = 0;
        let mut fields = Vec::with_capacity(num_cols);

        for line in lines(chunk) {
            line_count += 1;
            if line.is_empty() {
                continue;
            }

            // Split line into fields
            fields.clear();
            let mut field_start = 0;
            for comma_pos in memchr_iter(b',', line) {
                fields.push(&line[field_start..comma_pos]);
                field_start = comma_pos + 1;
            }
            fields.push(&line[field_start..]);

            if fields.len() != num_cols {
                errors.push(ParseError {
                    line: line_count,
                    column: String::new(),
                    value: String::from_utf8_lossy(line).to_string(),
                    error: Some(format!(
                        "Expected {} fields, got {}",
                        num_cols,
                        fields.len()
                    )),
                });
                continue;
            }

            // Parse each field according to schema
            for col_idx in 0..num_cols {
                let field = fields[col_idx];
                if field.is_empty() {
                    columns[col_idx].push_null();
                    continue;
                }

                let parsed = match schema[col_idx] {
                    ColumnType::Int64 => atoi_simd::parse::<i64>(field)
                        .map(Value::Int)
                        .map_err(|e| e.to_string()),
                    ColumnType::Float64 => fast_float::parse::<f64, _>(field)
                        .map(Value::Float)
                        .map_err(|e| e.to_string()),
                    ColumnType::Date => parse_date(field)
                        .map(Value::Date)
                        .ok_or_else(|| format!("not a {DATE_FORMAT} date")),
                    ColumnType::Str => Ok(Value::Str(String::from_utf8_lossy(field).to_string())),
                };

                match parsed {
                    Ok(value) => {
                        columns[col_idx].push_value(value);
                    }
                    Err(e) => {
                        columns[col_idx].push_null();
                        errors.push(ParseError {
                            line: line_count,
                            column: headers[col_idx].clone(),
                            value: String::from_utf8_lossy(field).to_string(),
                            error: Some(e),
                        });
                    }
                }
            }

            row_count += 1;
        }

        BatchResult {
            columns,
            row_count,
            errors,
            line_count,
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Identifies this table's contents for caching
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn column(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    pub fn get_col(&self, col_name: &str) -> Result<&Column, CubeError> {
        let col_pos = self
            .headers
            .iter()
            .position(|cn| cn == col_name)
            .ok_or_else(|| CubeError::MissingColumn(col_name.to_string()))?;

        let col = self
            .columns
            .get(col_pos)
            .ok_or_else(|| CubeError::MissingColumn(col_name.to_string()))?;

        Ok(col)
    }

    /// Cell at (`column`, `row`)
    pub fn value(&self, column: &str, row: usize) -> Result<Value, CubeError> {
        Ok(self.get_col(column)?.value(row))
    }
}

/// Lines of `buf` without their terminators; the last line may lack a newline
fn lines(buf: &[u8]) -> impl Iterator<Item = &[u8]> + '_ {
    let mut start = 0;
    memchr_iter(b'\n', buf)
        .chain(std::iter::once(buf.len()))
        .filter_map(move |end| {
            if start >= buf.len() && end == buf.len() {
                return None;
            }
            let line = trim_cr(&buf[start..end]);
            start = end + 1;
            Some(line)
        })
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Integers and decimals in one column load as float; any other mix keeps the
/// first type seen so stray cells are reported instead of retyping the column
fn widen(current: ColumnType, seen: ColumnType) -> ColumnType {
    match (current, seen) {
        (ColumnType::Int64, ColumnType::Float64) | (ColumnType::Float64, ColumnType::Int64) => {
            ColumnType::Float64
        }
        _ => current,
    }
}

fn infer_type(field: &[u8]) -> ColumnType {
    if atoi_simd::parse::<i64>(field).is_ok() {
        ColumnType::Int64
    } else if fast_float::parse::<f64, _>(field).is_ok() {
        ColumnType::Float64
    } else if parse_date(field).is_some() {
        ColumnType::Date
    } else {
        ColumnType::Str
    }
}

pub(crate) fn parse_date(field: &[u8]) -> Option<NaiveDate> {
    let s = std::str::from_utf8(field).ok()?;
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_table_from_str(csv: &str) -> (FactTable, ParseSummary) {
        use std::io::Write;
        use tempfile::NamedTempFile;

        // write CSV to temp file
        let mut tmp = NamedTempFile::new().unwrap();
        write!(tmp, "{}", csv).unwrap();

        let mut table = FactTable::new();
        let summary = table.load_csv(tmp.path()).unwrap();
        (table, summary)
    }

    #[test]
    fn test_row_count() {
        let (table, summary) = make_table_from_str("id,value\n1,10\n2,20\n3,30\n");
        assert_eq!(table.row_count(), 3);
        assert_eq!(summary.rows_processed, 3);
        assert!(summary.errors.is_empty());
    }

    #[test]
    fn test_last_line_without_newline() {
        let (table, _) = make_table_from_str("id,value\r\n1,10\r\n2,20");
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.value("value", 1).unwrap(), Value::Int(20));
    }

    #[test]
    fn test_schema_inference() {
        let csv = "transaction_id,sale_date,region,sale_amount\n\
                   1,2024-01-05,East,10.5\n\
                   2,2024-01-06,West,7\n";
        let (table, _) = make_table_from_str(csv);
        let types: Vec<ColumnType> = (0..4)
            .map(|i| table.column(i).unwrap().column_type())
            .collect();
        assert_eq!(
            types,
            vec![
                ColumnType::Int64,
                ColumnType::Date,
                ColumnType::Str,
                ColumnType::Float64
            ]
        );
        assert_eq!(table.value("sale_amount", 1).unwrap(), Value::Float(7.0));
    }

    #[test]
    fn test_integers_then_decimals_load_as_float() {
        let csv = "transaction_id,region,sale_amount\n\
                   1,East,10\n\
                   2,East,10.5\n\
                   3,West,7\n";
        let (table, summary) = make_table_from_str(csv);
        assert!(summary.errors.is_empty());
        assert_eq!(
            table.get_col("sale_amount").unwrap().column_type(),
            ColumnType::Float64
        );
        assert_eq!(table.value("sale_amount", 0).unwrap(), Value::Float(10.0));
        assert_eq!(table.value("sale_amount", 1).unwrap(), Value::Float(10.5));
        assert_eq!(table.value("sale_amount", 2).unwrap(), Value::Float(7.0));
    }

    #[test]
    fn test_decimal_before_integer_stays_float() {
        let (table, summary) = make_table_from_str("id,amount\n1,2.5\n2,3\n3,abc\n");
        assert_eq!(table.get_col("amount").unwrap().column_type(), ColumnType::Float64);
        assert_eq!(table.value("amount", 1).unwrap(), Value::Float(3.0));
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].value, "abc");
    }

    #[test]
    fn test_every_mutation_changes_generation() {
        let mut table = FactTable::from_columns(vec![("id", Column::from(vec![1i64]))]).unwrap();
        let before = table.generation();
        assert_eq!(table.clone().generation(), before);
        table.push_column("amount", Column::from(vec![1.0])).unwrap();
        assert_ne!(table.generation(), before);
        assert_ne!(FactTable::new().generation(), FactTable::new().generation());
    }

    #[test]
    fn test_empty_fields_are_null() {
        let csv = "id,region,amount\n1,,\n2,West,5\n";
        let (table, summary) = make_table_from_str(csv);
        assert!(summary.errors.is_empty());
        assert_eq!(table.value("region", 0).unwrap(), Value::Null);
        assert_eq!(table.value("amount", 0).unwrap(), Value::Null);
        assert_eq!(table.value("amount", 1).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_bad_rows_are_reported() {
        let csv = "id,amount\n1,10\n2\n3,abc\n";
        let (table, summary) = make_table_from_str(csv);
        assert_eq!(table.row_count(), 2);
        assert_eq!(summary.errors.len(), 2);
        assert_eq!(summary.errors[0].line, 3);
        assert_eq!(summary.errors[1].line, 4);
        assert_eq!(summary.errors[1].column, "amount");
        assert_eq!(table.value("amount", 1).unwrap(), Value::Null);
    }

    #[test]
    fn test_header_only_file() {
        let (table, summary) = make_table_from_str("id,amount\n");
        assert_eq!(table.row_count(), 0);
        assert_eq!(table.headers(), ["id", "amount"]);
        assert_eq!(summary.rows_processed, 0);
    }

    #[test]
    fn test_push_column_checks_shape() {
        let mut table = FactTable::from_columns(vec![("id", Column::from(vec![1i64, 2]))]).unwrap();
        assert!(matches!(
            table.push_column("amount", Column::from(vec![1.0])),
            Err(CubeError::RaggedColumn { .. })
        ));
        assert!(matches!(
            table.push_column("id", Column::from(vec![3i64, 4])),
            Err(CubeError::DuplicateColumn(_))
        ));
        assert!(matches!(table.get_col("nope"), Err(CubeError::MissingColumn(_))));
    }
}
