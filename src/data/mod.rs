/*!
Time series tables, numeric matrices and data suppliers
*/
use crate::error::{ForecastError, Result};
use crate::util::strictly_increasing;
use crate::*;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

pub mod fake;
pub mod indicators;
pub mod io;
pub mod scale;
pub mod window;

/// The name of the date column in normalized tables
pub const DATE_COLUMN: &str = "date";

/// A supplier of normalized time series tables
pub trait DataSource {
    /// Load a table. Any failure is reported as `ForecastError::DataSource`
    fn load(&self) -> Result<TimeSeriesTable>;
}

impl DataSource for TimeSeriesTable {
    fn load(&self) -> Result<TimeSeriesTable> {
        Ok(self.clone())
    }
}

/// An ordered table of dated rows, each holding one value per named numeric column.
///
/// Guaranteed to hold at least one row, with unique strictly increasing dates and
/// unique lowercase column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct TimeSeriesTable {
    dates: Vec<NaiveDate>,
    names: Vec<String>,
    columns: Vec<Vec<CpuFloat>>,
}

/// The serialized layout of a `TimeSeriesTable`, checked on the way in
#[derive(Deserialize)]
struct RawTable {
    dates: Vec<NaiveDate>,
    names: Vec<String>,
    columns: Vec<Vec<CpuFloat>>,
}

impl TryFrom<RawTable> for TimeSeriesTable {
    type Error = ForecastError;

    fn try_from(raw: RawTable) -> Result<TimeSeriesTable> {
        if raw.names.len() != raw.columns.len() {
            return Err(ForecastError::DataSource(format!(
                "{} column names for {} columns",
                raw.names.len(),
                raw.columns.len()
            )));
        }
        TimeSeriesTable::new(raw.dates, raw.names.into_iter().zip(raw.columns).collect())
    }
}

impl TimeSeriesTable {
    /// Build a table from dates and named columns. Column names are lowercased.
    pub fn new<S>(
        dates: Vec<NaiveDate>,
        columns: Vec<(S, Vec<CpuFloat>)>,
    ) -> Result<TimeSeriesTable>
    where
        S: AsRef<str>,
    {
        if dates.is_empty() {
            return Err(ForecastError::DataSource("time series has no rows".into()));
        }
        if !strictly_increasing(&dates) {
            return Err(ForecastError::DataSource(
                "time series dates must be unique and strictly increasing".into(),
            ));
        }
        let mut table = TimeSeriesTable {
            dates,
            names: Vec::with_capacity(columns.len()),
            columns: Vec::with_capacity(columns.len()),
        };
        for (name, values) in columns {
            table.push_column(name.as_ref(), values)?;
        }
        Ok(table)
    }

    /// Append a column. Fails if the name is taken or the length does not match the dates
    pub fn push_column(&mut self, name: &str, values: Vec<CpuFloat>) -> Result<()> {
        let name = name.trim().to_lowercase();
        if name.is_empty() || name == DATE_COLUMN {
            return Err(ForecastError::DataSource(format!(
                "invalid column name {:?}",
                name
            )));
        }
        if self.names.contains(&name) {
            return Err(ForecastError::DataSource(format!(
                "duplicate column {:?}",
                name
            )));
        }
        if values.len() != self.dates.len() {
            return Err(ForecastError::DataSource(format!(
                "column {:?} has {} values for {} dates",
                name,
                values.len(),
                self.dates.len()
            )));
        }
        self.names.push(name);
        self.columns.push(values);
        Ok(())
    }

    /// The number of rows
    #[inline]
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Always `false`: a table holds at least one row
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// The row dates, in increasing order
    #[inline]
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// The column names, in insertion order
    #[inline]
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// The latest date in the table
    pub fn last_date(&self) -> NaiveDate {
        self.dates[self.dates.len() - 1]
    }

    /// The values of a column, looked up case-insensitively
    pub fn column(&self, name: &str) -> Option<&[CpuFloat]> {
        let name = name.to_lowercase();
        self.names
            .iter()
            .position(|n| *n == name)
            .map(|ix| &self.columns[ix][..])
    }

    /// The rows dated on or before `ending_date`
    pub fn truncate_to(&self, ending_date: NaiveDate) -> Result<TimeSeriesTable> {
        let keep = self.dates.partition_point(|date| *date <= ending_date);
        if keep == 0 {
            return Err(ForecastError::insufficient(0, 1));
        }
        Ok(TimeSeriesTable {
            dates: self.dates[..keep].to_vec(),
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|column| column[..keep].to_vec())
                .collect(),
        })
    }

    /// The index of the first row dated on or after `date`
    pub fn first_index_on_or_after(&self, date: NaiveDate) -> usize {
        self.dates.partition_point(|d| *d < date)
    }

    /// Select columns, in the given order, into a row-major matrix
    pub fn select<S: AsRef<str>>(&self, columns: &[S]) -> Result<Matrix> {
        let selected = columns
            .iter()
            .map(|name| {
                self.column(name.as_ref()).ok_or_else(|| {
                    ForecastError::Configuration(format!(
                        "column {:?} is not in the time series (have {:?})",
                        name.as_ref(),
                        self.names
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let mut data = Vec::with_capacity(self.len() * selected.len());
        for row in 0..self.len() {
            data.extend(selected.iter().map(|column| column[row]));
        }
        Ok(Matrix {
            rows: self.len(),
            cols: selected.len(),
            data,
        })
    }
}

/// A dense row-major matrix
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<F = CpuFloat> {
    rows: usize,
    cols: usize,
    data: Vec<F>,
}

impl<F: Copy> Matrix<F> {
    /// Wrap row-major data. Fails if `data.len() != rows * cols`
    pub fn new(rows: usize, cols: usize, data: Vec<F>) -> Result<Matrix<F>> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(ForecastError::Configuration(format!(
                "{} values cannot fill a {}x{} matrix",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Matrix { rows, cols, data })
    }

    /// Build a matrix from equally long rows
    pub fn from_rows(rows: &[Vec<F>]) -> Result<Matrix<F>> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        let data = rows.iter().flatten().copied().collect();
        Matrix::new(rows.len(), cols, data)
    }

    /// The number of rows
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// The number of columns
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// A row as a slice
    #[inline]
    pub fn row(&self, row: usize) -> &[F] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// A contiguous block of rows `[start, end)` as one flat row-major slice
    #[inline]
    pub fn row_block(&self, start: usize, end: usize) -> &[F] {
        &self.data[start * self.cols..end * self.cols]
    }

    /// A single entry
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> F {
        self.data[row * self.cols + col]
    }

    /// The values of one column, top to bottom
    pub fn column(&self, col: usize) -> impl Iterator<Item = F> + '_ {
        self.data.iter().skip(col).step_by(self.cols.max(1)).copied()
    }

    /// The underlying row-major data
    #[inline]
    pub fn as_slice(&self) -> &[F] {
        &self.data
    }

    /// Apply `f(col, value)` to every entry
    pub fn map_columns(&self, mut f: impl FnMut(usize, F) -> F) -> Matrix<F> {
        let cols = self.cols;
        Matrix {
            rows: self.rows,
            cols,
            data: self
                .data
                .iter()
                .enumerate()
                .map(|(ix, value)| f(ix % cols, *value))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn small_table() -> TimeSeriesTable {
        TimeSeriesTable::new(
            vec![ymd(2021, 1, 4), ymd(2021, 1, 5), ymd(2021, 1, 6)],
            vec![
                ("Close", vec![10.0, 11.0, 12.0]),
                ("VOLUME", vec![100.0, 200.0, 300.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn columns_are_lowercased() {
        let table = small_table();
        assert_eq!(table.column_names(), &["close".to_string(), "volume".to_string()]);
        assert_eq!(table.column("Close"), Some(&[10.0, 11.0, 12.0][..]));
        assert_eq!(table.column("open"), None);
    }

    #[test]
    fn rejects_malformed_tables() {
        let empty: Vec<(&str, Vec<f64>)> = vec![];
        assert!(TimeSeriesTable::new(vec![], empty).is_err());
        assert!(TimeSeriesTable::new(
            vec![ymd(2021, 1, 5), ymd(2021, 1, 4)],
            vec![("close", vec![1.0, 2.0])]
        )
        .is_err());
        assert!(
            TimeSeriesTable::new(vec![ymd(2021, 1, 5)], vec![("close", vec![1.0, 2.0])]).is_err()
        );
        assert!(TimeSeriesTable::new(
            vec![ymd(2021, 1, 5)],
            vec![("close", vec![1.0]), ("CLOSE", vec![2.0])]
        )
        .is_err());
    }

    #[test]
    fn truncation_keeps_rows_on_or_before() {
        let table = small_table();
        let truncated = table.truncate_to(ymd(2021, 1, 5)).unwrap();
        assert_eq!(truncated.len(), 2);
        assert_eq!(truncated.last_date(), ymd(2021, 1, 5));
        assert_eq!(truncated.column("volume"), Some(&[100.0, 200.0][..]));
        match table.truncate_to(ymd(2020, 12, 31)) {
            Err(ForecastError::InsufficientData { rows: 0, .. }) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn select_orders_columns() {
        let matrix = small_table().select(&["volume", "close"]).unwrap();
        assert_eq!((matrix.rows(), matrix.cols()), (3, 2));
        assert_eq!(matrix.row(1), &[200.0, 11.0]);
        assert_eq!(matrix.column(1).collect::<Vec<_>>(), vec![10.0, 11.0, 12.0]);
        let err = small_table().select(&["open"]).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn first_index_on_or_after() {
        let table = small_table();
        assert_eq!(table.first_index_on_or_after(ymd(2020, 1, 1)), 0);
        assert_eq!(table.first_index_on_or_after(ymd(2021, 1, 5)), 1);
        assert_eq!(table.first_index_on_or_after(ymd(2022, 1, 1)), 3);
    }

    #[test]
    fn deserialization_validates() {
        let table = small_table();
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(serde_json::from_str::<TimeSeriesTable>(&json).unwrap(), table);

        let empty = r#"{"dates":[],"names":["close"],"columns":[[]]}"#;
        assert!(serde_json::from_str::<TimeSeriesTable>(empty).is_err());
        let ragged =
            r#"{"dates":["2021-01-04","2021-01-05"],"names":["close"],"columns":[[1.0]]}"#;
        assert!(serde_json::from_str::<TimeSeriesTable>(ragged).is_err());
        let unnamed = r#"{"dates":["2021-01-04"],"names":[],"columns":[[1.0]]}"#;
        assert!(serde_json::from_str::<TimeSeriesTable>(unnamed).is_err());
        let unordered =
            r#"{"dates":["2021-01-05","2021-01-04"],"names":["close"],"columns":[[1.0,2.0]]}"#;
        assert!(serde_json::from_str::<TimeSeriesTable>(unordered).is_err());
    }
}
