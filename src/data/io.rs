/*!
CSV input and output for normalized time series tables
*/
use super::{DataSource, TimeSeriesTable, DATE_COLUMN};
use crate::error::{ForecastError, Result};
use crate::util::fmt_date;
use crate::CpuFloat;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// The plain date format
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Datetime formats accepted in the date column. The time part is dropped
pub const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a date cell, accepting plain dates, common datetimes and RFC 3339 timestamps
pub fn parse_date(field: &str) -> Option<NaiveDate> {
    let field = field.trim();
    if let Ok(date) = NaiveDate::parse_from_str(field, DATE_FORMAT) {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(field) {
        return Some(dt.naive_local().date());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(field, format).ok())
        .map(|dt| dt.date())
}

/// Read a table from CSV. The first column holds dates and is renamed to `date`, every other
/// column must be numeric. Headers are lowercased.
pub fn read_table<R: Read>(rdr: R) -> Result<TimeSeriesTable> {
    let mut rdr = ::csv::Reader::from_reader(rdr);
    let headers = rdr.headers()?.clone();
    if headers.len() < 2 {
        return Err(ForecastError::DataSource(
            "expected a date column followed by at least one numeric column".into(),
        ));
    }
    let names: Vec<String> = headers.iter().skip(1).map(str::to_lowercase).collect();
    let mut dates = Vec::new();
    let mut columns: Vec<Vec<CpuFloat>> = vec![Vec::new(); names.len()];
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        let mut fields = record.iter();
        let first = fields.next().unwrap_or("");
        let date = parse_date(first).ok_or_else(|| {
            ForecastError::DataSource(format!("row {}: unparseable date {:?}", line + 1, first))
        })?;
        dates.push(date);
        for (ix, field) in fields.enumerate().take(names.len()) {
            let value = CpuFloat::from_str(field.trim()).map_err(|_| {
                ForecastError::DataSource(format!(
                    "row {}: column {:?} holds non-numeric value {:?}",
                    line + 1,
                    names[ix],
                    field
                ))
            })?;
            columns[ix].push(value);
        }
    }
    debug!(rows = dates.len(), columns = names.len(), "read csv table");
    TimeSeriesTable::new(dates, names.into_iter().zip(columns).collect())
}

/// Write a table to CSV in the format `read_table` accepts.
/// On success, return how many rows were written
pub fn write_table<W: Write>(wtr: W, table: &TimeSeriesTable) -> Result<usize> {
    let mut wtr = ::csv::Writer::from_writer(wtr);
    let mut header = vec![DATE_COLUMN.to_string()];
    header.extend(table.column_names().iter().cloned());
    wtr.write_record(&header)?;
    let columns: Vec<&[CpuFloat]> = table
        .column_names()
        .iter()
        .filter_map(|name| table.column(name))
        .collect();
    for (row, date) in table.dates().iter().enumerate() {
        let mut record = vec![fmt_date(*date)];
        record.extend(columns.iter().map(|column| column[row].to_string()));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(table.len())
}

/// A CSV file on disk
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CsvSource {
    /// The path of the file to read
    pub path: PathBuf,
}

impl CsvSource {
    /// A source reading the file at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> CsvSource {
        CsvSource {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl DataSource for CsvSource {
    fn load(&self) -> Result<TimeSeriesTable> {
        let file = File::open(&self.path).map_err(|err| {
            ForecastError::DataSource(format!("{}: {}", self.path.display(), err))
        })?;
        read_table(file)
    }
}
