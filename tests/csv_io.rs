/*!
Test CSV IO
*/
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::{Seek, SeekFrom, Write};
use stockcast::data::{fake::*, io::*, *};
use stockcast::ForecastError;
use tempfile::{tempfile, NamedTempFile};

#[test]
fn fake_data_roundtrip() {
    const TEST_DATA_LENGTH: usize = 1000;
    let start = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
    let table = ohlcv_walk(StdRng::seed_from_u64(7), start, TEST_DATA_LENGTH, 40.0)
        .expect("Generating test data should not fail!");
    let mut tmp = tempfile().expect("Tempfile creation should not fail!");
    let written = write_table(&mut tmp, &table).expect("Writing test data should not fail!");
    assert_eq!(written, TEST_DATA_LENGTH);
    tmp.seek(SeekFrom::Start(0)).expect("Seek should not fail");
    let read = read_table(&mut tmp).expect("Reading test data should not fail");
    assert_eq!(table, read);
}

#[test]
fn csv_source_normalizes_headers() {
    let mut file = NamedTempFile::new().expect("Tempfile creation should not fail!");
    write!(
        file,
        "Date,Close,Volume\n2021-01-04 00:00:00,10.5,100\n2021-01-05,11,200\n"
    )
    .unwrap();
    let table = CsvSource::new(file.path()).load().unwrap();
    assert_eq!(table.column_names(), &["close".to_string(), "volume".to_string()]);
    assert_eq!(table.column("CLOSE"), Some(&[10.5, 11.0][..]));
    assert_eq!(table.last_date(), NaiveDate::from_ymd_opt(2021, 1, 5).unwrap());
}

#[test]
fn csv_source_failures_are_data_source_errors() {
    let missing = CsvSource::new("/definitely/not/a/real/path.csv").load();
    assert!(matches!(missing, Err(ForecastError::DataSource(_))));

    let mut file = NamedTempFile::new().unwrap();
    write!(file, "date,close\n2021-01-04,ten\n").unwrap();
    let bad = CsvSource::new(file.path()).load();
    assert!(matches!(bad, Err(ForecastError::DataSource(_))));

    let mut file = NamedTempFile::new().unwrap();
    write!(file, "date,close\n2021-01-05,1\n2021-01-04,2\n").unwrap();
    let unordered = CsvSource::new(file.path()).load();
    assert!(matches!(unordered, Err(ForecastError::DataSource(_))));
}
