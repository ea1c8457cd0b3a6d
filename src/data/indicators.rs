/*!
Derived feature columns computed with technical indicators
*/
use super::TimeSeriesTable;
use crate::error::{ForecastError, Result};
use ta::indicators::RelativeStrengthIndex;
use ta::Next;

/// The default RSI look-back period
pub const RSI_PERIOD: u32 = 14;

/// Append an `rsi` column computed over `source` with the given look-back period.
///
/// The indicator is fed every row in order, so its first values are warm-up values
/// rather than missing.
pub fn add_rsi(table: &mut TimeSeriesTable, source: &str, period: u32) -> Result<()> {
    let values = table
        .column(source)
        .ok_or_else(|| {
            ForecastError::Configuration(format!("no column {:?} to compute RSI over", source))
        })?
        .to_vec();
    let mut rsi = RelativeStrengthIndex::new(period)
        .map_err(|err| {
            ForecastError::Configuration(format!("bad RSI period {}: {}", period, err))
        })?;
    let column = values.into_iter().map(|value| rsi.next(value)).collect();
    table.push_column("rsi", column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fake::linear_ramp;
    use chrono::NaiveDate;

    #[test]
    fn rsi_of_a_rising_series_is_high() {
        let mut table = linear_ramp(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), 60).unwrap();
        add_rsi(&mut table, "Close", RSI_PERIOD).unwrap();
        let rsi = table.column("rsi").unwrap();
        assert_eq!(rsi.len(), 60);
        assert!(rsi[59] > 90.0);
        assert!(rsi.iter().all(|v| (0.0..=100.0).contains(v)));
    }

    #[test]
    fn rsi_needs_a_source_and_a_period() {
        let mut table = linear_ramp(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), 10).unwrap();
        assert!(add_rsi(&mut table, "open", RSI_PERIOD).is_err());
        assert!(add_rsi(&mut table, "close", 0).is_err());
        add_rsi(&mut table, "close", 3).unwrap();
        assert!(add_rsi(&mut table, "close", 3).is_err());
    }
}
