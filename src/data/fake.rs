/*!
Generate fake daily price data, for testing and demos
*/
use super::TimeSeriesTable;
use crate::error::{ForecastError, Result};
use crate::util::to_days;
use chrono::{Duration, NaiveDate};
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// A trait implemented by price generators
pub trait PriceGen {
    /// Generate a price, jumping forward a given amount of time
    fn price_after(&mut self, after: Duration) -> f64;
}

/// A deterministic straight-line price
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LinearRamp {
    /// The next price to emit
    pub price: f64,
    /// The change in price per day
    pub slope: f64,
}

impl PriceGen for LinearRamp {
    fn price_after(&mut self, after: Duration) -> f64 {
        let price = self.price;
        self.price += self.slope * to_days::<f64>(after);
        price
    }
}

/// Generate fake prices using a time-weighted geometric random walk with drift
#[derive(Debug, Copy, Clone)]
pub struct PriceRandomWalk<R> {
    /// The RNG used by this random walk
    pub rng: R,
    /// The current price
    pub price: f64,
    /// The daily drift of log price
    pub drift: f64,
    /// The daily noise of log price
    pub jitter: Normal<f64>,
}

impl<R: Rng> PriceRandomWalk<R> {
    /// A random walk starting at `price` with a daily log-price volatility of `volatility`
    pub fn new(rng: R, price: f64, drift: f64, volatility: f64) -> Result<PriceRandomWalk<R>> {
        let jitter = Normal::new(0.0, volatility)
            .map_err(|err| ForecastError::Configuration(format!("bad volatility: {:?}", err)))?;
        Ok(PriceRandomWalk {
            rng,
            price,
            drift,
            jitter,
        })
    }
}

impl<R: Rng> PriceGen for PriceRandomWalk<R> {
    fn price_after(&mut self, after: Duration) -> f64 {
        let price = self.price;
        let days: f64 = to_days(after);
        let shock = self.jitter.sample(&mut self.rng) * days.sqrt();
        self.price *= (self.drift * days + shock).exp();
        price
    }
}

/// Generate `days` consecutive daily rows starting at `start`, with a single `column`
/// driven by `price_gen`
pub fn daily_series<P: PriceGen>(
    start: NaiveDate,
    days: usize,
    column: &str,
    mut price_gen: P,
) -> Result<TimeSeriesTable> {
    let dates = (0..days as i64)
        .map(|offset| start + Duration::days(offset))
        .collect();
    let prices = (0..days)
        .map(|_| price_gen.price_after(Duration::days(1)))
        .collect();
    TimeSeriesTable::new(dates, vec![(column, prices)])
}

/// A `close` column running 1.0, 2.0, ..., `days` from `start`
pub fn linear_ramp(start: NaiveDate, days: usize) -> Result<TimeSeriesTable> {
    daily_series(
        start,
        days,
        "close",
        LinearRamp {
            price: 1.0,
            slope: 1.0,
        },
    )
}

/// Open, high, low, close and volume columns around a random walk close
pub fn ohlcv_walk<R: Rng>(
    mut rng: R,
    start: NaiveDate,
    days: usize,
    price: f64,
) -> Result<TimeSeriesTable> {
    let volume = Normal::<f64>::new(1e6, 2e5).map_err(|err| {
        ForecastError::Configuration(format!("bad volume distribution: {:?}", err))
    })?;
    let walk_rng = rand::rngs::StdRng::from_rng(&mut rng)
        .map_err(|err| ForecastError::Configuration(format!("cannot seed walk: {}", err)))?;
    let walk = PriceRandomWalk::new(walk_rng, price, 2e-4, 0.015)?;
    let mut table = daily_series(start, days, "close", walk)?;
    let closes = table.column("close").map(<[f64]>::to_vec).unwrap_or_default();
    let mut open = Vec::with_capacity(days);
    let mut high = Vec::with_capacity(days);
    let mut low = Vec::with_capacity(days);
    let mut vol = Vec::with_capacity(days);
    for (ix, close) in closes.iter().enumerate() {
        let prev = if ix == 0 { *close } else { closes[ix - 1] };
        let spread = close.max(prev) * rng.gen_range(0.0, 0.01);
        open.push(prev);
        high.push(close.max(prev) + spread);
        low.push(close.min(prev) - spread);
        vol.push(volume.sample(&mut rng).max(0.0).round());
    }
    table.push_column("open", open)?;
    table.push_column("high", high)?;
    table.push_column("low", low)?;
    table.push_column("volume", vol)?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
    }

    #[test]
    fn ramp_counts_up() {
        let table = linear_ramp(start(), 5).unwrap();
        assert_eq!(table.column("close"), Some(&[1.0, 2.0, 3.0, 4.0, 5.0][..]));
        assert_eq!(table.last_date(), NaiveDate::from_ymd_opt(2020, 1, 5).unwrap());
    }

    #[test]
    fn walk_is_reproducible_and_consistent() {
        let a = ohlcv_walk(StdRng::seed_from_u64(7), start(), 50, 40.0).unwrap();
        let b = ohlcv_walk(StdRng::seed_from_u64(7), start(), 50, 40.0).unwrap();
        assert_eq!(a, b);
        let close = a.column("close").unwrap();
        let high = a.column("high").unwrap();
        let low = a.column("low").unwrap();
        assert_eq!(close[0], 40.0);
        for ix in 0..a.len() {
            assert!(low[ix] <= close[ix] && close[ix] <= high[ix]);
            assert!(close[ix] > 0.0);
        }
    }
}
