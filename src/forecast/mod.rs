/*!
The forecasting pipeline: per vintage, truncate, scale, window, train, predict, unscale and anchor
*/
use crate::config::ModelConfig;
use crate::data::scale::StandardScaler;
use crate::data::window::WindowedDatasetBuilder;
use crate::data::{DataSource, TimeSeriesTable, DATE_COLUMN};
use crate::error::{ForecastError, Result};
use crate::model::ModelFactory;
use crate::util::{days_after, fmt_date, months_before, years_before};
use crate::CpuFloat;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::{debug, info};

/// Windows per training batch
pub const BATCH_SIZE: usize = 16;

/// Trailing fraction of windows held out for validation
pub const VALIDATION_FRACTION: f64 = 0.1;

/// Months before the vintage's ending date searched for the anchoring observation
pub const ANCHOR_WINDOW_MONTHS: u32 = 9;

/// Training and post-processing constants of the engine
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TrainingOptions {
    /// Windows per training batch
    pub batch_size: usize,
    /// Trailing fraction of windows held out for validation
    pub validation_fraction: f64,
    /// Months before the ending date searched for the anchoring observation
    pub anchor_window_months: u32,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        TrainingOptions {
            batch_size: BATCH_SIZE,
            validation_fraction: VALIDATION_FRACTION,
            anchor_window_months: ANCHOR_WINDOW_MONTHS,
        }
    }
}

/// One forecast day
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    /// The forecast date
    pub date: NaiveDate,
    /// The forecast value of the target
    pub value: CpuFloat,
}

/// Forecast values of one target over consecutive days
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastTable {
    /// The forecast column
    pub target: String,
    /// One row per day, in order
    pub rows: Vec<ForecastRow>,
}

/// A historical series followed by its forecast, as a chart draws it.
///
/// The last `forecast_len` points are the forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSeries {
    /// History, then forecast
    pub points: Vec<(NaiveDate, CpuFloat)>,
    /// How many trailing points are forecast
    pub forecast_len: usize,
}

impl ForecastTable {
    /// Pair up dates and values
    pub fn new(
        target: &str,
        dates: Vec<NaiveDate>,
        values: Vec<CpuFloat>,
    ) -> Result<ForecastTable> {
        if dates.len() != values.len() {
            return Err(ForecastError::Training(format!(
                "{} forecast values for {} forecast dates",
                values.len(),
                dates.len()
            )));
        }
        Ok(ForecastTable {
            target: target.to_string(),
            rows: dates
                .into_iter()
                .zip(values)
                .map(|(date, value)| ForecastRow { date, value })
                .collect(),
        })
    }

    /// The number of forecast days
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no forecast days
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The forecast dates
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|row| row.date).collect()
    }

    /// The forecast values
    pub fn values(&self) -> Vec<CpuFloat> {
        self.rows.iter().map(|row| row.value).collect()
    }

    /// Append this forecast after the history of its target in `history`
    pub fn append_to(&self, history: &TimeSeriesTable) -> Result<ChartSeries> {
        let actual = history.column(&self.target).ok_or_else(|| {
            ForecastError::Configuration(format!("history has no column {:?}", self.target))
        })?;
        let mut points: Vec<(NaiveDate, CpuFloat)> = history
            .dates()
            .iter()
            .copied()
            .zip(actual.iter().copied())
            .collect();
        points.extend(self.rows.iter().map(|row| (row.date, row.value)));
        Ok(ChartSeries {
            points,
            forecast_len: self.len(),
        })
    }

    /// Write the forecast as CSV with a `date` column and a column named after the target.
    /// On success, return how many rows were written
    pub fn write_csv<W: Write>(&self, wtr: W) -> Result<usize> {
        let mut wtr = csv::Writer::from_writer(wtr);
        wtr.write_record(&[DATE_COLUMN, self.target.as_str()])?;
        for row in &self.rows {
            wtr.write_record(&[fmt_date(row.date), row.value.to_string()])?;
        }
        wtr.flush()?;
        Ok(self.len())
    }
}

/// Shift `values` so the first equals `anchor`, returning the shift applied
pub fn correct_offset(values: &mut [CpuFloat], anchor: CpuFloat) -> CpuFloat {
    let offset = match values.first() {
        Some(first) => anchor - first,
        None => return 0.0,
    };
    for value in values.iter_mut() {
        *value += offset;
    }
    offset
}

/// Runs the forecasting pipeline with models from a `ModelFactory`
#[derive(Debug, Clone)]
pub struct ForecastEngine<M> {
    factory: M,
    options: TrainingOptions,
}

impl<M: ModelFactory> ForecastEngine<M> {
    /// An engine with the default training options
    pub fn new(factory: M) -> ForecastEngine<M> {
        ForecastEngine {
            factory,
            options: TrainingOptions::default(),
        }
    }

    /// Replace the training options
    pub fn with_options(mut self, options: TrainingOptions) -> Self {
        self.options = options;
        self
    }

    /// The model factory
    pub fn factory(&self) -> &M {
        &self.factory
    }

    /// The training options
    pub fn options(&self) -> &TrainingOptions {
        &self.options
    }

    /// Load a series from `source`, then forecast it
    pub fn forecast_from<S: DataSource + ?Sized>(
        &self,
        source: &S,
        config: &ModelConfig,
    ) -> Result<ForecastTable> {
        let series = source.load()?;
        self.forecast(&series, config)
    }

    /// Forecast `config.forecast_period` days past the end of `series`.
    ///
    /// Vintages from `config.backtest_years` years back down to the present are each run in
    /// full, oldest first; only the present vintage's forecast is returned.
    pub fn forecast(
        &self,
        series: &TimeSeriesTable,
        config: &ModelConfig,
    ) -> Result<ForecastTable> {
        config.validate()?;
        let mut latest = None;
        for years_back in (0..=config.backtest_years).rev() {
            let forecast = self.forecast_vintage(series, config, years_back)?;
            if years_back > 0 {
                // TODO: compare backtest vintages against the actuals that followed them
                debug!(years_back, rows = forecast.len(), "discarding backtest vintage");
            }
            latest = Some(forecast);
        }
        latest.ok_or_else(|| ForecastError::insufficient(0, 1))
    }

    /// Forecast as if the series ended `years_back` years before its last date
    pub fn forecast_vintage(
        &self,
        series: &TimeSeriesTable,
        config: &ModelConfig,
        years_back: u32,
    ) -> Result<ForecastTable> {
        let ending_date = years_before(series.last_date(), years_back).ok_or_else(|| {
            ForecastError::Configuration(format!("cannot go back {} years", years_back))
        })?;
        let truncated = series.truncate_to(ending_date)?;

        // Step 1: scale the training columns, target first
        let raw = truncated.select(&config.training_cols)?;
        let scaler = StandardScaler::fit(&raw)?;
        let scaled = scaler.transform(&raw)?;

        // Step 2: window
        let windows =
            WindowedDatasetBuilder::new(config.step_past, config.step_future).build(&scaled)?;
        if windows.len() < config.forecast_period {
            return Err(ForecastError::insufficient(windows.len(), config.forecast_period));
        }

        // Step 3: locate the anchoring observation before paying for training
        let anchor_start = months_before(ending_date, self.options.anchor_window_months)
            .ok_or_else(|| {
                ForecastError::Configuration("anchor window precedes the calendar".into())
            })?;
        if truncated.first_index_on_or_after(anchor_start) >= truncated.len() {
            return Err(ForecastError::insufficient(0, 1));
        }
        let anchor = raw.get(raw.rows() - 1, 0);

        info!(
            vintage = %ending_date,
            rows = truncated.len(),
            windows = windows.len(),
            "training vintage"
        );

        // Step 4: train a fresh model
        let mut model = self.factory.build(
            config.shape(),
            &config.hidden_layers,
            config.output_dropout_rate,
            &config.optimizer,
            &config.loss,
        )?;
        let history = model.fit(
            &windows,
            config.epochs,
            self.options.batch_size,
            self.options.validation_fraction,
        )?;

        // Step 5: predict from the trailing windows and unscale
        let dates = days_after(truncated.last_date(), config.forecast_period)
            .ok_or_else(|| ForecastError::Configuration("forecast runs past the calendar".into()))?;
        let predictions = model.predict(&windows.tail(config.forecast_period))?;
        let mut values = predictions
            .iter()
            .map(|prediction| {
                let scaled = prediction.first().copied().ok_or_else(|| {
                    ForecastError::Training("model returned an empty prediction".into())
                })?;
                scaler.inverse_target(scaled)
            })
            .collect::<Result<Vec<CpuFloat>>>()?;

        // Step 6: anchor the forecast on the last observation
        let offset = correct_offset(&mut values, anchor);
        info!(
            vintage = %ending_date,
            loss = ?history.final_loss(),
            val_loss = ?history.final_val_loss(),
            offset,
            "vintage forecast ready"
        );
        ForecastTable::new(&config.target_variable, dates, values)
    }
}
