/*!
Multi-step time series forecasting with stacked recurrent networks, written in Rust using
PyTorch bindings.

A forecast run takes a dated table of numeric columns and a `ModelConfig`, and for each backtest
vintage truncates the table, standardizes the training columns, slices them into supervised windows,
trains a fresh model built by a `ModelFactory`, and predicts the target over the following days. The
forecast is shifted so that it starts from the last observed value of the target.

Models are built by the `tch` backend in [`model::torch`], but any `ModelFactory` can be plugged in.
Long runs can be moved off the calling thread with a [`worker::ForecastWorker`].
*/
#![forbid(missing_docs)]

pub mod config;
pub mod data;
pub mod error;
pub mod forecast;
pub mod model;
pub mod util;
pub mod worker;

pub use config::ModelConfig;
pub use data::{DataSource, Matrix, TimeSeriesTable};
pub use error::{ForecastError, Result};
pub use forecast::{ForecastEngine, ForecastTable, TrainingOptions};
pub use model::{LayerConfigBuilder, LayerKind, LayerSpec, ModelFactory, SequenceModel};
pub use worker::ForecastWorker;

/// The floating point type to be used for CPU calculations
pub type CpuFloat = f64;

/// The floating point type to be used for GPU calculations
pub type GpuFloat = f32;
