/*!
Errors raised by the forecasting pipeline
*/
use thiserror::Error;

/// An error raised while configuring, preparing, training or running a forecast
#[derive(Debug, Error)]
pub enum ForecastError {
    /// A malformed model or layer configuration
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A layer kind the model factory does not know how to build
    #[error("unsupported layer kind: {0:?}")]
    UnsupportedLayerKind(String),
    /// An optimizer tag the modeling backend does not recognize
    #[error("unsupported optimizer: {0:?}")]
    UnsupportedOptimizer(String),
    /// A loss tag the modeling backend does not recognize
    #[error("unsupported loss: {0:?}")]
    UnsupportedLoss(String),
    /// Too few rows (or windows) to produce what was asked for
    #[error("insufficient data: have {rows}, need at least {required}")]
    InsufficientData {
        /// How many rows or windows were available
        rows: usize,
        /// How many were required
        required: usize,
    },
    /// The upstream data supplier failed
    #[error("data source error: {0}")]
    DataSource(String),
    /// The modeling backend failed during fit or predict
    #[error("training failure: {0}")]
    Training(String),
}

impl ForecastError {
    /// Whether this error belongs to the configuration class: a bad layer list, or an
    /// unknown layer kind, optimizer or loss
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ForecastError::Configuration(_)
                | ForecastError::UnsupportedLayerKind(_)
                | ForecastError::UnsupportedOptimizer(_)
                | ForecastError::UnsupportedLoss(_)
        )
    }

    /// Shorthand for an `InsufficientData` error
    pub fn insufficient(rows: usize, required: usize) -> ForecastError {
        ForecastError::InsufficientData { rows, required }
    }
}

impl From<tch::TchError> for ForecastError {
    fn from(err: tch::TchError) -> Self {
        ForecastError::Training(err.to_string())
    }
}

impl From<csv::Error> for ForecastError {
    fn from(err: csv::Error) -> Self {
        ForecastError::DataSource(err.to_string())
    }
}

impl From<std::io::Error> for ForecastError {
    fn from(err: std::io::Error) -> Self {
        ForecastError::DataSource(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::Configuration(err.to_string())
    }
}

/// Result type for the forecasting pipeline
pub type Result<T> = std::result::Result<T, ForecastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_class() {
        assert!(ForecastError::Configuration("x".into()).is_configuration());
        assert!(ForecastError::UnsupportedLayerKind("Conv".into()).is_configuration());
        assert!(ForecastError::UnsupportedOptimizer("lion".into()).is_configuration());
        assert!(ForecastError::UnsupportedLoss("ctc".into()).is_configuration());
        assert!(!ForecastError::insufficient(3, 18).is_configuration());
        assert!(!ForecastError::Training("nan".into()).is_configuration());
    }

    #[test]
    fn insufficient_message() {
        let err = ForecastError::insufficient(17, 18);
        assert_eq!(err.to_string(), "insufficient data: have 17, need at least 18");
    }
}
