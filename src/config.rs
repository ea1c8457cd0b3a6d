/*!
Forecast model configuration, and the widget form the desktop UI serializes it as
*/
use crate::error::{ForecastError, Result};
use crate::model::{LayerConfigBuilder, LayerSpec, ModelShape};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

fn default_dropout() -> f64 {
    0.2
}

fn default_optimizer() -> String {
    "adam".into()
}

fn default_loss() -> String {
    "mse".into()
}

fn default_step_past() -> usize {
    16
}

fn default_step_future() -> usize {
    2
}

fn default_forecast_period() -> usize {
    10
}

fn default_epochs() -> usize {
    10
}

/// Everything a forecast run needs besides the data itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// The hidden layers, in order
    pub hidden_layers: Vec<LayerSpec>,
    /// Dropout applied once after the last hidden layer
    #[serde(default = "default_dropout")]
    pub output_dropout_rate: f64,
    /// The optimizer tag, resolved by the modeling backend
    #[serde(default = "default_optimizer")]
    pub optimizer: String,
    /// The loss tag, resolved by the modeling backend
    #[serde(default = "default_loss")]
    pub loss: String,
    /// The column to forecast
    pub target_variable: String,
    /// The columns fed to the model; the first must be the target
    pub training_cols: Vec<String>,
    /// Time steps in each input window
    #[serde(default = "default_step_past")]
    pub step_past: usize,
    /// How far after a window's end its training target lies
    #[serde(default = "default_step_future")]
    pub step_future: usize,
    /// Days to forecast
    #[serde(default = "default_forecast_period")]
    pub forecast_period: usize,
    /// Training passes over the windows
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    /// How many earlier yearly vintages to run before the current one
    #[serde(default)]
    pub backtest_years: u32,
}

impl ModelConfig {
    /// A configuration forecasting `target_variable` from itself with the default hyperparameters
    pub fn new(hidden_layers: Vec<LayerSpec>, target_variable: &str) -> ModelConfig {
        let target_variable = target_variable.trim().to_lowercase();
        ModelConfig {
            hidden_layers,
            output_dropout_rate: default_dropout(),
            optimizer: default_optimizer(),
            loss: default_loss(),
            training_cols: vec![target_variable.clone()],
            target_variable,
            step_past: default_step_past(),
            step_future: default_step_future(),
            forecast_period: default_forecast_period(),
            epochs: default_epochs(),
            backtest_years: 0,
        }
    }

    /// Use `training_cols` as model inputs, moving the target to the front and adding it if absent
    pub fn with_training_cols<S: AsRef<str>>(mut self, training_cols: &[S]) -> Self {
        let target = self.target_variable.clone();
        self.training_cols = std::iter::once(target.clone())
            .chain(
                training_cols
                    .iter()
                    .map(|col| col.as_ref().trim().to_lowercase())
                    .filter(|col| *col != target),
            )
            .unique()
            .collect();
        self
    }

    /// Lowercase every column name
    pub fn normalized(mut self) -> Self {
        self.target_variable = self.target_variable.trim().to_lowercase();
        for col in self.training_cols.iter_mut() {
            *col = col.trim().to_lowercase();
        }
        self
    }

    /// Check the configuration's invariants
    pub fn validate(&self) -> Result<()> {
        if self.hidden_layers.is_empty() {
            return Err(ForecastError::Configuration(
                "a model needs at least one hidden layer".into(),
            ));
        }
        if let Some(ix) = self.hidden_layers.iter().position(|l| l.neuron_count == 0) {
            return Err(ForecastError::Configuration(format!(
                "hidden layer {} has zero neurons",
                ix
            )));
        }
        if !(0.0..1.0).contains(&self.output_dropout_rate) {
            return Err(ForecastError::Configuration(format!(
                "dropout rate {} is outside [0, 1)",
                self.output_dropout_rate
            )));
        }
        for (name, value) in &[
            ("step_past", self.step_past),
            ("step_future", self.step_future),
            ("forecast_period", self.forecast_period),
            ("epochs", self.epochs),
        ] {
            if *value == 0 {
                return Err(ForecastError::Configuration(format!("`{}` must be positive", name)));
            }
        }
        match self.training_cols.first() {
            None => {
                return Err(ForecastError::Configuration(
                    "at least one training column is required".into(),
                ))
            }
            Some(first) if *first != self.target_variable => {
                return Err(ForecastError::Configuration(format!(
                    "the target {:?} must be the first training column, found {:?}",
                    self.target_variable, first
                )))
            }
            Some(_) => {}
        }
        let mut seen = HashSet::new();
        let duplicates: Vec<&String> = self
            .training_cols
            .iter()
            .filter(|col| !seen.insert(*col))
            .collect();
        if !duplicates.is_empty() {
            return Err(ForecastError::Configuration(format!(
                "duplicate training columns: {}",
                duplicates.iter().join(", ")
            )));
        }
        Ok(())
    }

    /// The input and output shape of models for this configuration
    pub fn shape(&self) -> ModelShape {
        ModelShape {
            window_length: self.step_past,
            features: self.training_cols.len(),
            outputs: 1,
        }
    }

    /// Parse, normalize and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<ModelConfig> {
        let config: ModelConfig = serde_json::from_str(json)?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    /// Parse, normalize and validate the desktop UI's serialized widget form
    pub fn from_widget_json(json: &str) -> Result<ModelConfig> {
        let form: WidgetForm = serde_json::from_str(json)?;
        form.into_config()
    }
}

/// One entry of the UI's `layer_widgets_dict`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LayerWidget {
    /// A hidden layer's widgets
    Layer {
        /// Neurons in the layer
        neuron_spinbox: usize,
        /// The layer kind's name
        type_combobox: String,
        /// The return-full-sequence checkbox
        #[serde(alias = "rseq_checkbox", default)]
        rseq: bool,
    },
    /// The trailing dropout entry, as a percentage
    Dropout {
        /// Dropout percentage, 0 to 100
        dropout_spinbox: f64,
    },
}

/// The model configuration as the desktop UI serializes it.
///
/// The last entry of `layer_widgets_dict` carries the dropout; every other entry is a hidden layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetForm {
    /// Hidden layers followed by the dropout entry
    pub layer_widgets_dict: Vec<LayerWidget>,
    /// See `ModelConfig::step_future`
    pub step_future: usize,
    /// See `ModelConfig::step_past`
    pub step_past: usize,
    /// See `ModelConfig::forecast_period`
    pub forecast_period: usize,
    /// See `ModelConfig::epochs`
    pub epochs: usize,
    /// See `ModelConfig::optimizer`
    pub optimizer: String,
    /// See `ModelConfig::loss`
    pub loss: String,
    /// See `ModelConfig::target_variable`
    pub target_variable: String,
    /// See `ModelConfig::training_cols`. Need not list the target first
    pub training_cols: Vec<String>,
    /// See `ModelConfig::backtest_years`
    #[serde(default)]
    pub backtest_years: u32,
}

impl WidgetForm {
    /// Convert to a validated `ModelConfig`
    pub fn into_config(self) -> Result<ModelConfig> {
        let (last, layers) = self.layer_widgets_dict.split_last().ok_or_else(|| {
            ForecastError::Configuration("layer_widgets_dict is empty".into())
        })?;
        let dropout_percent = match last {
            LayerWidget::Dropout { dropout_spinbox } => *dropout_spinbox,
            LayerWidget::Layer { .. } => {
                return Err(ForecastError::Configuration(
                    "the last entry of layer_widgets_dict must hold dropout_spinbox".into(),
                ))
            }
        };
        let mut neurons = Vec::with_capacity(layers.len());
        let mut kinds = Vec::with_capacity(layers.len());
        let mut flags = Vec::with_capacity(layers.len());
        for (ix, layer) in layers.iter().enumerate() {
            match layer {
                LayerWidget::Layer {
                    neuron_spinbox,
                    type_combobox,
                    rseq,
                } => {
                    neurons.push(*neuron_spinbox);
                    kinds.push(type_combobox.as_str());
                    flags.push(*rseq);
                }
                LayerWidget::Dropout { .. } => {
                    return Err(ForecastError::Configuration(format!(
                        "entry {} of layer_widgets_dict is a dropout entry before the end",
                        ix
                    )))
                }
            }
        }
        let hidden_layers = LayerConfigBuilder::new(layers.len())
            .neuron_counts(neurons)
            .kind_names(&kinds)?
            .return_flags(flags)
            .build()?;

        let target = self.target_variable.trim().to_lowercase();
        if !self
            .training_cols
            .iter()
            .any(|col| col.trim().to_lowercase() == target)
        {
            return Err(ForecastError::Configuration(format!(
                "the target {:?} is not among the training columns {:?}",
                target, self.training_cols
            )));
        }
        let mut config =
            ModelConfig::new(hidden_layers, &target).with_training_cols(&self.training_cols);
        config.output_dropout_rate = dropout_percent / 100.0;
        config.optimizer = self.optimizer;
        config.loss = self.loss;
        config.step_past = self.step_past;
        config.step_future = self.step_future;
        config.forecast_period = self.forecast_period;
        config.epochs = self.epochs;
        config.backtest_years = self.backtest_years;
        config.validate()?;
        Ok(config)
    }
}
