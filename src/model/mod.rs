/*!
Trainable sequence models: the layer description, the factory seam, and the `tch` backend
*/
use crate::data::window::TrainingWindowSet;
use crate::error::{ForecastError, Result};
use crate::CpuFloat;

pub mod layers;
pub mod torch;

pub use layers::{LayerConfigBuilder, LayerKind, LayerSpec};

/// The shape of a model's inputs and outputs
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ModelShape {
    /// Time steps per input window
    pub window_length: usize,
    /// Features per time step
    pub features: usize,
    /// Width of each prediction
    pub outputs: usize,
}

impl ModelShape {
    /// Check that `windows` have the window length and feature count this shape expects
    pub fn check(&self, windows: &TrainingWindowSet) -> Result<()> {
        if windows.window_length() != self.window_length || windows.features() != self.features {
            return Err(ForecastError::Configuration(format!(
                "model expects windows of {}x{}, got {}x{}",
                self.window_length,
                self.features,
                windows.window_length(),
                windows.features()
            )));
        }
        Ok(())
    }
}

/// Per-epoch losses recorded while fitting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingHistory {
    /// Mean training loss of each epoch
    pub loss: Vec<f64>,
    /// Validation loss of each epoch, empty when nothing was held out
    pub val_loss: Vec<f64>,
}

impl TrainingHistory {
    /// The training loss of the last epoch
    pub fn final_loss(&self) -> Option<f64> {
        self.loss.last().copied()
    }

    /// The validation loss of the last epoch
    pub fn final_val_loss(&self) -> Option<f64> {
        self.val_loss.last().copied()
    }
}

/// A model mapping input windows to predictions, which can be trained in place
pub trait SequenceModel {
    /// Train on `windows` for `epochs` passes in batches of `batch_size`, holding out the
    /// trailing `validation_fraction` of windows (in order) for validation
    fn fit(
        &mut self,
        windows: &TrainingWindowSet,
        epochs: usize,
        batch_size: usize,
        validation_fraction: f64,
    ) -> Result<TrainingHistory>;

    /// Predict one output vector per input window
    fn predict(&self, windows: &TrainingWindowSet) -> Result<Vec<Vec<CpuFloat>>>;
}

/// Builds fresh, untrained sequence models
pub trait ModelFactory {
    /// Stack `layers`, then dropout at `dropout`, then a dense head of `shape.outputs` units.
    ///
    /// `optimizer` and `loss` are backend tags passed through unvalidated; an unknown tag
    /// fails with `UnsupportedOptimizer` or `UnsupportedLoss`.
    fn build(
        &self,
        shape: ModelShape,
        layers: &[LayerSpec],
        dropout: f64,
        optimizer: &str,
        loss: &str,
    ) -> Result<Box<dyn SequenceModel>>;
}

impl<M: ModelFactory + ?Sized> ModelFactory for Box<M> {
    fn build(
        &self,
        shape: ModelShape,
        layers: &[LayerSpec],
        dropout: f64,
        optimizer: &str,
        loss: &str,
    ) -> Result<Box<dyn SequenceModel>> {
        (**self).build(shape, layers, dropout, optimizer, loss)
    }
}
