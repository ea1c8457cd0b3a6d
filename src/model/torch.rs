/*!
The stacked sequence model on top of PyTorch bindings
*/

use super::{LayerKind, LayerSpec, ModelFactory, ModelShape, SequenceModel, TrainingHistory};
use crate::data::window::TrainingWindowSet;
use crate::error::{ForecastError, Result};
use crate::{CpuFloat, GpuFloat};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::convert::TryFrom;
use std::str::FromStr;
use tch::nn::{self, LinearConfig, ModuleT, OptimizerConfig, RNNConfig, VarStore, RNN};
use tch::{Device, Kind, Reduction, Tensor};
use tracing::{debug, info, warn};

/// An optimizer the backend can build, named the way Keras names them
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum OptimizerKind {
    /// Adam
    Adam,
    /// Adam with decoupled weight decay
    AdamW,
    /// Stochastic gradient descent
    Sgd,
    /// RMSprop
    RmsProp,
}

impl OptimizerKind {
    /// The learning rate used when none is configured
    pub fn default_learning_rate(self) -> f64 {
        match self {
            OptimizerKind::Sgd => 0.01,
            _ => 0.001,
        }
    }

    /// Build this optimizer over the variables of `vs`
    pub fn build(self, vs: &VarStore, learning_rate: f64) -> Result<nn::Optimizer> {
        let opt = match self {
            OptimizerKind::Adam => nn::Adam::default().build(vs, learning_rate)?,
            OptimizerKind::AdamW => nn::AdamW::default().build(vs, learning_rate)?,
            OptimizerKind::Sgd => nn::Sgd::default().build(vs, learning_rate)?,
            OptimizerKind::RmsProp => nn::RmsProp::default().build(vs, learning_rate)?,
        };
        Ok(opt)
    }
}

impl FromStr for OptimizerKind {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<OptimizerKind> {
        match s.trim().to_lowercase().as_str() {
            "adam" => Ok(OptimizerKind::Adam),
            "adamw" => Ok(OptimizerKind::AdamW),
            "sgd" => Ok(OptimizerKind::Sgd),
            "rmsprop" => Ok(OptimizerKind::RmsProp),
            _ => Err(ForecastError::UnsupportedOptimizer(s.to_string())),
        }
    }
}

/// A training loss, named the way Keras names them
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum LossKind {
    /// Mean squared error
    Mse,
    /// Mean absolute error
    Mae,
    /// Mean absolute percentage error
    Mape,
    /// Mean squared logarithmic error
    Msle,
    /// Huber loss with a delta of one
    Huber,
    /// Log of the hyperbolic cosine of the error
    LogCosh,
}

impl LossKind {
    /// Compute the mean loss of predictions `yhat` against targets `ys`
    pub fn compute(self, yhat: &Tensor, ys: &Tensor) -> Tensor {
        match self {
            LossKind::Mse => yhat.mse_loss(ys, Reduction::Mean),
            LossKind::Mae => yhat.l1_loss(ys, Reduction::Mean),
            LossKind::Huber => yhat.huber_loss(ys, Reduction::Mean, 1.0),
            LossKind::Mape => {
                ((ys - yhat).abs() / ys.abs().clamp_min(1e-7)).mean(Kind::Float) * 100.0
            }
            LossKind::Msle => {
                let log_yhat = (yhat.clamp_min(0.0) + 1.0).log();
                let log_ys = (ys.clamp_min(0.0) + 1.0).log();
                (log_yhat - log_ys).square().mean(Kind::Float)
            }
            LossKind::LogCosh => (yhat - ys).cosh().log().mean(Kind::Float),
        }
    }
}

impl FromStr for LossKind {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<LossKind> {
        match s.trim().to_lowercase().as_str() {
            "mse" | "mean_squared_error" => Ok(LossKind::Mse),
            "mae" | "mean_absolute_error" => Ok(LossKind::Mae),
            "mape" | "mean_absolute_percentage_error" => Ok(LossKind::Mape),
            "msle" | "mean_squared_logarithmic_error" => Ok(LossKind::Msle),
            "huber" => Ok(LossKind::Huber),
            "log_cosh" | "logcosh" => Ok(LossKind::LogCosh),
            _ => Err(ForecastError::UnsupportedLoss(s.to_string())),
        }
    }
}

/// An Elman recurrent layer: `h_t = tanh(W x_t + U h_{t-1} + b)`
#[derive(Debug)]
pub struct SimpleRnn {
    input: nn::Linear,
    recurrent: nn::Linear,
    hidden: i64,
}

impl SimpleRnn {
    fn new(vs: &nn::Path, in_dim: i64, hidden: i64) -> SimpleRnn {
        let no_bias = LinearConfig {
            bias: false,
            ..Default::default()
        };
        SimpleRnn {
            input: nn::linear(vs / "input", in_dim, hidden, Default::default()),
            recurrent: nn::linear(vs / "recurrent", hidden, hidden, no_bias),
            hidden,
        }
    }

    /// Run over a `[batch, steps, features]` input, returning every hidden state as
    /// `[batch, steps, hidden]`
    fn seq(&self, xs: &Tensor) -> Tensor {
        let size = xs.size();
        let (batch, steps) = (size[0], size[1]);
        let mut h = Tensor::zeros([batch, self.hidden], (xs.kind(), xs.device()));
        let mut outputs = Vec::with_capacity(steps as usize);
        for step in 0..steps {
            h = (xs.select(1, step).apply(&self.input) + h.apply(&self.recurrent)).tanh();
            outputs.push(h.shallow_clone());
        }
        Tensor::stack(&outputs, 1)
    }
}

/// A single-layer, unidirectional, batch-first recurrent configuration
fn rnn_config() -> RNNConfig {
    RNNConfig {
        has_biases: true,
        num_layers: 1,
        dropout: 0.,
        train: true,
        bidirectional: false,
        batch_first: true,
        ..Default::default()
    }
}

#[derive(Debug)]
enum Hidden {
    Dense(nn::Linear),
    Lstm(nn::LSTM),
    Gru(nn::GRU),
    SimpleRnn(SimpleRnn),
}

#[derive(Debug)]
struct HiddenLayer {
    layer: Hidden,
    return_full_sequence: bool,
}

impl HiddenLayer {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let seq = match &self.layer {
            Hidden::Dense(linear) => return xs.apply(linear),
            Hidden::Lstm(lstm) => lstm.seq(xs).0,
            Hidden::Gru(gru) => gru.seq(xs).0,
            Hidden::SimpleRnn(rnn) => rnn.seq(xs),
        };
        if self.return_full_sequence {
            seq
        } else {
            seq.select(1, -1)
        }
    }
}

/// Hidden layers, then dropout, then a dense head
#[derive(Debug)]
pub struct StackedNet {
    layers: Vec<HiddenLayer>,
    collapse_before_head: bool,
    dropout: f64,
    head: nn::Linear,
}

impl StackedNet {
    /// Build the network's variables under `vs`.
    ///
    /// A recurrent layer must be fed a sequence, so it cannot follow a recurrent layer
    /// that returns only its last state. If the stack still carries a time axis after
    /// the last hidden layer, the last time step feeds the head.
    pub fn new(
        vs: &nn::Path,
        shape: ModelShape,
        layers: &[LayerSpec],
        dropout: f64,
    ) -> Result<StackedNet> {
        if layers.is_empty() {
            return Err(ForecastError::Configuration(
                "a model needs at least one hidden layer".into(),
            ));
        }
        if !(0.0..1.0).contains(&dropout) {
            return Err(ForecastError::Configuration(format!(
                "dropout rate {} is outside [0, 1)",
                dropout
            )));
        }
        let mut width = shape.features as i64;
        let mut sequence = true;
        let mut hidden = Vec::with_capacity(layers.len());
        for (ix, spec) in layers.iter().enumerate() {
            let path = vs / format!("layer{}", ix);
            let units = spec.neuron_count as i64;
            if spec.kind.is_recurrent() && !sequence {
                return Err(ForecastError::Configuration(format!(
                    "layer {} ({}) needs a sequence, but the layer before it returns only its last state",
                    ix, spec.kind
                )));
            }
            let layer = match spec.kind {
                LayerKind::Dense => {
                    Hidden::Dense(nn::linear(&path, width, units, Default::default()))
                }
                LayerKind::Lstm => Hidden::Lstm(nn::lstm(&path, width, units, rnn_config())),
                LayerKind::Gru => Hidden::Gru(nn::gru(&path, width, units, rnn_config())),
                LayerKind::SimpleRnn => Hidden::SimpleRnn(SimpleRnn::new(&path, width, units)),
            };
            if spec.kind.is_recurrent() {
                sequence = spec.return_full_sequence;
            }
            hidden.push(HiddenLayer {
                layer,
                return_full_sequence: spec.return_full_sequence,
            });
            width = units;
        }
        if sequence {
            warn!("last hidden layer returns a full sequence; the head reads only its last step");
        }
        Ok(StackedNet {
            layers: hidden,
            collapse_before_head: sequence,
            dropout,
            head: nn::linear(vs / "head", width, shape.outputs as i64, Default::default()),
        })
    }
}

impl ModuleT for StackedNet {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let mut hidden = xs.shallow_clone();
        for layer in &self.layers {
            hidden = layer.forward(&hidden);
        }
        if self.collapse_before_head {
            hidden = hidden.select(1, -1);
        }
        hidden.dropout(self.dropout, train).apply(&self.head)
    }
}

/// A `StackedNet` together with its variables, optimizer and loss
pub struct TchSequenceModel {
    vs: VarStore,
    net: StackedNet,
    optimizer: nn::Optimizer,
    loss: LossKind,
    shape: ModelShape,
    rng: StdRng,
}

impl TchSequenceModel {
    /// The variables of this model
    pub fn var_store(&self) -> &VarStore {
        &self.vs
    }

    /// Pack the windows at `indices` into an input tensor and a target tensor
    fn batch(&self, windows: &TrainingWindowSet, indices: &[usize]) -> (Tensor, Tensor) {
        let size = windows.window_length() * windows.features();
        let mut input = Vec::<GpuFloat>::with_capacity(indices.len() * size);
        let mut output = Vec::<GpuFloat>::with_capacity(indices.len());
        for &ix in indices {
            input.extend(windows.input(ix).iter().map(|v| *v as GpuFloat));
            output.push(windows.target(ix) as GpuFloat);
        }
        let input = Tensor::from_slice(&input)
            .view([
                indices.len() as i64,
                windows.window_length() as i64,
                windows.features() as i64,
            ])
            .to_device(self.vs.device());
        let output = Tensor::from_slice(&output)
            .view([indices.len() as i64, 1])
            .to_device(self.vs.device());
        (input, output)
    }

    fn evaluate(&self, windows: &TrainingWindowSet) -> f64 {
        let indices: Vec<usize> = (0..windows.len()).collect();
        let (xs, ys) = self.batch(windows, &indices);
        tch::no_grad(|| {
            let yhat = self.net.forward_t(&xs, false);
            self.loss.compute(&yhat, &ys).double_value(&[])
        })
    }
}

impl SequenceModel for TchSequenceModel {
    fn fit(
        &mut self,
        windows: &TrainingWindowSet,
        epochs: usize,
        batch_size: usize,
        validation_fraction: f64,
    ) -> Result<TrainingHistory> {
        self.shape.check(windows)?;
        if self.shape.outputs != 1 {
            return Err(ForecastError::Configuration(format!(
                "windows carry one target each, but the model predicts {}",
                self.shape.outputs
            )));
        }
        if windows.is_empty() {
            return Err(ForecastError::insufficient(0, 1));
        }
        let (train, valid) = windows.split_validation(validation_fraction);
        if valid.is_empty() && validation_fraction > 0.0 {
            warn!(windows = windows.len(), "too few windows to hold out for validation");
        }
        info!(
            train = train.len(),
            valid = valid.len(),
            epochs,
            batch_size,
            "fitting sequence model"
        );
        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut history = TrainingHistory::default();
        for epoch in 1..=epochs {
            order.shuffle(&mut self.rng);
            let mut sum_loss = 0.0;
            let mut batches = 0;
            for indices in order.chunks(batch_size.max(1)) {
                let (xs, ys) = self.batch(&train, indices);
                let yhat = self.net.forward_t(&xs, true);
                let loss = self.loss.compute(&yhat, &ys);
                self.optimizer.backward_step(&loss);
                let loss = loss.double_value(&[]);
                if !loss.is_finite() {
                    return Err(ForecastError::Training(format!(
                        "loss diverged to {} in epoch {}",
                        loss, epoch
                    )));
                }
                sum_loss += loss;
                batches += 1;
            }
            let loss = sum_loss / batches as f64;
            history.loss.push(loss);
            if valid.is_empty() {
                debug!(epoch, loss, "epoch finished");
            } else {
                let val_loss = self.evaluate(&valid);
                history.val_loss.push(val_loss);
                debug!(epoch, loss, val_loss, "epoch finished");
            }
        }
        Ok(history)
    }

    fn predict(&self, windows: &TrainingWindowSet) -> Result<Vec<Vec<CpuFloat>>> {
        self.shape.check(windows)?;
        if windows.is_empty() {
            return Ok(Vec::new());
        }
        let indices: Vec<usize> = (0..windows.len()).collect();
        let (xs, _) = self.batch(windows, &indices);
        let output = tch::no_grad(|| self.net.forward_t(&xs, false))
            .to_device(Device::Cpu)
            .to_kind(Kind::Float)
            .flatten(0, -1);
        let values = Vec::<GpuFloat>::try_from(&output)?;
        Ok(values
            .chunks(self.shape.outputs.max(1))
            .map(|row| row.iter().map(|v| *v as CpuFloat).collect())
            .collect())
    }
}

/// Builds `TchSequenceModel`s
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TchModelFactory {
    /// The device models are placed on
    pub device: Device,
    /// Seeds weight initialization and batch shuffling, when set
    pub seed: Option<u64>,
    /// Overrides the optimizer's default learning rate, when set
    pub learning_rate: Option<f64>,
}

impl Default for TchModelFactory {
    fn default() -> Self {
        TchModelFactory {
            device: Device::cuda_if_available(),
            seed: None,
            learning_rate: None,
        }
    }
}

impl TchModelFactory {
    /// A factory placing models on `device`
    pub fn new(device: Device) -> TchModelFactory {
        TchModelFactory {
            device,
            ..Default::default()
        }
    }

    /// Seed weight initialization and shuffling
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Override the optimizer's learning rate
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = Some(learning_rate);
        self
    }
}

impl ModelFactory for TchModelFactory {
    fn build(
        &self,
        shape: ModelShape,
        layers: &[LayerSpec],
        dropout: f64,
        optimizer: &str,
        loss: &str,
    ) -> Result<Box<dyn SequenceModel>> {
        let optimizer_kind: OptimizerKind = optimizer.parse()?;
        let loss: LossKind = loss.parse()?;
        if let Some(seed) = self.seed {
            tch::manual_seed(seed as i64);
        }
        let vs = VarStore::new(self.device);
        let net = StackedNet::new(&vs.root(), shape, layers, dropout)?;
        let learning_rate = self
            .learning_rate
            .unwrap_or_else(|| optimizer_kind.default_learning_rate());
        let optimizer = optimizer_kind.build(&vs, learning_rate)?;
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        debug!(
            ?shape,
            layers = layers.len(),
            dropout,
            ?optimizer_kind,
            ?loss,
            learning_rate,
            "built sequence model"
        );
        Ok(Box::new(TchSequenceModel {
            vs,
            net,
            optimizer,
            loss,
            shape,
            rng,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::window::WindowedDatasetBuilder;
    use crate::data::Matrix;
    use crate::model::LayerConfigBuilder;

    fn ramp_windows(rows: usize, features: usize) -> TrainingWindowSet {
        let data = (0..rows)
            .flat_map(|r| (0..features).map(move |f| (r + f) as f64 / rows as f64))
            .collect();
        let series = Matrix::new(rows, features, data).unwrap();
        WindowedDatasetBuilder::new(8, 2).build(&series).unwrap()
    }

    #[test]
    fn tags_resolve() {
        assert_eq!("Adam".parse::<OptimizerKind>().unwrap(), OptimizerKind::Adam);
        assert_eq!("RMSprop".parse::<OptimizerKind>().unwrap(), OptimizerKind::RmsProp);
        assert_eq!("mean_squared_error".parse::<LossKind>().unwrap(), LossKind::Mse);
        assert_eq!("MAE".parse::<LossKind>().unwrap(), LossKind::Mae);
        match "Lion".parse::<OptimizerKind>() {
            Err(ForecastError::UnsupportedOptimizer(tag)) => assert_eq!(tag, "Lion"),
            other => panic!("unexpected {:?}", other),
        }
        match "ctc".parse::<LossKind>() {
            Err(ForecastError::UnsupportedLoss(tag)) => assert_eq!(tag, "ctc"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn every_kind_trains_and_predicts() {
        let windows = ramp_windows(60, 3);
        let shape = ModelShape {
            window_length: 8,
            features: 3,
            outputs: 1,
        };
        let layers = LayerConfigBuilder::new(3)
            .neuron_counts(vec![8, 6, 4])
            .kinds(vec![LayerKind::Gru, LayerKind::SimpleRnn, LayerKind::Dense])
            .return_flags(vec![true, false, false])
            .build()
            .unwrap();
        let factory = TchModelFactory::new(Device::Cpu).with_seed(42);
        let mut model = factory.build(shape, &layers, 0.2, "adam", "mse").unwrap();
        let history = model.fit(&windows, 2, 16, 0.1).unwrap();
        assert_eq!(history.loss.len(), 2);
        assert_eq!(history.val_loss.len(), 2);
        let predictions = model.predict(&windows.tail(5)).unwrap();
        assert_eq!(predictions.len(), 5);
        assert!(predictions.iter().all(|p| p.len() == 1 && p[0].is_finite()));
    }

    #[test]
    fn default_single_layer_collapses_before_head() {
        let windows = ramp_windows(30, 1);
        let shape = ModelShape {
            window_length: 8,
            features: 1,
            outputs: 1,
        };
        let layers = LayerConfigBuilder::new(1).neuron_counts(vec![4]).build().unwrap();
        assert!(layers[0].return_full_sequence);
        let factory = TchModelFactory::new(Device::Cpu).with_seed(1);
        let mut model = factory.build(shape, &layers, 0.0, "sgd", "huber").unwrap();
        model.fit(&windows, 1, 16, 0.1).unwrap();
        assert_eq!(model.predict(&windows).unwrap().len(), windows.len());
    }

    #[test]
    fn recurrent_after_collapse_is_rejected() {
        let shape = ModelShape {
            window_length: 8,
            features: 1,
            outputs: 1,
        };
        let layers = LayerConfigBuilder::new(2)
            .return_flags(vec![false, false])
            .build()
            .unwrap();
        let factory = TchModelFactory::new(Device::Cpu);
        match factory.build(shape, &layers, 0.2, "adam", "mse") {
            Err(err) => assert!(err.is_configuration()),
            Ok(_) => panic!("stack should be rejected"),
        }
        match factory.build(shape, &layers[..1], 0.2, "adagrad", "mse") {
            Err(ForecastError::UnsupportedOptimizer(_)) => {}
            Err(err) => panic!("unexpected {:?}", err),
            Ok(_) => panic!("optimizer should be rejected"),
        }
    }
}
