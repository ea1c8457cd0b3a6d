/*!
Hidden layer descriptions and the builder that validates them
*/
use crate::error::{ForecastError, Result};
use itertools::{izip, Itertools};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

/// Default neurons per layer
pub const DEFAULT_NEURONS: usize = 64;

/// The kind of a hidden layer
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum LayerKind {
    /// A fully connected layer, applied to the last axis
    Dense,
    /// A long short-term memory layer
    #[serde(rename = "LSTM")]
    Lstm,
    /// A gated recurrent unit layer
    #[serde(rename = "GRU")]
    Gru,
    /// An Elman recurrent layer with a tanh activation
    #[serde(rename = "SimpleRNN")]
    SimpleRnn,
}

impl LayerKind {
    /// Every supported kind
    pub const ALL: [LayerKind; 4] = [
        LayerKind::Dense,
        LayerKind::Lstm,
        LayerKind::Gru,
        LayerKind::SimpleRnn,
    ];

    /// The canonical name of this kind
    pub fn name(self) -> &'static str {
        match self {
            LayerKind::Dense => "Dense",
            LayerKind::Lstm => "LSTM",
            LayerKind::Gru => "GRU",
            LayerKind::SimpleRnn => "SimpleRNN",
        }
    }

    /// Whether this kind consumes a sequence step by step
    pub fn is_recurrent(self) -> bool {
        !matches!(self, LayerKind::Dense)
    }
}

impl Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LayerKind {
    type Err = ForecastError;

    /// Parse a kind name, ignoring case
    fn from_str(s: &str) -> Result<LayerKind> {
        LayerKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ForecastError::UnsupportedLayerKind(s.to_string()))
    }
}

/// One hidden layer of a stacked sequence model
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct LayerSpec {
    /// The kind of layer
    pub kind: LayerKind,
    /// The number of units in the layer
    pub neuron_count: usize,
    /// Whether a recurrent layer emits one vector per time step rather than only the last
    pub return_full_sequence: bool,
}

/// Builds an ordered, validated list of `LayerSpec`s
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct LayerConfigBuilder {
    layer_count: usize,
    neuron_counts: Option<Vec<usize>>,
    kinds: Option<Vec<LayerKind>>,
    return_flags: Option<Vec<bool>>,
}

impl LayerConfigBuilder {
    /// A builder for `layer_count` hidden layers
    pub fn new(layer_count: usize) -> LayerConfigBuilder {
        LayerConfigBuilder {
            layer_count,
            ..Default::default()
        }
    }

    /// Set the neurons of each layer. Defaults to `DEFAULT_NEURONS` everywhere
    pub fn neuron_counts(mut self, neuron_counts: Vec<usize>) -> Self {
        self.neuron_counts = Some(neuron_counts);
        self
    }

    /// Set the kind of each layer. Defaults to LSTM everywhere
    pub fn kinds(mut self, kinds: Vec<LayerKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    /// Set the kind of each layer by name
    pub fn kind_names<S: AsRef<str>>(self, names: &[S]) -> Result<Self> {
        let kinds = names
            .iter()
            .map(|name| name.as_ref().parse())
            .collect::<Result<Vec<LayerKind>>>()?;
        Ok(self.kinds(kinds))
    }

    /// Set each layer's return-full-sequence flag. Defaults to `true` for the first layer only
    pub fn return_flags(mut self, return_flags: Vec<bool>) -> Self {
        self.return_flags = Some(return_flags);
        self
    }

    /// Build the layer list
    pub fn build(&self) -> Result<Vec<LayerSpec>> {
        let n = self.layer_count;
        if n == 0 {
            return Err(ForecastError::Configuration(
                "a model needs at least one hidden layer".into(),
            ));
        }
        let neuron_counts = self
            .neuron_counts
            .clone()
            .unwrap_or_else(|| vec![DEFAULT_NEURONS; n]);
        let kinds = self.kinds.clone().unwrap_or_else(|| vec![LayerKind::Lstm; n]);
        let return_flags = self
            .return_flags
            .clone()
            .unwrap_or_else(|| (0..n).map(|ix| ix == 0).collect());

        check_length("kinds", n, kinds.len())?;
        check_length("neuron_counts", n, neuron_counts.len())?;
        check_length("return_flags", n, return_flags.len())?;

        let zero_layers = neuron_counts
            .iter()
            .positions(|count| *count == 0)
            .collect::<Vec<_>>();
        if !zero_layers.is_empty() {
            return Err(ForecastError::Configuration(format!(
                "layers {} have zero neurons",
                zero_layers.iter().join(", ")
            )));
        }

        Ok(izip!(kinds, neuron_counts, return_flags)
            .map(|(kind, neuron_count, return_full_sequence)| LayerSpec {
                kind,
                neuron_count,
                return_full_sequence,
            })
            .collect())
    }
}

fn check_length(what: &str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(ForecastError::Configuration(format!(
            "`{}` length must equal the layer count: expected {}, got {}",
            what, expected, got
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        for n in 1..8 {
            let layers = LayerConfigBuilder::new(n).build().unwrap();
            assert_eq!(layers.len(), n);
            for (ix, layer) in layers.iter().enumerate() {
                assert_eq!(layer.kind, LayerKind::Lstm);
                assert_eq!(layer.neuron_count, DEFAULT_NEURONS);
                assert_eq!(layer.return_full_sequence, ix == 0);
            }
        }
    }

    #[test]
    fn overrides() {
        let layers = LayerConfigBuilder::new(3)
            .neuron_counts(vec![32, 16, 8])
            .kind_names(&["gru", "SimpleRNN", "Dense"])
            .unwrap()
            .return_flags(vec![true, false, false])
            .build()
            .unwrap();
        assert_eq!(
            layers,
            vec![
                LayerSpec {
                    kind: LayerKind::Gru,
                    neuron_count: 32,
                    return_full_sequence: true
                },
                LayerSpec {
                    kind: LayerKind::SimpleRnn,
                    neuron_count: 16,
                    return_full_sequence: false
                },
                LayerSpec {
                    kind: LayerKind::Dense,
                    neuron_count: 8,
                    return_full_sequence: false
                },
            ]
        );
    }

    #[test]
    fn length_mismatches_fail() {
        let short = LayerConfigBuilder::new(3).neuron_counts(vec![1, 2]).build();
        let long = LayerConfigBuilder::new(2).kinds(vec![LayerKind::Gru; 3]).build();
        let flags = LayerConfigBuilder::new(2).return_flags(vec![]).build();
        for result in vec![short, long, flags] {
            match result {
                Err(ForecastError::Configuration(_)) => {}
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn zero_layers_or_neurons_fail() {
        assert!(LayerConfigBuilder::new(0).build().is_err());
        assert!(LayerConfigBuilder::new(2).neuron_counts(vec![4, 0]).build().is_err());
    }

    #[test]
    fn unknown_kind() {
        match "Conv1D".parse::<LayerKind>() {
            Err(ForecastError::UnsupportedLayerKind(name)) => assert_eq!(name, "Conv1D"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!("lstm".parse::<LayerKind>().unwrap(), LayerKind::Lstm);
    }

    #[test]
    fn deterministic() {
        let builder = LayerConfigBuilder::new(4).neuron_counts(vec![8, 16, 32, 64]);
        assert_eq!(builder.build().unwrap(), builder.build().unwrap());
    }
}
