use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tch::{
    nn::{self, LinearConfig, Module, OptimizerConfig, RNNConfig, VarStore, RNN},
    Device, Kind, Reduction, Tensor,
};

use crate::error::{Error, Result};
use crate::features::FeatureVector;
use crate::sampler::Predictor;
use crate::windower::TrainingSet;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LstmConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Hidden size of the LSTM.
    pub hidden_size: usize,
    /// Number of RNN layers to stack in the LSTM.
    pub num_layers: usize,
}

impl Default for LstmConfig {
    fn default() -> Self {
        LstmConfig {
            epochs: 20,
            batch_size: 64,
            learning_rate: 0.01,
            hidden_size: 128,
            num_layers: 1,
        }
    }
}

/// An LSTM over the window, followed by a linear layer on the final hidden state.
pub struct LstmPredictor {
    vs: VarStore,
    lstm: nn::LSTM,
    linear: nn::Linear,
    window_len: usize,
    feature_dim: usize,
    device: Device,
}

impl LstmPredictor {
    pub fn new(window_len: usize, feature_dim: usize, config: &LstmConfig) -> LstmPredictor {
        let device = Device::cuda_if_available();
        let vs = VarStore::new(device);
        let lstm = lstm(&vs, feature_dim, config.hidden_size, config.num_layers);
        let linear = nn::linear(
            &vs.root(),
            config.hidden_size as i64,
            feature_dim as i64,
            LinearConfig::default(),
        );
        LstmPredictor {
            vs,
            lstm,
            linear,
            window_len,
            feature_dim,
            device,
        }
    }

    /// Returns the output for a batch of shape [batch_size, window_len, feature_dim], with shape
    /// [batch_size, feature_dim].
    fn forward(&self, windows: &Tensor) -> Tensor {
        let batch_size = windows.size()[0] as usize;
        assert_shape(&[batch_size, self.window_len, self.feature_dim], windows);
        let (output, _) = self.lstm.seq(windows);
        let last = output.select(1, -1);
        let out = self.linear.forward(&last);
        assert_shape(&[batch_size, self.feature_dim], &out);
        out
    }

    /// Train on `set` in shuffled mini-batches. Returns the mean loss of every epoch.
    pub fn train(
        &mut self,
        set: &TrainingSet,
        config: &LstmConfig,
        rng: &mut impl Rng,
    ) -> Result<Vec<f32>> {
        if set.sequence_length() != self.window_len || set.dim() != self.feature_dim {
            return Err(Error::shape(
                format!("windows of shape ({}, {})", self.window_len, self.feature_dim),
                format!("({}, {})", set.sequence_length(), set.dim()),
            ));
        }
        let mut optim = nn::AdamW::default()
            .build(&self.vs, config.learning_rate)
            .map_err(|err| Error::Model(err.to_string()))?;

        let mut order = (0..set.len()).collect_vec();
        let mut losses = Vec::with_capacity(config.epochs);
        for epoch_i in 0..config.epochs {
            order.shuffle(rng);
            let mut epoch_loss = 0.0;
            let mut batches = 0;
            for batch in order.chunks(config.batch_size.max(1)) {
                let windows = batch.iter().map(|&i| &set.windows()[i]).collect_vec();
                let targets = batch.iter().map(|&i| &set.targets()[i]).collect_vec();
                let windows = self.to_tensor(&windows);
                let targets = Tensor::of_slice(&targets.into_iter().flatten().copied().collect_vec())
                    .view([batch.len() as i64, self.feature_dim as i64])
                    .to_device(self.device);

                let loss = self.forward(&windows).mse_loss(&targets, Reduction::Mean);
                optim.backward_step_clip(&loss, 0.5);
                epoch_loss += f32::from(loss);
                batches += 1;
            }
            let loss = epoch_loss / batches.max(1) as f32;
            log::info!(
                "Epoch {}/{}, Average loss = {:.5}",
                epoch_i + 1,
                config.epochs,
                loss
            );
            losses.push(loss);
        }
        Ok(losses)
    }

    fn to_tensor(&self, windows: &[&Vec<FeatureVector>]) -> Tensor {
        let data = windows
            .iter()
            .flat_map(|window| window.iter().flatten())
            .copied()
            .collect_vec();
        Tensor::of_slice(&data)
            .view([
                windows.len() as i64,
                self.window_len as i64,
                self.feature_dim as i64,
            ])
            .to_kind(Kind::Float)
            .to_device(self.device)
    }
}

impl Predictor for LstmPredictor {
    fn window_len(&self) -> usize {
        self.window_len
    }

    fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    fn predict(&self, window: &[FeatureVector]) -> Result<FeatureVector> {
        if window.len() != self.window_len || window.iter().any(|v| v.len() != self.feature_dim) {
            return Err(Error::shape(
                format!("window of shape ({}, {})", self.window_len, self.feature_dim),
                format!("{} vectors", window.len()),
            ));
        }
        let window = window.to_vec();
        let out = tch::no_grad(|| self.forward(&self.to_tensor(&[&window])));
        Ok(Vec::<f32>::from(&out.squeeze_dim(0)))
    }
}

fn lstm(vs: &VarStore, in_dim: usize, hidden_dim: usize, num_layers: usize) -> nn::LSTM {
    let mut config = RNNConfig::default();
    config.num_layers = num_layers as i64;
    config.batch_first = true;
    nn::lstm(&vs.root(), in_dim as i64, hidden_dim as i64, config)
}

#[track_caller]
fn assert_shape(expected: &[usize], actual: &Tensor) {
    let actual = actual.size();
    let same = expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual.iter())
            .all(|(&a, &b)| a as i64 == b);
    if !same {
        panic!(
            "Expected tensor to be of shape {:?}, got {:?}",
            expected, actual
        );
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::features::FeatureMatrix;
    use crate::sampler::generate;
    use crate::windower::build_training_set;

    #[test]
    fn trains_and_generates() {
        let features = FeatureMatrix::new(
            (0..30)
                .map(|t| vec![(t % 3) as f32, 1.0 - (t % 3) as f32 / 2.0])
                .collect(),
        )
        .unwrap();
        let set = build_training_set(&features, 3).unwrap();
        let config = LstmConfig {
            epochs: 5,
            batch_size: 8,
            hidden_size: 16,
            ..LstmConfig::default()
        };
        let mut predictor = LstmPredictor::new(3, 2, &config);
        let losses = predictor
            .train(&set, &config, &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(losses.len(), 5);

        let generated = generate(&predictor, &set.windows()[0], 6).unwrap();
        assert_eq!(generated.len(), 6);
        assert!(generated.iter().all(|v| v.len() == 2));
    }
}
