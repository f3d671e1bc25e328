use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::features::FeatureVector;
use crate::sampler::Predictor;
use crate::windower::TrainingSet;

/// Training parameters for `FullNetwork::train`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainConfig {
    pub epochs: usize,
    /// Learning rate (eta).
    pub learning_rate: f32,
    /// Sizes of the hidden layers. The output layer is added automatically.
    pub hidden_layers: Vec<usize>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            epochs: 20,
            learning_rate: 0.05,
            hidden_layers: vec![64],
        }
    }
}

/// A fully connected feed-forward network that predicts the next feature vector from a flattened
/// window. Hidden layers use a sigmoid, the output layer is linear so it can reach any value in the
/// normalized range.
#[derive(Debug, Clone)]
pub struct FullNetwork {
    pub layers: Vec<Layer>,
    window_len: usize,
    feature_dim: usize,
}

impl FullNetwork {
    /// Creates a network for windows of `window_len` vectors of `feature_dim` values. The first
    /// layer takes `window_len * feature_dim` inputs, each hidden layer `i` has `hidden_layers[i]`
    /// nodes, and a final linear layer produces `feature_dim` outputs.
    pub fn with_size(
        window_len: usize,
        feature_dim: usize,
        hidden_layers: &[usize],
        rng: &mut impl Rng,
    ) -> FullNetwork {
        let mut layers = Vec::with_capacity(hidden_layers.len() + 1);
        let mut num_inputs = window_len * feature_dim;
        for &size in hidden_layers {
            layers.push(Layer::with_sizes(num_inputs, size, Activation::Sigmoid, rng));
            num_inputs = size;
        }
        layers.push(Layer::with_sizes(
            num_inputs,
            feature_dim,
            Activation::Identity,
            rng,
        ));
        FullNetwork {
            layers,
            window_len,
            feature_dim,
        }
    }

    /// Compute the inputs through the whole network, returning the output of the last layer.
    pub fn compute(&self, inputs: &[f32]) -> Vec<f32> {
        self.layers
            .iter()
            .fold(inputs.to_vec(), |output, layer| layer.compute(&output).1)
    }

    /// The squared distance between the expected output and the network's output.
    pub fn cost(&self, inputs: &[f32], expected_output: &[f32]) -> f32 {
        distance2(&self.compute(inputs), expected_output)
    }

    /// One gradient descent step on a single example. `eta` is the learning rate.
    pub fn backprop(&mut self, eta: f32, inputs: &[f32], expected_output: &[f32]) {
        // Forward pass, keeping every layer's weighted input (z) and activation (a).
        let mut weighted_inputs = Vec::with_capacity(self.layers.len());
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        let mut output = inputs.to_vec();
        for layer in &self.layers {
            let (z, a) = layer.compute(&output);
            weighted_inputs.push(z);
            activations.push(std::mem::replace(&mut output, a));
        }
        activations.push(output);

        // Output error of the last layer: (a - y) * f'(z)
        let last = self.layers.len() - 1;
        let mut error: Vec<f32> = activations[last + 1]
            .iter()
            .zip_eq(expected_output)
            .zip_eq(&weighted_inputs[last])
            .map(|((a, y), &z)| (a - y) * self.layers[last].activation.derivative(z))
            .collect();

        for i in (0..self.layers.len()).rev() {
            // The error of the layer before has to be computed with this layer's weights as they
            // were before the update.
            let previous_error = if i > 0 {
                let activation = self.layers[i - 1].activation;
                Some(
                    self.layers[i]
                        .weights_times_error(&error)
                        .zip_eq(&weighted_inputs[i - 1])
                        .map(|(e, &z)| e * activation.derivative(z))
                        .collect::<Vec<_>>(),
                )
            } else {
                None
            };

            let layer_inputs = &activations[i];
            for (node, e) in self.layers[i].nodes.iter_mut().zip_eq(&error) {
                for (weight, input) in node.weights.iter_mut().zip_eq(layer_inputs) {
                    *weight -= eta * e * input;
                }
                node.bias -= eta * e;
            }

            match previous_error {
                Some(previous_error) => error = previous_error,
                None => break,
            }
        }
    }

    /// Train on every (window, target) pair of `set`, visiting the pairs in a fresh random order
    /// each epoch. Returns the mean squared error of every epoch.
    pub fn train(
        &mut self,
        set: &TrainingSet,
        config: &TrainConfig,
        rng: &mut impl Rng,
    ) -> Result<Vec<f32>> {
        if set.sequence_length() != self.window_len || set.dim() != self.feature_dim {
            return Err(Error::shape(
                format!("windows of shape ({}, {})", self.window_len, self.feature_dim),
                format!("({}, {})", set.sequence_length(), set.dim()),
            ));
        }

        let examples = set
            .pairs()
            .map(|(window, target)| (flatten(window), target.as_slice()))
            .collect_vec();
        let mut order = (0..examples.len()).collect_vec();
        let mut losses = Vec::with_capacity(config.epochs);
        for epoch_i in 0..config.epochs {
            order.shuffle(rng);
            for &i in &order {
                let (inputs, target) = &examples[i];
                self.backprop(config.learning_rate, inputs, target);
            }
            let loss = examples
                .iter()
                .map(|(inputs, target)| self.cost(inputs, target))
                .sum::<f32>()
                / (examples.len() * self.feature_dim) as f32;
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
}

impl Predictor for FullNetwork {
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
        Ok(self.compute(&flatten(window)))
    }
}

fn flatten(window: &[FeatureVector]) -> Vec<f32> {
    window.iter().flatten().copied().collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Sigmoid,
    Identity,
}

impl Activation {
    fn apply(&self, z: f32) -> f32 {
        match self {
            Activation::Sigmoid => sigmoid(z),
            Activation::Identity => z,
        }
    }

    fn derivative(&self, z: f32) -> f32 {
        match self {
            Activation::Sigmoid => sigmoid_prime(z),
            Activation::Identity => 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Layer {
    pub nodes: Vec<Node>,
    activation: Activation,
}

impl Layer {
    pub fn with_sizes(
        num_inputs: usize,
        num_nodes: usize,
        activation: Activation,
        rng: &mut impl Rng,
    ) -> Layer {
        // Keep the initial weighted inputs small no matter how wide the layer is.
        let scale = 1.0 / (num_inputs.max(1) as f32).sqrt();
        Layer {
            nodes: (0..num_nodes)
                .map(|_| Node::with_size(num_inputs, scale, rng))
                .collect(),
            activation,
        }
    }

    /// Returns (weighted inputs, activations).
    pub fn compute(&self, inputs: &[f32]) -> (Vec<f32>, Vec<f32>) {
        self.nodes
            .iter()
            .map(|node| {
                let z = node.weighted_input(inputs);
                (z, self.activation.apply(z))
            })
            .unzip()
    }

    /// For every input of this layer, the sum over nodes of the node's weight for that input times
    /// the node's error.
    pub fn weights_times_error<'a>(&'a self, error: &'a [f32]) -> impl Iterator<Item = f32> + 'a {
        debug_assert!(error.len() == self.nodes.len());
        let num_inputs = self.nodes.first().map_or(0, |node| node.weights.len());
        (0..num_inputs).map(move |i| {
            self.nodes
                .iter()
                .zip_eq(error)
                .map(|(node, e)| node.weights[i] * e)
                .sum()
        })
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    // The incoming weights, one per node (or input) of the previous layer.
    pub weights: Vec<f32>,
    pub bias: f32,
}

impl Node {
    pub fn with_size(num_inputs: usize, scale: f32, rng: &mut impl Rng) -> Node {
        Node {
            weights: (0..num_inputs)
                .map(|_| rng.gen_range(-1.0f32..1.0) * scale)
                .collect(),
            bias: rng.gen_range(-1.0f32..1.0) * scale,
        }
    }

    /// weights * inputs + bias
    pub fn weighted_input(&self, inputs: &[f32]) -> f32 {
        debug_assert!(inputs.len() == self.weights.len());
        dot(&self.weights, inputs) + self.bias
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip_eq(b).map(|(a, b)| a * b).sum()
}

fn distance2(a: &[f32], b: &[f32]) -> f32 {
    // || a - b || ^ 2
    a.iter().zip_eq(b).map(|(a, b)| (a - b) * (a - b)).sum()
}

fn sigmoid(input: f32) -> f32 {
    1.0 / (1.0 + (-input).exp())
}

fn sigmoid_prime(input: f32) -> f32 {
    sigmoid(input) * (1.0 - sigmoid(input))
}
