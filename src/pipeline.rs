use rand::{rngs::StdRng, SeedableRng};

use crate::audio::Audio;
use crate::config::{Model, PipelineConfig};
use crate::error::Result;
use crate::features::{self, FeatureMatrix, FeatureVector};
use crate::neural::FullNetwork;
use crate::sampler::{self, Predictor};
use crate::windower::{self, TrainingSet};

/// What a full run produced, stage by stage.
pub struct Output {
    pub features: FeatureMatrix,
    pub training_set: TrainingSet,
    /// Loss after every training epoch.
    pub losses: Vec<f32>,
    /// The seed window generation started from, normalized like the training inputs.
    pub seed: Vec<FeatureVector>,
    /// Generated frames in the normalized target space.
    pub generated: Vec<FeatureVector>,
}

impl Output {
    /// The seed window mapped back into feature units.
    pub fn seed_features(&self) -> Vec<FeatureVector> {
        self.seed
            .iter()
            .map(|vector| self.training_set.denormalize_input(vector))
            .collect()
    }

    /// Generated frames mapped back into feature units.
    pub fn generated_features(&self) -> Vec<FeatureVector> {
        self.generated
            .iter()
            .map(|vector| self.training_set.denormalize_target(vector))
            .collect()
    }
}

/// Extract features from `audio`, train a predictor on them, and generate `config.steps` frames
/// from a randomly chosen training window.
pub fn run(audio: &Audio, config: &PipelineConfig) -> Result<Output> {
    let features = features::extract(&audio.samples, audio.sample_rate, &config.features)?;
    log::info!(
        "Extracted {} frames of {} features",
        features.len(),
        features.dim()
    );
    run_on_features(features, config)
}

/// Everything after feature extraction.
pub fn run_on_features(features: FeatureMatrix, config: &PipelineConfig) -> Result<Output> {
    let training_set = windower::build_training_set(&features, config.sequence_length)?;
    log::info!(
        "Built {} training pairs (window of {})",
        training_set.len(),
        config.sequence_length
    );

    let mut rng = StdRng::seed_from_u64(config.seed);
    let (predictor, losses): (Box<dyn Predictor>, Vec<f32>) = match config.model {
        Model::Mlp => {
            let mut network = FullNetwork::with_size(
                training_set.sequence_length(),
                training_set.dim(),
                &config.train.hidden_layers,
                &mut rng,
            );
            let losses = network.train(&training_set, &config.train, &mut rng)?;
            (Box::new(network), losses)
        }
        #[cfg(feature = "torch")]
        Model::Lstm => {
            let mut network = crate::lstm::LstmPredictor::new(
                training_set.sequence_length(),
                training_set.dim(),
                &config.lstm,
            );
            let losses = network.train(&training_set, &config.lstm, &mut rng)?;
            (Box::new(network), losses)
        }
    };

    let seed = training_set.random_window(&mut rng).clone();
    log::info!("Generating {} frames...", config.steps);
    let generated = sampler::generate(predictor.as_ref(), &seed, config.steps)?;

    Ok(Output {
        features,
        training_set,
        losses,
        seed,
        generated,
    })
}
