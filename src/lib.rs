pub mod audio;
pub mod config;
pub mod error;
pub mod features;
#[cfg(feature = "torch")]
pub mod lstm;
pub mod midi;
pub mod neural;
pub mod notes;
pub mod pipeline;
pub mod quantize;
pub mod sampler;
pub mod windower;

pub use error::{Error, Result};
pub use features::{FeatureMatrix, FeatureVector};
pub use sampler::{generate, FnPredictor, Predictor};
pub use windower::{build_training_set, TrainingSet, Window};
