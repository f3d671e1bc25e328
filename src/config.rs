use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::features::FeatureConfig;
#[cfg(feature = "torch")]
use crate::lstm::LstmConfig;
use crate::midi::RenderConfig;
use crate::neural::TrainConfig;

/// Which predictor to train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Model {
    /// Feed-forward network on the flattened window.
    #[default]
    Mlp,
    /// LSTM backed by libtorch.
    #[cfg(feature = "torch")]
    Lstm,
}

/// Everything a run needs, end to end. Every field has a default, so a config file only has to
/// name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub features: FeatureConfig,
    /// Frames per training window (L).
    pub sequence_length: usize,
    /// Number of frames to generate (N).
    pub steps: usize,
    /// Seeds weight initialization, shuffling, and the choice of seed window.
    pub seed: u64,
    pub model: Model,
    pub train: TrainConfig,
    #[cfg(feature = "torch")]
    pub lstm: LstmConfig,
    pub render: RenderConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            features: FeatureConfig::default(),
            sequence_length: 16,
            steps: 64,
            seed: 0,
            model: Model::default(),
            train: TrainConfig::default(),
            #[cfg(feature = "torch")]
            lstm: LstmConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<PipelineConfig> {
        let raw = std::fs::read_to_string(path)?;
        PipelineConfig::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<PipelineConfig> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::NotePolicy;
    use crate::notes::NoteDuration;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = PipelineConfig::from_json(
            r#"{
                "sequence_length": 8,
                "features": { "bands": 4 },
                "render": {
                    "step": "sixteenth",
                    "policy": { "kind": "contour", "feature": 0, "low_key": 48, "high_key": 84 }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.sequence_length, 8);
        assert_eq!(config.steps, PipelineConfig::default().steps);
        assert_eq!(config.features.bands, 4);
        assert_eq!(config.features.frame_length, 2048);
        assert_eq!(config.render.step, NoteDuration::Sixteenth);
        assert_eq!(
            config.render.policy,
            NotePolicy::Contour {
                feature: 0,
                low_key: 48,
                high_key: 84
            }
        );
        assert_eq!(config.model, Model::Mlp);
    }

    #[test]
    fn malformed_file() {
        assert!(PipelineConfig::from_json("{ \"steps\": \"many\" }").is_err());
    }
}
