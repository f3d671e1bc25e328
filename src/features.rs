use std::f32::consts::PI;

use itertools::Itertools;
use rayon::prelude::{IntoParallelIterator, ParallelIterator};
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One time-frame worth of features.
pub type FeatureVector = Vec<f32>;

/// A time-major sequence of feature vectors, all of the same dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    frames: Vec<FeatureVector>,
    dim: usize,
}

impl FeatureMatrix {
    /// Build a matrix from time-major frames. Every frame must have the same, non-zero length.
    pub fn new(frames: Vec<FeatureVector>) -> Result<FeatureMatrix> {
        let dim = match frames.first() {
            Some(first) if !first.is_empty() => first.len(),
            Some(_) => return Err(Error::shape("feature dimension > 0", 0)),
            None => return Err(Error::shape("at least one frame", "0 frames")),
        };
        if let Some((i, frame)) = frames.iter().find_position(|frame| frame.len() != dim) {
            return Err(Error::shape(
                format!("frame {} of dimension {}", i, dim),
                frame.len(),
            ));
        }
        Ok(FeatureMatrix { frames, dim })
    }

    /// Build a matrix from feature-major rows (shape F x T), the layout most feature extractors
    /// hand back.
    pub fn from_feature_major(rows: &[Vec<f32>]) -> Result<FeatureMatrix> {
        let num_frames = rows.first().map(|row| row.len()).unwrap_or(0);
        if let Some((i, row)) = rows.iter().find_position(|row| row.len() != num_frames) {
            return Err(Error::shape(
                format!("row {} with {} frames", i, num_frames),
                row.len(),
            ));
        }
        let frames = (0..num_frames)
            .map(|t| rows.iter().map(|row| row[t]).collect())
            .collect();
        FeatureMatrix::new(frames)
    }

    /// Number of time-frames (T).
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Feature dimension (F).
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn frames(&self) -> &[FeatureVector] {
        &self.frames
    }
}

/// Parameters for frame-level feature extraction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeatureConfig {
    /// Length of each analysis frame, in samples.
    pub frame_length: usize,
    /// Number of samples to advance between frames.
    pub hop_length: usize,
    /// Number of log-spaced frequency bands measured per frame.
    pub bands: usize,
    /// Centre frequency of the lowest band, in Hz.
    pub min_frequency: f32,
    /// Centre frequency of the highest band, in Hz.
    pub max_frequency: f32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        FeatureConfig {
            frame_length: 2048,
            hop_length: 512,
            bands: 8,
            min_frequency: 55.0,
            max_frequency: 7040.0,
        }
    }
}

impl FeatureConfig {
    /// Dimension of the vectors `extract` produces: RMS, zero-crossing rate, then one value per band.
    pub fn dim(&self) -> usize {
        2 + self.bands
    }

    fn validate(&self, sample_rate: usize) -> Result<()> {
        if self.frame_length == 0 {
            return Err(invalid("frame_length", "must be > 0"));
        }
        if self.hop_length == 0 {
            return Err(invalid("hop_length", "must be > 0"));
        }
        if !(self.min_frequency > 0.0 && self.min_frequency <= self.max_frequency) {
            return Err(invalid(
                "min_frequency",
                format!(
                    "need 0 < min_frequency <= max_frequency, got {} and {}",
                    self.min_frequency, self.max_frequency
                ),
            ));
        }
        let nyquist = sample_rate as f32 / 2.0;
        if self.max_frequency >= nyquist {
            return Err(invalid(
                "max_frequency",
                format!("{} Hz is at or above nyquist ({} Hz)", self.max_frequency, nyquist),
            ));
        }
        Ok(())
    }

    /// Centre frequencies of the measured bands, spaced evenly on a log scale.
    pub fn band_frequencies(&self) -> Vec<f32> {
        match self.bands {
            0 => vec![],
            1 => vec![self.min_frequency],
            bands => {
                let ratio = self.max_frequency / self.min_frequency;
                (0..bands)
                    .map(|i| self.min_frequency * ratio.powf(i as f32 / (bands - 1) as f32))
                    .collect()
            }
        }
    }

    /// For every band, the index of the real FFT bin nearest its centre frequency.
    pub fn band_bins(&self, sample_rate: usize) -> Vec<usize> {
        let last_bin = self.frame_length / 2;
        self.band_frequencies()
            .iter()
            .map(|freq| {
                let bin = (freq * self.frame_length as f32 / sample_rate as f32).round() as usize;
                bin.min(last_bin)
            })
            .collect()
    }
}

fn invalid(name: &'static str, reason: impl ToString) -> Error {
    Error::InvalidParameter {
        name,
        reason: reason.to_string(),
    }
}

/// Extract a feature matrix from mono audio. Frames are not padded, so the final partial frame is
/// dropped.
pub fn extract(samples: &[f32], sample_rate: usize, config: &FeatureConfig) -> Result<FeatureMatrix> {
    config.validate(sample_rate)?;
    if samples.len() < config.frame_length {
        return Err(Error::InsufficientData {
            frames: samples.len(),
            sequence_length: config.frame_length,
        });
    }

    let num_frames = (samples.len() - config.frame_length) / config.hop_length + 1;
    let window = hann_window(config.frame_length);
    let bins = config.band_bins(sample_rate);
    let r2c = RealFftPlanner::<f32>::new().plan_fft_forward(config.frame_length);
    log::debug!(
        "Extracting {} frames of {} features ({} samples @ {} Hz)",
        num_frames,
        config.dim(),
        samples.len(),
        sample_rate
    );

    let frames = (0..num_frames)
        .into_par_iter()
        .map(|i| -> Result<FeatureVector> {
            let start = i * config.hop_length;
            let frame = &samples[start..start + config.frame_length];
            let mut windowed = frame.iter().zip(&window).map(|(x, w)| x * w).collect_vec();
            let mut spectrum = r2c.make_output_vec();
            r2c.process(&mut windowed, &mut spectrum)
                .map_err(|err| Error::shape(config.frame_length, err.to_string()))?;

            let mut features = Vec::with_capacity(config.dim());
            features.push(rms(frame));
            features.push(zero_crossing_rate(frame));
            features.extend(
                bins.iter()
                    .map(|&bin| spectrum[bin].norm() / config.frame_length as f32),
            );
            Ok(features)
        })
        .collect::<Result<Vec<_>>>()?;

    FeatureMatrix::new(frames)
}

/// Root mean square energy of a frame.
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f32 = frame.iter().map(|x| x * x).sum();
    (sum / frame.len() as f32).sqrt()
}

/// Fraction of adjacent sample pairs whose sign differs.
pub fn zero_crossing_rate(frame: &[f32]) -> f32 {
    if frame.len() < 2 {
        return 0.0;
    }
    let crossings = frame
        .iter()
        .tuple_windows()
        .filter(|(prev, curr)| (**prev >= 0.0) != (**curr >= 0.0))
        .count();
    crossings as f32 / (frame.len() - 1) as f32
}

fn hann_window(length: usize) -> Vec<f32> {
    if length == 1 {
        return vec![1.0];
    }
    (0..length)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / (length - 1) as f32).cos())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    fn sine(frequency: f32, sample_rate: usize, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn matrix_rejects_ragged_frames() {
        let result = FeatureMatrix::new(vec![vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
        assert!(matches!(
            FeatureMatrix::new(vec![]),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn feature_major_rows_are_transposed() {
        let matrix =
            FeatureMatrix::from_feature_major(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(matrix.len(), 3);
        assert_eq!(matrix.dim(), 2);
        assert_eq!(matrix.frames()[1], vec![2.0, 5.0]);
    }

    #[test]
    fn rms_and_zcr_of_simple_signals() {
        assert!(approx_eq!(f32, rms(&[1.0, -1.0, 1.0, -1.0]), 1.0, ulps = 2));
        assert_eq!(zero_crossing_rate(&[1.0, -1.0, 1.0, -1.0]), 1.0);
        assert_eq!(zero_crossing_rate(&[0.5; 16]), 0.0);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn extract_frame_count_and_dimension() {
        let config = FeatureConfig {
            frame_length: 256,
            hop_length: 128,
            bands: 4,
            min_frequency: 100.0,
            max_frequency: 3200.0,
        };
        let samples = sine(440.0, 8000, 1024);
        let matrix = extract(&samples, 8000, &config).unwrap();
        // (1024 - 256) / 128 + 1
        assert_eq!(matrix.len(), 7);
        assert_eq!(matrix.dim(), 6);
    }

    #[test]
    fn extract_finds_the_loudest_band() {
        let config = FeatureConfig {
            frame_length: 1024,
            hop_length: 1024,
            bands: 4,
            min_frequency: 110.0,
            max_frequency: 880.0,
        };
        // Bands sit at 110, 220, 440, 880 Hz.
        let samples = sine(440.0, 8000, 4096);
        let matrix = extract(&samples, 8000, &config).unwrap();
        for frame in matrix.frames() {
            let bands = &frame[2..];
            let (loudest, _) = bands
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .unwrap();
            assert_eq!(loudest, 2);
        }
    }

    #[test]
    fn bands_read_the_nearest_bins() {
        let config = FeatureConfig {
            frame_length: 1024,
            hop_length: 1024,
            bands: 4,
            min_frequency: 110.0,
            max_frequency: 880.0,
        };
        // 8000 / 1024 = 7.8125 Hz per bin.
        assert_eq!(config.band_bins(8000), vec![14, 28, 56, 113]);
    }

    #[test]
    fn extract_rejects_short_audio() {
        let result = extract(&[0.0; 100], 8000, &FeatureConfig::default());
        assert!(matches!(result, Err(Error::InsufficientData { .. })));
    }

    #[test]
    fn extract_rejects_bands_above_nyquist() {
        let config = FeatureConfig {
            max_frequency: 5000.0,
            ..FeatureConfig::default()
        };
        let result = extract(&[0.0; 4096], 8000, &config);
        assert!(matches!(
            result,
            Err(Error::InvalidParameter {
                name: "max_frequency",
                ..
            })
        ));
    }
}
