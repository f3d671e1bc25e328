use rand::Rng;

use crate::error::{Error, Result};
use crate::features::{FeatureMatrix, FeatureVector};

/// L consecutive feature vectors, used as one model input.
pub type Window = Vec<FeatureVector>;

/// Windows and their next-step targets, cut from a single feature matrix.
///
/// Pair `i` holds `features[i..i + L]` as its window and `features[i + L]` as its target. The
/// windows and targets carry independent scales: `input_scale` and `target_scale` are the divisors
/// the values were divided by (both are 1.0 for a set that has not been normalized).
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    windows: Vec<Window>,
    targets: Vec<FeatureVector>,
    sequence_length: usize,
    dim: usize,
    input_scale: f32,
    target_scale: f32,
}

/// Slice `features` into overlapping windows of `sequence_length` frames, pair each with the frame
/// that follows it, and normalize both sides.
pub fn build_training_set(features: &FeatureMatrix, sequence_length: usize) -> Result<TrainingSet> {
    TrainingSet::from_features(features, sequence_length)?.normalize()
}

impl TrainingSet {
    /// Build the raw, unnormalized pairs. Requires more frames than `sequence_length`.
    pub fn from_features(features: &FeatureMatrix, sequence_length: usize) -> Result<TrainingSet> {
        if sequence_length == 0 {
            return Err(Error::InvalidParameter {
                name: "sequence_length",
                reason: "must be > 0".to_string(),
            });
        }
        let frames = features.frames();
        if frames.len() <= sequence_length {
            return Err(Error::InsufficientData {
                frames: frames.len(),
                sequence_length,
            });
        }

        let (windows, targets) = split_into_windows(frames, sequence_length + 1)
            .map(|window| {
                let (window, target) = window.split_at(sequence_length);
                (window.to_vec(), target[0].clone())
            })
            .unzip();

        Ok(TrainingSet {
            windows,
            targets,
            sequence_length,
            dim: features.dim(),
            input_scale: 1.0,
            target_scale: 1.0,
        })
    }

    /// Divide every window entry by the largest absolute window entry, and every target entry by
    /// the largest absolute target entry. The divisors are folded into `input_scale` and
    /// `target_scale`. Normalizing an already normalized set leaves it unchanged.
    pub fn normalize(mut self) -> Result<TrainingSet> {
        let input_max = max_abs(self.windows.iter().flatten().flatten());
        if input_max == 0.0 {
            return Err(Error::DegenerateInput { what: "windows" });
        }
        let target_max = max_abs(self.targets.iter().flatten());
        if target_max == 0.0 {
            return Err(Error::DegenerateInput { what: "targets" });
        }

        self.windows
            .iter_mut()
            .flatten()
            .flatten()
            .for_each(|x| *x /= input_max);
        self.targets
            .iter_mut()
            .flatten()
            .for_each(|x| *x /= target_max);
        self.input_scale *= input_max;
        self.target_scale *= target_max;
        log::debug!(
            "Normalized {} pairs (input max = {}, target max = {})",
            self.len(),
            input_max,
            target_max
        );
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Number of frames per window (L).
    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    /// Feature dimension (F).
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn targets(&self) -> &[FeatureVector] {
        &self.targets
    }

    /// Iterate over (window, target) pairs in offset order.
    pub fn pairs(&self) -> impl Iterator<Item = (&Window, &FeatureVector)> {
        self.windows.iter().zip(&self.targets)
    }

    pub fn input_scale(&self) -> f32 {
        self.input_scale
    }

    pub fn target_scale(&self) -> f32 {
        self.target_scale
    }

    /// Pick a window uniformly at random, e.g. to seed generation.
    pub fn random_window(&self, rng: &mut impl Rng) -> &Window {
        &self.windows[rng.gen_range(0..self.windows.len())]
    }

    /// Map a normalized window vector back into feature units.
    pub fn denormalize_input(&self, vector: &[f32]) -> FeatureVector {
        vector.iter().map(|x| x * self.input_scale).collect()
    }

    /// Map a normalized target-space vector back into feature units.
    pub fn denormalize_target(&self, vector: &[f32]) -> FeatureVector {
        vector.iter().map(|x| x * self.target_scale).collect()
    }
}

/// All contiguous runs of `window_size` elements, advancing by one.
pub fn split_into_windows<T>(data: &[T], window_size: usize) -> impl Iterator<Item = &[T]> {
    data.windows(window_size)
}

fn max_abs<'a>(values: impl Iterator<Item = &'a f32>) -> f32 {
    values.fold(0.0f32, |max, x| max.max(x.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn matrix(frames: &[&[f32]]) -> FeatureMatrix {
        FeatureMatrix::new(frames.iter().map(|frame| frame.to_vec()).collect()).unwrap()
    }

    fn ramp(frames: usize, dim: usize) -> FeatureMatrix {
        FeatureMatrix::new(
            (0..frames)
                .map(|t| (0..dim).map(|f| (t * dim + f) as f32 - 7.0).collect())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn one_hot_example() {
        let features = matrix(&[
            &[1.0, 0.0, 0.0],
            &[0.0, 1.0, 0.0],
            &[0.0, 0.0, 1.0],
            &[1.0, 1.0, 1.0],
        ]);
        let set = TrainingSet::from_features(&features, 2).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.windows()[0], vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
        assert_eq!(set.targets()[0], vec![0.0, 0.0, 1.0]);
        assert_eq!(set.windows()[1], vec![vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]]);
        assert_eq!(set.targets()[1], vec![1.0, 1.0, 1.0]);

        // Both maxima are already 1.
        let normalized = build_training_set(&features, 2).unwrap();
        assert_eq!(normalized.windows(), set.windows());
        assert_eq!(normalized.targets(), set.targets());
    }

    #[test]
    fn pairs_cover_every_offset() {
        let features = ramp(10, 3);
        for sequence_length in 1..10 {
            let set = TrainingSet::from_features(&features, sequence_length).unwrap();
            assert_eq!(set.len(), 10 - sequence_length);
            for (i, (window, target)) in set.pairs().enumerate() {
                assert_eq!(window.len(), sequence_length);
                assert_eq!(
                    window.as_slice(),
                    &features.frames()[i..i + sequence_length]
                );
                assert_eq!(target, &features.frames()[i + sequence_length]);
            }
        }
    }

    #[test]
    fn too_few_frames() {
        let features = ramp(4, 2);
        for sequence_length in [4, 5, 100] {
            assert!(matches!(
                build_training_set(&features, sequence_length),
                Err(Error::InsufficientData { frames: 4, .. })
            ));
        }
        assert!(matches!(
            build_training_set(&features, 0),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn normalized_values_lie_in_unit_range() {
        let set = build_training_set(&ramp(12, 4), 3).unwrap();
        let windows = set.windows().iter().flatten().flatten();
        let targets = set.targets().iter().flatten();
        for x in windows.chain(targets) {
            assert!((-1.0..=1.0).contains(x), "{} out of range", x);
        }
        // Windows end at frame 10, whose last entry is 10 * 4 + 3 - 7 = 36.
        assert_eq!(set.input_scale(), 36.0);
        assert_eq!(set.target_scale(), 40.0);
    }

    #[test]
    fn normalization_is_a_fixed_point() {
        let once = build_training_set(&ramp(12, 4), 3).unwrap();
        let twice = once.clone().normalize().unwrap();
        assert_eq!(once.windows(), twice.windows());
        assert_eq!(once.targets(), twice.targets());
        assert_eq!(once.input_scale(), twice.input_scale());
    }

    #[test]
    fn window_and_target_scales_are_independent() {
        let features = matrix(&[&[1.0], &[2.0], &[8.0]]);
        let set = build_training_set(&features, 2).unwrap();
        assert_eq!(set.windows()[0], vec![vec![0.5], vec![1.0]]);
        assert_eq!(set.targets()[0], vec![1.0]);
        assert_eq!(set.denormalize_target(&[0.25]), vec![2.0]);
        assert_eq!(set.denormalize_input(&set.windows()[0][0]), vec![1.0]);
    }

    #[test]
    fn all_zero_input_is_degenerate() {
        let features = FeatureMatrix::new(vec![vec![0.0; 3]; 6]).unwrap();
        assert!(matches!(
            build_training_set(&features, 2),
            Err(Error::DegenerateInput { what: "windows" })
        ));

        let zero_targets = matrix(&[&[1.0], &[0.0]]);
        assert!(matches!(
            build_training_set(&zero_targets, 1),
            Err(Error::DegenerateInput { what: "targets" })
        ));
    }

    #[test]
    fn deterministic() {
        let features = ramp(20, 5);
        assert_eq!(
            build_training_set(&features, 4).unwrap(),
            build_training_set(&features, 4).unwrap()
        );
    }

    #[test]
    fn random_window_is_one_of_the_windows() {
        let set = build_training_set(&ramp(20, 2), 4).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            let window = set.random_window(&mut rng);
            assert!(set.windows().contains(window));
        }
    }
}
