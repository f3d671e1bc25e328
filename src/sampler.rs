use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::features::FeatureVector;

/// Anything that can look at a window of `window_len()` feature vectors, each of `feature_dim()`
/// values, and predict the vector that comes next.
pub trait Predictor {
    /// Number of vectors per input window (L).
    fn window_len(&self) -> usize;
    /// Dimension of every input and output vector (F).
    fn feature_dim(&self) -> usize;
    /// Predict the vector following `window`. `window` has shape (L, F).
    fn predict(&self, window: &[FeatureVector]) -> Result<FeatureVector>;
}

/// Wraps a closure as a `Predictor` with a declared input shape.
pub struct FnPredictor<F> {
    window_len: usize,
    feature_dim: usize,
    f: F,
}

impl<F> FnPredictor<F>
where
    F: Fn(&[FeatureVector]) -> Result<FeatureVector>,
{
    pub fn new(window_len: usize, feature_dim: usize, f: F) -> FnPredictor<F> {
        FnPredictor {
            window_len,
            feature_dim,
            f,
        }
    }
}

impl<F> Predictor for FnPredictor<F>
where
    F: Fn(&[FeatureVector]) -> Result<FeatureVector>,
{
    fn window_len(&self) -> usize {
        self.window_len
    }

    fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    fn predict(&self, window: &[FeatureVector]) -> Result<FeatureVector> {
        (self.f)(window)
    }
}

/// Generate `steps` vectors by repeatedly predicting one step ahead from `seed`, feeding every
/// prediction back in as the newest element of the window and dropping the oldest.
///
/// Step `k` sees `seed[k..]` followed by the first `k` predictions (only the last L of them once
/// `k >= L`). A failed prediction aborts the whole run.
pub fn generate<P: Predictor + ?Sized>(
    predictor: &P,
    seed: &[FeatureVector],
    steps: usize,
) -> Result<Vec<FeatureVector>> {
    let window_len = predictor.window_len();
    let feature_dim = predictor.feature_dim();
    if window_len == 0 {
        return Err(Error::InvalidParameter {
            name: "window_len",
            reason: "must be > 0".to_string(),
        });
    }
    check_window(seed, window_len, feature_dim)?;

    let mut window: VecDeque<FeatureVector> = seed.iter().cloned().collect();
    let mut generated = Vec::with_capacity(steps);
    for step in 0..steps {
        let next = predictor.predict(window.make_contiguous())?;
        if next.len() != feature_dim {
            return Err(Error::shape(
                format!("prediction of dimension {}", feature_dim),
                format!("dimension {} at step {}", next.len(), step),
            ));
        }
        window.pop_front();
        window.push_back(next.clone());
        generated.push(next);
    }
    log::debug!("Generated {} steps from a window of {}", steps, window_len);
    Ok(generated)
}

fn check_window(window: &[FeatureVector], window_len: usize, feature_dim: usize) -> Result<()> {
    if window.len() != window_len {
        return Err(Error::shape(
            format!("seed of {} vectors", window_len),
            format!("{} vectors", window.len()),
        ));
    }
    if let Some((i, vector)) = window
        .iter()
        .enumerate()
        .find(|(_, vector)| vector.len() != feature_dim)
    {
        return Err(Error::shape(
            format!("seed vectors of dimension {}", feature_dim),
            format!("dimension {} at index {}", vector.len(), i),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;

    fn one_hot_seed() -> Vec<FeatureVector> {
        vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]
    }

    #[test]
    fn constant_predictor() {
        let predictor = FnPredictor::new(2, 3, |_: &[FeatureVector]| Ok(vec![0.0, 0.0, 0.0]));
        let generated = generate(&predictor, &one_hot_seed(), 3).unwrap();
        assert_eq!(generated, vec![vec![0.0, 0.0, 0.0]; 3]);
    }

    #[test]
    fn zero_steps_never_calls_the_predictor() {
        let calls = Cell::new(0);
        let predictor = FnPredictor::new(2, 3, |_: &[FeatureVector]| {
            calls.set(calls.get() + 1);
            Ok(vec![0.0; 3])
        });
        assert!(generate(&predictor, &one_hot_seed(), 0).unwrap().is_empty());
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn output_length_and_dimension() {
        let predictor = FnPredictor::new(2, 3, |window: &[FeatureVector]| {
            Ok(window[1].iter().map(|x| x + 1.0).collect())
        });
        for steps in [1, 2, 5, 17] {
            let generated = generate(&predictor, &one_hot_seed(), steps).unwrap();
            assert_eq!(generated.len(), steps);
            assert!(generated.iter().all(|vector| vector.len() == 3));
        }
    }

    #[test]
    fn window_slides_over_predictions() {
        let seen = RefCell::new(vec![]);
        let counter = Cell::new(0.0f32);
        let predictor = FnPredictor::new(3, 1, |window: &[FeatureVector]| {
            seen.borrow_mut().push(window.to_vec());
            counter.set(counter.get() + 1.0);
            Ok(vec![100.0 + counter.get()])
        });
        let seed = vec![vec![1.0], vec![2.0], vec![3.0]];
        let generated = generate(&predictor, &seed, 5).unwrap();
        assert_eq!(
            generated,
            vec![vec![101.0], vec![102.0], vec![103.0], vec![104.0], vec![105.0]]
        );

        let seen = seen.into_inner();
        for (k, window) in seen.iter().enumerate() {
            let expected = seed
                .iter()
                .chain(&generated[..k])
                .skip(k)
                .cloned()
                .collect::<Vec<_>>();
            assert_eq!(window, &expected, "window at step {}", k);
        }
    }

    #[test]
    fn seed_shape_is_checked() {
        let predictor = FnPredictor::new(2, 3, |_: &[FeatureVector]| Ok(vec![0.0; 3]));
        let short = vec![vec![1.0, 0.0, 0.0]];
        assert!(matches!(
            generate(&predictor, &short, 1),
            Err(Error::ShapeMismatch { .. })
        ));
        let narrow = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        assert!(matches!(
            generate(&predictor, &narrow, 1),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn empty_window_is_rejected() {
        let calls = Cell::new(0);
        let predictor = FnPredictor::new(0, 3, |_: &[FeatureVector]| {
            calls.set(calls.get() + 1);
            Ok(vec![0.0; 3])
        });
        assert!(matches!(
            generate(&predictor, &[], 4),
            Err(Error::InvalidParameter {
                name: "window_len",
                ..
            })
        ));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn wrong_prediction_dimension() {
        let predictor = FnPredictor::new(2, 3, |_: &[FeatureVector]| Ok(vec![0.0; 2]));
        assert!(matches!(
            generate(&predictor, &one_hot_seed(), 3),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn predictor_failure_propagates() {
        let calls = Cell::new(0);
        let predictor = FnPredictor::new(2, 3, |_: &[FeatureVector]| {
            calls.set(calls.get() + 1);
            if calls.get() == 2 {
                Err(Error::Model("boom".to_string()))
            } else {
                Ok(vec![0.0; 3])
            }
        });
        assert!(matches!(
            generate(&predictor, &one_hot_seed(), 10),
            Err(Error::Model(_))
        ));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn deterministic() {
        let predictor = FnPredictor::new(2, 3, |window: &[FeatureVector]| {
            Ok((0..3).map(|i| window[0][i] * 0.5 + window[1][i]).collect())
        });
        assert_eq!(
            generate(&predictor, &one_hot_seed(), 8).unwrap(),
            generate(&predictor, &one_hot_seed(), 8).unwrap()
        );
    }
}
