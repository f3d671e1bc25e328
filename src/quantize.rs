fn inv_lerp(a: f64, b: f64, x: f64) -> f64 {
    (x - a) / (b - a)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

pub trait Quantizable: Sized + Copy {
    fn into_f64(x: Self) -> f64;

    /// Quantize `x` to a usize. The `min` and `max` parameters should be set to the
    /// smallest and largest values that `x` may take on; `x` is clamped into that range. The
    /// output lies in [0, quantization_level], rounded to the nearest level. A collapsed range
    /// (`min == max`) always quantizes to 0.
    fn quantize(x: Self, min: Self, max: Self, quantization_level: usize) -> usize {
        let min = Self::into_f64(min);
        let max = Self::into_f64(max);
        if max <= min {
            return 0;
        }
        let x = Self::into_f64(x).clamp(min, max);

        // First, map x from the [min, max] range to the [0.0, 1.0] range (which turns x into t)
        let t = inv_lerp(min, max, x);
        // Then, map from the [0.0, 1.0] range to the [0.0, quantization_level] range.
        lerp(0.0, quantization_level as f64, t).round() as usize
    }
}

impl Quantizable for f32 {
    fn into_f64(x: Self) -> f64 {
        x.into()
    }
}

impl Quantizable for f64 {
    fn into_f64(x: Self) -> f64 {
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_endpoints_and_middle() {
        assert_eq!(Quantizable::quantize(0.0f32, 0.0, 1.0, 24), 0);
        assert_eq!(Quantizable::quantize(1.0f32, 0.0, 1.0, 24), 24);
        assert_eq!(Quantizable::quantize(0.5f32, 0.0, 1.0, 24), 12);
        assert_eq!(Quantizable::quantize(-3.0f64, -2.0, 2.0, 4), 0);
        assert_eq!(Quantizable::quantize(0.7f32, 0.7, 0.7, 12), 0);
    }
}
