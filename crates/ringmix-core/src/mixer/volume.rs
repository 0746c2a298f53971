//! Logarithmic volume to linear gain conversion
//!
//! Emulated buffers store their volume on a logarithmic scale in `[0, 1]`
//! where `1.0` means no attenuation. The mapping here is the inverse of the
//! one used by the control that sets those values, so a volume set in linear
//! terms through [`logarithmic_volume`] comes back unchanged.

/// At or above this logarithmic volume the gain is exactly 1.0
pub const FULL_GAIN_THRESHOLD: f64 = 0.99;

const LN_100: f64 = 4.605_170_185_988_092;

/// Convert a logarithmic volume to a linear gain in `[0, 1]`
#[inline]
pub fn linear_gain(log_volume: f64) -> f32 {
    if log_volume.is_nan() {
        return 0.0;
    }
    let v = log_volume.clamp(0.0, 1.0);
    if v >= FULL_GAIN_THRESHOLD {
        return 1.0;
    }
    let gain = -(1.0 - v).ln() / LN_100;
    gain.clamp(0.0, 1.0) as f32
}

/// Convert a linear gain in `[0, 1]` to the logarithmic volume scale
#[inline]
pub fn logarithmic_volume(linear: f32) -> f64 {
    if linear.is_nan() {
        return 0.0;
    }
    let g = linear.clamp(0.0, 1.0) as f64;
    1.0 - (-g * LN_100).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_formula_below_threshold() {
        for v in [0.0, 0.1, 0.25, 0.5, 0.75, 0.9, 0.98] {
            let expected = (-(1.0f64 - v).ln() / 100f64.ln()) as f32;
            assert!((linear_gain(v) - expected).abs() < 1e-6, "v = {}", v);
        }
    }

    #[test]
    fn test_half_volume() {
        // ln(2) / ln(100)
        assert!((linear_gain(0.5) - 0.150_515).abs() < 1e-5);
    }

    #[test]
    fn test_full_gain_at_threshold() {
        assert_eq!(linear_gain(0.99), 1.0);
        assert_eq!(linear_gain(0.995), 1.0);
        assert_eq!(linear_gain(1.0), 1.0);
    }

    #[test]
    fn test_out_of_domain_clamped() {
        assert_eq!(linear_gain(-3.0), 0.0);
        assert_eq!(linear_gain(42.0), 1.0);
        assert_eq!(linear_gain(f64::NAN), 0.0);
        assert_eq!(linear_gain(0.0), 0.0);
    }

    #[test]
    fn test_monotonic() {
        let mut previous = -1.0f32;
        for step in 0..990 {
            let gain = linear_gain(step as f64 / 1000.0);
            assert!(gain > previous);
            assert!((0.0..=1.0).contains(&gain));
            previous = gain;
        }
    }

    #[test]
    fn test_inverse_round_trip() {
        for g in [0.0f32, 0.1, 0.33, 0.5, 0.8, 0.99] {
            let back = linear_gain(logarithmic_volume(g));
            assert!((back - g).abs() < 1e-5, "g = {}", g);
        }
        assert!((logarithmic_volume(1.0) - 0.99).abs() < 1e-12);
    }
}
