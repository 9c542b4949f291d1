//! Translation between continuous physical quantities and spin patterns.
//!
//! Sensors: a value `x` in `[-xmax, +xmax]` is binned uniformly into
//! `2^bits` buckets and written as an MSB-first binary code over spin
//! values (`0 -> -1`, `1 -> +1`).
//!
//! Motors: the mean of the motor spins (a value in `[-1, 1]`) is bucketed
//! into one of three discrete actions with fixed thresholds at ±1/3.

use crate::envs::Action;

/// Uniform bin index for `x` in `[-xmax, +xmax]` over `2^bits` buckets.
///
/// The small epsilon in the denominator keeps `x == +xmax` inside the top
/// bucket; values outside the calibrated range clamp to the boundary
/// buckets instead of indexing out of range.
pub fn sensor_index(x: f32, xmax: f32, bits: u32) -> usize {
    debug_assert!(bits < usize::BITS, "sensor code wider than the index type");
    let buckets = 1usize << bits;
    let span = 2.0 * xmax + 10.0 * f32::EPSILON;
    let raw = ((x + xmax) / span * buckets as f32).floor();
    if raw < 0.0 {
        0
    } else {
        (raw as usize).min(buckets - 1)
    }
}

/// Write `index` as an MSB-first spin pattern filling `out`.
pub fn write_bits(index: usize, out: &mut [f32]) {
    let width = out.len();
    for (k, slot) in out.iter_mut().enumerate() {
        let bit = (index >> (width - 1 - k)) & 1;
        *slot = if bit == 1 { 1.0 } else { -1.0 };
    }
}

/// Read an MSB-first spin pattern back into an integer.
///
/// Inverse of [`write_bits`]; also used for whole-region state indices.
/// Panics in debug builds if the pattern is wider than 64 bits.
pub fn pattern_index(spins: &[f32]) -> u64 {
    debug_assert!(spins.len() <= 64, "pattern wider than 64 bits");
    let mut acc = 0u64;
    for &s in spins {
        acc = (acc << 1) | u64::from(s > 0.0);
    }
    acc
}

pub fn motor_mean(motors: &[f32]) -> f32 {
    if motors.is_empty() {
        return 0.0;
    }
    motors.iter().sum::<f32>() / motors.len() as f32
}

/// Coarse fixed quantization of the motor readout; not configurable.
pub fn quantize_action(mean: f32) -> Action {
    if mean < -1.0 / 3.0 {
        Action::Back
    } else if mean < 1.0 / 3.0 {
        Action::Stay
    } else {
        Action::Forward
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binning_covers_range_without_overflow() {
        let bits = 4;
        let xmax = 0.045f32;
        let buckets = 1usize << bits;

        for k in 0..=1000 {
            let x = -xmax + 2.0 * xmax * (k as f32 / 1000.0);
            let idx = sensor_index(x, xmax, bits);
            assert!(idx < buckets, "x={x} escaped to bucket {idx}");
        }

        // The boundary value must land in the top bucket, not one past it.
        assert_eq!(sensor_index(xmax, xmax, bits), buckets - 1);
        assert_eq!(sensor_index(-xmax, xmax, bits), 0);
    }

    #[test]
    fn out_of_range_values_clamp() {
        assert_eq!(sensor_index(10.0, 1.0, 3), 7);
        assert_eq!(sensor_index(-10.0, 1.0, 3), 0);
    }

    #[test]
    fn bit_codec_roundtrips() {
        let mut buf = [0.0f32; 5];
        for index in 0..32 {
            write_bits(index, &mut buf);
            for &s in &buf {
                assert!(s == 1.0 || s == -1.0);
            }
            assert_eq!(pattern_index(&buf), index as u64);
        }
    }

    #[test]
    fn action_thresholds_match_fixed_buckets() {
        assert_eq!(quantize_action(-1.0), Action::Back);
        assert_eq!(quantize_action(0.0), Action::Stay);
        assert_eq!(quantize_action(1.0), Action::Forward);

        assert_eq!(quantize_action(-0.34), Action::Back);
        assert_eq!(quantize_action(-0.33), Action::Stay);
        assert_eq!(quantize_action(0.33), Action::Stay);
        assert_eq!(quantize_action(0.35), Action::Forward);
    }

    #[test]
    fn motor_mean_of_empty_region_is_neutral() {
        assert_eq!(motor_mean(&[]), 0.0);
        assert_eq!(quantize_action(motor_mean(&[])), Action::Stay);
    }
}
