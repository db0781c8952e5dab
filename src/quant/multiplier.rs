//! Fixed-point rescaling of 32-bit accumulators.
//!
//! A real rescale factor is stored as a pair `(fixedpoint, exponent)` meaning
//! `fixedpoint * 2^(exponent - 31)`, with `fixedpoint` in `[2^30, 2^31)` for
//! normalized multipliers. Rescaling an accumulator rounds once, half away
//! from zero.

/// Smallest exponent the kernels accept.
pub const MIN_EXPONENT: i32 = -32;

/// Largest exponent the kernels accept.
pub const MAX_EXPONENT: i32 = 31;

/// Rescales `x` by `fixedpoint * 2^(exponent - 31)`, rounding half away from zero.
///
/// The exponent splits into a left shift of `x` (positive part) and an extra
/// right shift after the 64-bit product (negative part), so the product is
/// divided by `2^(31 + max(-exponent, 0))` exactly once. The left shift wraps
/// like the SIMD lanes do; callers keep `x << exponent` inside `i32`.
///
/// This is the scalar twin of the AVX2 lane routine and must stay bit-exact
/// with it.
#[inline]
pub fn multiply_by_quantized_multiplier(x: i32, fixedpoint: i32, exponent: i32) -> i32 {
    debug_assert!((MIN_EXPONENT..=MAX_EXPONENT).contains(&exponent));
    debug_assert!(fixedpoint >= 0);

    let left_shift = exponent.max(0) as u32;
    let right_shift = (-exponent).max(0) as u32;
    let product = x.wrapping_shl(left_shift) as i64 * fixedpoint as i64;

    let total_shift = 31 + right_shift;
    let nudge = 1u64 << (total_shift - 1);
    let magnitude = ((product.unsigned_abs() + nudge) >> total_shift) as i64;
    let rounded = if product < 0 { -magnitude } else { magnitude };
    rounded as i32
}

/// Exact value of `round(x * fixedpoint * 2^(exponent - 31))`, ties away from zero.
///
/// Computed in 128-bit arithmetic with no intermediate wrapping, so it is the
/// ground truth the fast paths are checked against.
pub fn rescale_reference(x: i32, fixedpoint: i32, exponent: i32) -> i64 {
    debug_assert!(exponent <= MAX_EXPONENT);
    let numerator = x as i128 * fixedpoint as i128;
    let shift = (31 - exponent) as u32;
    if shift == 0 {
        return numerator as i64;
    }
    let half = 1i128 << (shift - 1);
    let magnitude = (numerator.abs() + half) >> shift;
    (numerator.signum() * magnitude) as i64
}

/// Encodes a non-negative real multiplier as `(fixedpoint, exponent)`.
///
/// Returns `None` for negative or non-finite input, or when the multiplier
/// is too large for [`MAX_EXPONENT`]. Multipliers too small to represent
/// encode as zero.
pub fn quantize_multiplier(real: f64) -> Option<(i32, i32)> {
    if !real.is_finite() || real < 0.0 {
        return None;
    }
    if real == 0.0 {
        return Some((0, 0));
    }

    // real = mantissa * 2^exponent with mantissa in [0.5, 1)
    let mut exponent = real.log2().floor() as i32 + 1;
    let mut mantissa = real / 2f64.powi(exponent);
    if mantissa >= 1.0 {
        mantissa /= 2.0;
        exponent += 1;
    } else if mantissa < 0.5 {
        mantissa *= 2.0;
        exponent -= 1;
    }

    let mut fixedpoint = (mantissa * (1u64 << 31) as f64).round() as i64;
    if fixedpoint == 1i64 << 31 {
        fixedpoint /= 2;
        exponent += 1;
    }
    if exponent < MIN_EXPONENT {
        return Some((0, 0));
    }
    if exponent > MAX_EXPONENT {
        return None;
    }
    Some((fixedpoint as i32, exponent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_multiplier() {
        // 2^30 * 2^(1 - 31) == 1
        for x in [-1000, -1, 0, 1, 10, 123_456] {
            assert_eq!(multiply_by_quantized_multiplier(x, 1 << 30, 1), x);
        }
        assert_eq!(multiply_by_quantized_multiplier(10, i32::MAX, 0), 10);
    }

    #[test]
    fn test_ties_round_away_from_zero() {
        // x * 2^30 / 2^31 = x / 2
        assert_eq!(multiply_by_quantized_multiplier(5, 1 << 30, 0), 3);
        assert_eq!(multiply_by_quantized_multiplier(-5, 1 << 30, 0), -3);
        assert_eq!(multiply_by_quantized_multiplier(3, 1 << 30, -1), 1);
        assert_eq!(multiply_by_quantized_multiplier(-3, 1 << 30, -1), -1);
        assert_eq!(multiply_by_quantized_multiplier(-6, 1 << 30, -1), -2);
        assert_eq!(rescale_reference(-5, 1 << 30, 0), -3);
    }

    #[test]
    fn test_matches_reference_on_grid() {
        let xs = [i32::MIN, -65_537, -255, -1, 0, 1, 77, 65_535, i32::MAX];
        let ms = [0, 1, 1 << 30, 1_518_500_250, i32::MAX];
        for &x in &xs {
            for &m in &ms {
                for e in MIN_EXPONENT..=0 {
                    let expected = rescale_reference(x, m, e) as i32;
                    assert_eq!(
                        multiply_by_quantized_multiplier(x, m, e),
                        expected,
                        "x={} m={} e={}",
                        x,
                        m,
                        e
                    );
                }
            }
        }
    }

    #[test]
    fn test_positive_exponent_shifts_first() {
        assert_eq!(multiply_by_quantized_multiplier(3, 1 << 30, 4), 24);
        assert_eq!(rescale_reference(3, 1 << 30, 4), 24);
        assert_eq!(multiply_by_quantized_multiplier(-1, 1 << 30, 30), -(1 << 29));
        assert_eq!(rescale_reference(-1, 1 << 30, 30), -(1 << 29));
    }

    #[test]
    fn test_quantize_multiplier_round_trip() {
        for real in [0.0001, 0.003_921_568_6, 0.25, 0.5, 0.75, 1.0, 3.5, 1000.0] {
            let (m, e) = quantize_multiplier(real).unwrap();
            assert!((1 << 30..=i32::MAX).contains(&m), "m={} for {}", m, real);
            let decoded = m as f64 * 2f64.powi(e - 31);
            assert!((decoded - real).abs() / real < 1e-9, "{} decoded as {}", real, decoded);
        }
        assert_eq!(quantize_multiplier(0.0), Some((0, 0)));
        assert_eq!(quantize_multiplier(-1.0), None);
        assert_eq!(quantize_multiplier(f64::NAN), None);
        assert_eq!(quantize_multiplier(1e-30), Some((0, 0)));
    }
}
