//! Fixed-point rescaling of eight i32 lanes with AVX2.
//!
//! AVX2 has no 64-bit arithmetic shift by a variable amount, so the rounding
//! right shift of the 64-bit products is done with `vpsrlvq` on values biased
//! into unsigned range:
//!
//! ```text
//! biased  = product + 2^(s - 1) - (product < 0) + 2^63
//! shifted = biased >> s                      (logical)
//! result  = shifted - (2^63 >> s)
//! ```
//!
//! `s = 31 + max(-exponent, 0)` is the whole right shift. Adding `2^(s - 1)`
//! rounds half up; subtracting one more for negative products turns that
//! into half away from zero. `2^63` is a multiple of `2^s` for every `s <= 63`,
//! so the bias shifts out exactly and the logical shift floors like an
//! arithmetic one. With `|product| < 2^62` nothing wraps.

use std::arch::x86_64::*;

/// Per-row rescale constants, computed once per tile.
#[derive(Clone, Copy)]
pub(crate) struct Rescale {
    left_shift: __m256i,
    m_low: __m256i,
    m_high: __m256i,
    shift_low: __m256i,
    shift_high: __m256i,
    offset_low: __m256i,
    offset_high: __m256i,
    unbias_low: __m256i,
    unbias_high: __m256i,
}

impl Rescale {
    /// Builds the constants from per-lane multipliers and exponents.
    #[inline]
    #[target_feature(enable = "avx2")]
    #[allow(unsafe_op_in_unsafe_fn)]
    pub(crate) unsafe fn new(m_vector: __m256i, e_vector: __m256i) -> Self {
        let zero = _mm256_setzero_si256();
        let left_shift = _mm256_max_epi32(e_vector, zero);
        let right_shift = _mm256_max_epi32(_mm256_sub_epi32(zero, e_vector), zero);
        let total_shift = _mm256_add_epi32(right_shift, _mm256_set1_epi32(31));

        let shift_low = _mm256_cvtepi32_epi64(_mm256_castsi256_si128(total_shift));
        let shift_high = _mm256_cvtepi32_epi64(_mm256_extracti128_si256(total_shift, 1));

        let one = _mm256_set1_epi64x(1);
        let bias = _mm256_set1_epi64x(i64::MIN);
        let nudge_low = _mm256_sllv_epi64(one, _mm256_sub_epi64(shift_low, one));
        let nudge_high = _mm256_sllv_epi64(one, _mm256_sub_epi64(shift_high, one));

        Self {
            left_shift,
            m_low: _mm256_cvtepi32_epi64(_mm256_castsi256_si128(m_vector)),
            m_high: _mm256_cvtepi32_epi64(_mm256_extracti128_si256(m_vector, 1)),
            shift_low,
            shift_high,
            offset_low: _mm256_add_epi64(nudge_low, bias),
            offset_high: _mm256_add_epi64(nudge_high, bias),
            unbias_low: _mm256_srlv_epi64(bias, shift_low),
            unbias_high: _mm256_srlv_epi64(bias, shift_high),
        }
    }

    /// Rescales eight accumulators, one per row lane.
    #[inline]
    #[target_feature(enable = "avx2")]
    #[allow(unsafe_op_in_unsafe_fn)]
    pub(crate) unsafe fn apply(&self, accum: __m256i) -> __m256i {
        let shifted = _mm256_sllv_epi32(accum, self.left_shift);

        let product_low = _mm256_mul_epi32(
            _mm256_cvtepi32_epi64(_mm256_castsi256_si128(shifted)),
            self.m_low,
        );
        let product_high = _mm256_mul_epi32(
            _mm256_cvtepi32_epi64(_mm256_extracti128_si256(shifted, 1)),
            self.m_high,
        );

        let low = rounding_shift_right(product_low, self.offset_low, self.shift_low, self.unbias_low);
        let high = rounding_shift_right(
            product_high,
            self.offset_high,
            self.shift_high,
            self.unbias_high,
        );

        // Keep the low 32 bits of each 64-bit lane, back in row order.
        let high = _mm256_slli_epi64(high, 32);
        let interleaved = _mm256_blend_epi32(low, high, 0xaa);
        _mm256_permutevar8x32_epi32(interleaved, _mm256_setr_epi32(0, 2, 4, 6, 1, 3, 5, 7))
    }
}

#[inline]
#[target_feature(enable = "avx2")]
#[allow(unsafe_op_in_unsafe_fn)]
unsafe fn rounding_shift_right(
    product: __m256i,
    offset: __m256i,
    shift: __m256i,
    unbias: __m256i,
) -> __m256i {
    let negative = _mm256_cmpgt_epi64(_mm256_setzero_si256(), product);
    let biased = _mm256_add_epi64(_mm256_add_epi64(product, offset), negative);
    _mm256_sub_epi64(_mm256_srlv_epi64(biased, shift), unbias)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quant::multiplier::{
        MAX_EXPONENT, MIN_EXPONENT, multiply_by_quantized_multiplier, rescale_reference,
    };
    use proptest::prelude::*;

    fn rescale_lanes(accum: [i32; 8], m: [i32; 8], e: [i32; 8]) -> [i32; 8] {
        let mut out = [0i32; 8];
        unsafe {
            let load = |v: &[i32; 8]| _mm256_loadu_si256(v.as_ptr() as *const __m256i);
            let rescale = Rescale::new(load(&m), load(&e));
            let result = rescale.apply(load(&accum));
            _mm256_storeu_si256(out.as_mut_ptr() as *mut __m256i, result);
        }
        out
    }

    #[test]
    fn test_lanes_match_scalar_on_edges() {
        if !is_x86_feature_detected!("avx2") {
            println!("Skipping - AVX2 not available");
            return;
        }
        let accum = [i32::MIN, -3, -2, -1, 0, 1, 5, i32::MAX];
        for e in MIN_EXPONENT..=0 {
            for m in [0, 1, 1 << 30, 1_518_500_250, i32::MAX] {
                let out = rescale_lanes(accum, [m; 8], [e; 8]);
                for lane in 0..8 {
                    assert_eq!(
                        out[lane],
                        multiply_by_quantized_multiplier(accum[lane], m, e),
                        "accum={} m={} e={}",
                        accum[lane],
                        m,
                        e
                    );
                }
            }
        }
    }

    #[test]
    fn test_lanes_mix_exponents() {
        if !is_x86_feature_detected!("avx2") {
            println!("Skipping - AVX2 not available");
            return;
        }
        let accum = [-5, -5, 5, 5, 1000, -1000, 3, -3];
        let e = [0, -1, 0, -1, 4, 4, MIN_EXPONENT, -31];
        let out = rescale_lanes(accum, [1 << 30; 8], e);
        for lane in 0..8 {
            assert_eq!(out[lane] as i64, rescale_reference(accum[lane], 1 << 30, e[lane]));
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(512))]

        /// Every lane equals the exact i128 result for any exponent, as long
        /// as the pre-shift does not leave i32.
        #[test]
        fn prop_lanes_match_exact_reference(
            accum in any::<i32>(),
            m in 0..=i32::MAX,
            e in MIN_EXPONENT..=MAX_EXPONENT,
        ) {
            if !is_x86_feature_detected!("avx2") {
                return Ok(());
            }
            let left = e.max(0) as u32;
            let accum = if left > 0 { accum >> left } else { accum };
            let expected = rescale_reference(accum, m, e);
            prop_assume!(i32::try_from(expected).is_ok());

            let out = rescale_lanes([accum; 8], [m; 8], [e; 8]);
            for lane in out {
                prop_assert_eq!(lane as i64, expected);
            }
        }
    }
}
