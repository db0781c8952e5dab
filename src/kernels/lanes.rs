//! Partial-width AVX2 loads and stores for residual tiles.
//!
//! One mask primitive covers every width 1..=8 instead of a case per width.
//! 32-bit elements go through `vpmaskmov`, which never touches masked-out
//! memory. Narrow elements are truncated into a small array and copied with
//! the exact element count.

use crate::params::KERNEL_BLOCK;
use std::arch::x86_64::*;
use std::ptr;

/// All ones in the first `n` 32-bit lanes, zero in the rest.
#[inline]
#[target_feature(enable = "avx2")]
#[allow(unsafe_op_in_unsafe_fn)]
pub(crate) unsafe fn lane_mask(n: usize) -> __m256i {
    debug_assert!(n <= KERNEL_BLOCK);
    let lanes = _mm256_setr_epi32(0, 1, 2, 3, 4, 5, 6, 7);
    _mm256_cmpgt_epi32(_mm256_set1_epi32(n as i32), lanes)
}

/// Loads `n` i32 values, zero-filling the remaining lanes.
#[inline]
#[target_feature(enable = "avx2")]
#[allow(unsafe_op_in_unsafe_fn)]
pub(crate) unsafe fn loadu_n_epi32(n: usize, src: *const i32) -> __m256i {
    if n == KERNEL_BLOCK {
        _mm256_loadu_si256(src as *const __m256i)
    } else {
        _mm256_maskload_epi32(src, lane_mask(n))
    }
}

/// Loads `n` f32 values, zero-filling the remaining lanes.
#[inline]
#[target_feature(enable = "avx2")]
#[allow(unsafe_op_in_unsafe_fn)]
pub(crate) unsafe fn loadu_n_ps(n: usize, src: *const f32) -> __m256 {
    if n == KERNEL_BLOCK {
        _mm256_loadu_ps(src)
    } else {
        _mm256_maskload_ps(src, lane_mask(n))
    }
}

/// Stores the first `n` i32 lanes of `v`.
#[inline]
#[target_feature(enable = "avx2")]
#[allow(unsafe_op_in_unsafe_fn)]
pub(crate) unsafe fn storeu_n_epi32(dst: *mut i32, n: usize, v: __m256i) {
    if n == KERNEL_BLOCK {
        _mm256_storeu_si256(dst as *mut __m256i, v);
    } else {
        _mm256_maskstore_epi32(dst, lane_mask(n), v);
    }
}

/// Stores the first `n` f32 lanes of `v`.
#[inline]
#[target_feature(enable = "avx2")]
#[allow(unsafe_op_in_unsafe_fn)]
pub(crate) unsafe fn storeu_n_ps(dst: *mut f32, n: usize, v: __m256) {
    if n == KERNEL_BLOCK {
        _mm256_storeu_ps(dst, v);
    } else {
        _mm256_maskstore_ps(dst, lane_mask(n), v);
    }
}

/// Broadcasts lane `i` of `v` to every lane.
#[inline]
#[target_feature(enable = "avx2")]
#[allow(unsafe_op_in_unsafe_fn)]
pub(crate) unsafe fn broadcast_lane_epi32(v: __m256i, i: usize) -> __m256i {
    _mm256_permutevar8x32_epi32(v, _mm256_set1_epi32(i as i32))
}

/// Truncates each i32 lane to its low byte.
#[inline]
#[target_feature(enable = "avx2")]
#[allow(unsafe_op_in_unsafe_fn)]
pub(crate) unsafe fn cvtepi32_epi8(v: __m256i) -> [u8; KERNEL_BLOCK] {
    // Bytes 0, 4, 8, 12 of each 128-bit half.
    let repack_perm = _mm256_set1_epi32(0x0c08_0400);
    let shuffled = _mm256_shuffle_epi8(v, repack_perm);
    let low = _mm_cvtsi128_si32(_mm256_castsi256_si128(shuffled)) as u32 as u64;
    let high = _mm_cvtsi128_si32(_mm256_extracti128_si256(shuffled, 1)) as u32 as u64;
    (low | (high << 32)).to_le_bytes()
}

/// Truncates each i32 lane to its low 16 bits.
#[inline]
#[target_feature(enable = "avx2")]
#[allow(unsafe_op_in_unsafe_fn)]
pub(crate) unsafe fn cvtepi32_epi16(v: __m256i) -> [i16; KERNEL_BLOCK] {
    // Bytes 0, 1, 4, 5, 8, 9, 12, 13 of each 128-bit half.
    let repack_perm = _mm256_set1_epi64x(0x0d0c_0908_0504_0100);
    let shuffled = _mm256_shuffle_epi8(v, repack_perm);
    let low = _mm_cvtsi128_si64(_mm256_castsi256_si128(shuffled)) as u64;
    let high = _mm_cvtsi128_si64(_mm256_extracti128_si256(shuffled, 1)) as u64;
    let mut out = [0i16; KERNEL_BLOCK];
    for i in 0..4 {
        out[i] = (low >> (16 * i)) as i16;
        out[i + 4] = (high >> (16 * i)) as i16;
    }
    out
}

/// Writes all 8 narrowed lanes with one unaligned store.
#[inline]
#[allow(unsafe_op_in_unsafe_fn)]
pub(crate) unsafe fn store_full<T: Copy>(dst: *mut T, lanes: [T; KERNEL_BLOCK]) {
    ptr::write_unaligned(dst as *mut [T; KERNEL_BLOCK], lanes);
}

/// Writes exactly the first `n` narrowed lanes.
#[inline]
#[allow(unsafe_op_in_unsafe_fn)]
pub(crate) unsafe fn store_n<T: Copy>(dst: *mut T, n: usize, lanes: &[T; KERNEL_BLOCK]) {
    debug_assert!(n <= KERNEL_BLOCK);
    ptr::copy_nonoverlapping(lanes.as_ptr(), dst, n);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_avx2() -> bool {
        if !is_x86_feature_detected!("avx2") {
            println!("Skipping - AVX2 not available");
            return false;
        }
        true
    }

    #[test]
    fn test_masked_load_stops_at_n() {
        if !has_avx2() {
            return;
        }
        let src = [1, 2, 3, 4, 5, 6, 7, 8];
        for n in 0..=KERNEL_BLOCK {
            let mut out = [0i32; KERNEL_BLOCK];
            unsafe {
                let v = loadu_n_epi32(n, src.as_ptr());
                _mm256_storeu_si256(out.as_mut_ptr() as *mut __m256i, v);
            }
            for i in 0..KERNEL_BLOCK {
                assert_eq!(out[i], if i < n { src[i] } else { 0 }, "n={} lane={}", n, i);
            }
        }
    }

    #[test]
    fn test_masked_store_leaves_guard_untouched() {
        if !has_avx2() {
            return;
        }
        for n in 1..=KERNEL_BLOCK {
            let mut dst = [-1.0f32; KERNEL_BLOCK + 1];
            unsafe {
                storeu_n_ps(dst.as_mut_ptr(), n, _mm256_set1_ps(2.5));
            }
            for (i, &v) in dst.iter().enumerate() {
                assert_eq!(v, if i < n { 2.5 } else { -1.0 }, "n={} index={}", n, i);
            }
        }
    }

    #[test]
    fn test_narrowing_truncates_low_bits() {
        if !has_avx2() {
            return;
        }
        unsafe {
            let v = _mm256_setr_epi32(-1, 255, 256, 127, -128, 0x1234_5678, 7, -300);
            assert_eq!(cvtepi32_epi8(v), [0xff, 0xff, 0x00, 0x7f, 0x80, 0x78, 7, 0xd4]);
            assert_eq!(
                cvtepi32_epi16(v),
                [-1, 255, 256, 127, -128, 0x5678, 7, -300]
            );
            let b = broadcast_lane_epi32(v, 5);
            assert_eq!(_mm256_extract_epi32(b, 0), 0x1234_5678);
            assert_eq!(_mm256_extract_epi32(b, 7), 0x1234_5678);
        }
    }

    #[test]
    fn test_store_n_writes_exact_count() {
        let lanes: [i16; KERNEL_BLOCK] = [1, 2, 3, 4, 5, 6, 7, 8];
        for n in 1..=KERNEL_BLOCK {
            let mut dst = [0i16; KERNEL_BLOCK + 2];
            unsafe { store_n(dst.as_mut_ptr().add(1), n, &lanes) };
            assert_eq!(dst[0], 0);
            assert_eq!(&dst[1..=n], &lanes[..n]);
            assert!(dst[n + 1..].iter().all(|&v| v == 0));
        }
    }
}
