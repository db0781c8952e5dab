//! 8×8 AVX2 quantized kernel.

use crate::kernels::lanes::{
    broadcast_lane_epi32, cvtepi32_epi8, cvtepi32_epi16, loadu_n_epi32, store_full, store_n,
    storeu_n_epi32,
};
use crate::kernels::requant_avx2::Rescale;
use crate::params::{DstType, KERNEL_8BIT_INNER, KERNEL_BLOCK, KernelFlags, KernelParams8bit};
use std::arch::x86_64::*;

/// Computes every 8×8 tile of `params` with AVX2.
///
/// Each accumulator register holds one tile column with rows in its eight
/// 32-bit lanes. Per tile: bias, rank-4 updates over the depth, zero-point
/// correction, then for narrow destinations rescale, offset and clamp, and
/// finally a full or masked store.
///
/// # Safety
///
/// Caller must ensure:
/// - CPU supports AVX2 (checked via `#[target_feature]`)
/// - `params` satisfies [`KernelParams8bit::validate`]
/// - packed operands hold full 8-row blocks for every tile in range
/// - every array the flags enable covers the rows/columns in range
/// - `dst_base` is aligned for `dst_type` and its tiles are not written
///   concurrently by anyone else
#[target_feature(enable = "avx2")]
#[allow(unsafe_op_in_unsafe_fn)]
pub unsafe fn kernel_8bit_avx2(params: &KernelParams8bit) {
    debug_assert_eq!(params.validate(), Ok(()));

    // Row pairs (d0, d1) into the low 8 bytes, (d2, d3) into the high 8,
    // within each 128-bit half.
    let splitter_idx = _mm256_setr_epi8(
        0, 1, 4, 5, 8, 9, 12, 13, 2, 3, 6, 7, 10, 11, 14, 15, //
        0, 1, 4, 5, 8, 9, 12, 13, 2, 3, 6, 7, 10, 11, 14, 15,
    );
    let elem_size = params.dst_type.size_of();
    let has_bias = params.flags.contains(KernelFlags::HAS_BIAS);

    let mut rhs_col_ptr = params.rhs_base;
    let mut dst_col_ptr = params.dst_base;

    let mut col = params.start_col;
    while col <= params.last_col {
        let residual_cols = (params.dst_cols - col).min(KERNEL_BLOCK);
        let mut lhs_row_ptr = params.lhs_base;
        let mut dst_ptr = dst_col_ptr;

        let mut row = params.start_row;
        while row <= params.last_row {
            let residual_rows = (params.dst_rows - row).min(KERNEL_BLOCK);

            let initial = if has_bias {
                loadu_n_epi32(residual_rows, params.bias.add(row))
            } else {
                _mm256_setzero_si256()
            };
            let mut accum = [initial; KERNEL_BLOCK];

            accumulate(&mut accum, lhs_row_ptr, rhs_col_ptr, params.depth, splitter_idx);
            correct_zero_points(params, row, col, residual_rows, residual_cols, &mut accum);

            if params.dst_type != DstType::Int32 {
                requantize(params, row, residual_rows, &mut accum);
                offset_and_clamp(params, &mut accum);
            }

            store_tile(
                params.dst_type,
                dst_ptr,
                params.dst_stride,
                residual_rows,
                residual_cols,
                &accum,
            );

            lhs_row_ptr = lhs_row_ptr.wrapping_add(KERNEL_BLOCK * params.lhs_stride);
            dst_ptr = dst_ptr.wrapping_add(KERNEL_BLOCK * elem_size);
            row += KERNEL_BLOCK;
        }

        rhs_col_ptr = rhs_col_ptr.wrapping_add(KERNEL_BLOCK * params.rhs_stride);
        dst_col_ptr = dst_col_ptr.wrapping_add(KERNEL_BLOCK * params.dst_stride * elem_size);
        col += KERNEL_BLOCK;
    }
}

/// Rank-4 updates of the tile over the whole depth.
#[inline]
#[target_feature(enable = "avx2")]
#[allow(unsafe_op_in_unsafe_fn)]
unsafe fn accumulate(
    accum: &mut [__m256i; KERNEL_BLOCK],
    lhs: *const i8,
    rhs: *const i8,
    depth: usize,
    splitter_idx: __m256i,
) {
    let mut lhs_ptr = lhs;
    let mut rhs_ptr = rhs;
    for _ in (0..depth).step_by(KERNEL_8BIT_INNER) {
        let lhs_data = _mm256_loadu_si256(lhs_ptr as *const __m256i);
        let rhs_data = _mm256_loadu_si256(rhs_ptr as *const __m256i);

        let lhs_split = _mm256_shuffle_epi8(lhs_data, splitter_idx);
        let bottom = _mm256_cvtepi8_epi16(_mm256_castsi256_si128(lhs_split));
        let top = _mm256_cvtepi8_epi16(_mm256_extracti128_si256(lhs_split, 1));
        // (d0, d1) and (d2, d3) of rows 0..8 as i16 pairs.
        let lhs_d01 = _mm256_permute2x128_si256(bottom, top, 0x20);
        let lhs_d23 = _mm256_permute2x128_si256(bottom, top, 0x31);

        // Columns 0..4 and 4..8, each column's four values as two i16 pairs.
        let rhs_cols_lo = _mm256_cvtepi8_epi16(_mm256_castsi256_si128(rhs_data));
        let rhs_cols_hi = _mm256_cvtepi8_epi16(_mm256_extracti128_si256(rhs_data, 1));

        for (j, acc) in accum.iter_mut().enumerate() {
            let cols = if j < 4 { rhs_cols_lo } else { rhs_cols_hi };
            let pair = 2 * (j % 4);
            let rhs_d01 = broadcast_lane_epi32(cols, pair);
            let rhs_d23 = broadcast_lane_epi32(cols, pair + 1);
            *acc = _mm256_add_epi32(*acc, _mm256_madd_epi16(lhs_d01, rhs_d01));
            *acc = _mm256_add_epi32(*acc, _mm256_madd_epi16(lhs_d23, rhs_d23));
        }

        lhs_ptr = lhs_ptr.wrapping_add(KERNEL_BLOCK * KERNEL_8BIT_INNER);
        rhs_ptr = rhs_ptr.wrapping_add(KERNEL_BLOCK * KERNEL_8BIT_INNER);
    }
}

#[inline]
#[target_feature(enable = "avx2")]
#[allow(unsafe_op_in_unsafe_fn)]
unsafe fn correct_zero_points(
    params: &KernelParams8bit,
    row: usize,
    col: usize,
    residual_rows: usize,
    residual_cols: usize,
    accum: &mut [__m256i; KERNEL_BLOCK],
) {
    let lhs_zero_point = params.lhs_zero_point;
    let rhs_zero_point = params.rhs_zero_point;

    if params.flags.contains(KernelFlags::HAS_LHS_SUMS) && rhs_zero_point != 0 {
        let lhs_sums = loadu_n_epi32(residual_rows, params.lhs_sums.add(row));
        let lhs_sums_offset = _mm256_mullo_epi32(_mm256_set1_epi32(rhs_zero_point), lhs_sums);
        for acc in accum.iter_mut() {
            *acc = _mm256_sub_epi32(*acc, lhs_sums_offset);
        }
    }

    let use_rhs_sums = params.flags.contains(KernelFlags::HAS_RHS_SUMS) && lhs_zero_point != 0;
    if use_rhs_sums || params.prod_zp_depth != 0 {
        let rhs_sums = if use_rhs_sums {
            loadu_n_epi32(residual_cols, params.rhs_sums.add(col))
        } else {
            _mm256_setzero_si256()
        };
        let non_lhs_sums_offset = _mm256_sub_epi32(
            _mm256_mullo_epi32(_mm256_set1_epi32(lhs_zero_point), rhs_sums),
            _mm256_set1_epi32(params.prod_zp_depth),
        );
        for (j, acc) in accum.iter_mut().enumerate() {
            *acc = _mm256_sub_epi32(*acc, broadcast_lane_epi32(non_lhs_sums_offset, j));
        }
    }
}

#[inline]
#[target_feature(enable = "avx2")]
#[allow(unsafe_op_in_unsafe_fn)]
unsafe fn requantize(
    params: &KernelParams8bit,
    row: usize,
    residual_rows: usize,
    accum: &mut [__m256i; KERNEL_BLOCK],
) {
    let (m_vector, e_vector) = if params.flags.contains(KernelFlags::PER_CHANNEL) {
        (
            loadu_n_epi32(residual_rows, params.multiplier_fixedpoint.add(row)),
            loadu_n_epi32(residual_rows, params.multiplier_exponent.add(row)),
        )
    } else {
        (
            _mm256_set1_epi32(*params.multiplier_fixedpoint),
            _mm256_set1_epi32(*params.multiplier_exponent),
        )
    };

    let rescale = Rescale::new(m_vector, e_vector);
    for acc in accum.iter_mut() {
        *acc = rescale.apply(*acc);
    }
}

#[inline]
#[target_feature(enable = "avx2")]
#[allow(unsafe_op_in_unsafe_fn)]
unsafe fn offset_and_clamp(params: &KernelParams8bit, accum: &mut [__m256i; KERNEL_BLOCK]) {
    if params.dst_zero_point != 0 {
        let dst_zero_point = _mm256_set1_epi32(params.dst_zero_point);
        for acc in accum.iter_mut() {
            *acc = _mm256_add_epi32(*acc, dst_zero_point);
        }
    }
    let clamp_max = _mm256_set1_epi32(params.clamp_max);
    let clamp_min = _mm256_set1_epi32(params.clamp_min);
    for acc in accum.iter_mut() {
        *acc = _mm256_max_epi32(_mm256_min_epi32(*acc, clamp_max), clamp_min);
    }
}

/// Narrows and writes one tile; only `residual_cols × residual_rows` elements
/// are touched unless the tile is full.
#[inline]
#[target_feature(enable = "avx2")]
#[allow(unsafe_op_in_unsafe_fn)]
unsafe fn store_tile(
    dst_type: DstType,
    dst: *mut u8,
    dst_stride: usize,
    residual_rows: usize,
    residual_cols: usize,
    accum: &[__m256i; KERNEL_BLOCK],
) {
    let full = residual_rows == KERNEL_BLOCK && residual_cols == KERNEL_BLOCK;

    match dst_type {
        DstType::Int8 | DstType::Uint8 => {
            for (j, acc) in accum.iter().enumerate().take(residual_cols) {
                let col_ptr = dst.wrapping_add(j * dst_stride);
                let bytes = cvtepi32_epi8(*acc);
                if full {
                    store_full(col_ptr, bytes);
                } else {
                    store_n(col_ptr, residual_rows, &bytes);
                }
            }
        }
        DstType::Int16 => {
            let dst = dst as *mut i16;
            for (j, acc) in accum.iter().enumerate().take(residual_cols) {
                let col_ptr = dst.wrapping_add(j * dst_stride);
                let halves = cvtepi32_epi16(*acc);
                if full {
                    store_full(col_ptr, halves);
                } else {
                    store_n(col_ptr, residual_rows, &halves);
                }
            }
        }
        DstType::Int32 => {
            let dst = dst as *mut i32;
            for (j, acc) in accum.iter().enumerate().take(residual_cols) {
                storeu_n_epi32(dst.wrapping_add(j * dst_stride), residual_rows, *acc);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::naive::matmul_8bit_reference;
    use crate::matrix::pack::{pack_lhs_8bit, pack_rhs_8bit};
    use crate::quant::spec::{Multiplier, QuantSpec};

    #[test]
    fn test_kernel_8bit_avx2_correctness() {
        if !is_x86_feature_detected!("avx2") {
            println!("Skipping - AVX2 not available");
            return;
        }

        let (rows, cols, depth) = (8, 8, 16);
        let lhs: Vec<i8> = (0..rows * depth).map(|i| (i % 23) as i8 - 11).collect();
        let rhs: Vec<i8> = (0..depth * cols).map(|i| (i % 17) as i8 - 8).collect();
        let lhs_pack = pack_lhs_8bit(&lhs, rows, depth, 0);
        let rhs_pack = pack_rhs_8bit(&rhs, depth, cols, 0);

        let spec = QuantSpec::new(DstType::Int32);
        let mut dst = vec![0i32; rows * cols];
        let params = spec.kernel_params(&lhs_pack, &rhs_pack, dst.as_mut_ptr() as *mut u8, rows);
        unsafe { kernel_8bit_avx2(&params) };

        assert_eq!(dst, matmul_8bit_reference(&lhs, &rhs, rows, cols, depth, &spec));
    }

    #[test]
    fn test_kernel_8bit_avx2_requantized_int8() {
        if !is_x86_feature_detected!("avx2") {
            println!("Skipping - AVX2 not available");
            return;
        }

        let (rows, cols, depth) = (11, 9, 20);
        let lhs: Vec<i8> = (0..rows * depth).map(|i| ((i * 37) % 255) as u8 as i8).collect();
        let rhs: Vec<i8> = (0..depth * cols).map(|i| ((i * 91) % 255) as u8 as i8).collect();
        let lhs_pack = pack_lhs_8bit(&lhs, rows, depth, 3);
        let rhs_pack = pack_rhs_8bit(&rhs, depth, cols, -7);

        let mut spec = QuantSpec::new(DstType::Int8);
        spec.lhs_zero_point = 3;
        spec.rhs_zero_point = -7;
        spec.dst_zero_point = 5;
        spec.bias = Some((0..rows as i32).map(|i| i * 100 - 500).collect());
        spec.multiplier = Multiplier::PerTensor {
            fixedpoint: 1_518_500_250,
            exponent: -9,
        };

        let mut dst = vec![0i8; rows * cols];
        let params = spec.kernel_params(&lhs_pack, &rhs_pack, dst.as_mut_ptr() as *mut u8, rows);
        unsafe { kernel_8bit_avx2(&params) };

        let expected = matmul_8bit_reference(&lhs, &rhs, rows, cols, depth, &spec);
        for i in 0..rows * cols {
            assert_eq!(dst[i] as i32, expected[i], "Mismatch at {}", i);
        }
    }
}
