//! Portable 8×8 kernels.
//!
//! Same tiling, same descriptors and the same results as the AVX2 kernels,
//! bit for bit: integer accumulation wraps like the SIMD lanes, rescaling
//! goes through [`multiply_by_quantized_multiplier`], and the float path uses
//! one fused multiply-add per term in depth order.

use crate::params::{
    DstType, KERNEL_8BIT_INNER, KERNEL_BLOCK, KernelFlags, KernelParams8bit, KernelParamsFloat,
};
use crate::quant::multiplier::multiply_by_quantized_multiplier;
use crate::quant::zero_point::correct_tile;

type Tile<T> = [[T; KERNEL_BLOCK]; KERNEL_BLOCK];

/// Scalar version of [`crate::kernels::kernel_8bit_avx2`].
///
/// # Safety
///
/// Same contract as the AVX2 kernel minus the CPU feature requirement:
/// `params` must satisfy [`KernelParams8bit::validate`] and every pointer it
/// holds must cover the tiles in range.
#[allow(unsafe_op_in_unsafe_fn)]
pub unsafe fn kernel_8bit_scalar(params: &KernelParams8bit) {
    debug_assert_eq!(params.validate(), Ok(()));

    let elem_size = params.dst_type.size_of();
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

            let mut acc: Tile<i32> = [[0; KERNEL_BLOCK]; KERNEL_BLOCK];
            if params.flags.contains(KernelFlags::HAS_BIAS) {
                for column in acc.iter_mut() {
                    for (r, value) in column.iter_mut().enumerate().take(residual_rows) {
                        *value = *params.bias.add(row + r);
                    }
                }
            }

            accumulate_8bit(&mut acc, lhs_row_ptr, rhs_col_ptr, params.depth);
            correct_tile(params, row, col, residual_rows, residual_cols, &mut acc);

            if params.dst_type != DstType::Int32 {
                for r in 0..residual_rows {
                    let (fixedpoint, exponent) = multiplier_for_row(params, row + r);
                    for column in acc.iter_mut().take(residual_cols) {
                        let scaled = multiply_by_quantized_multiplier(column[r], fixedpoint, exponent)
                            .wrapping_add(params.dst_zero_point);
                        column[r] = scaled.min(params.clamp_max).max(params.clamp_min);
                    }
                }
            }

            store_tile_8bit(params, dst_ptr, residual_rows, residual_cols, &acc);

            lhs_row_ptr = lhs_row_ptr.wrapping_add(KERNEL_BLOCK * params.lhs_stride);
            dst_ptr = dst_ptr.wrapping_add(KERNEL_BLOCK * elem_size);
            row += KERNEL_BLOCK;
        }

        rhs_col_ptr = rhs_col_ptr.wrapping_add(KERNEL_BLOCK * params.rhs_stride);
        dst_col_ptr = dst_col_ptr.wrapping_add(KERNEL_BLOCK * params.dst_stride * elem_size);
        col += KERNEL_BLOCK;
    }
}

#[allow(unsafe_op_in_unsafe_fn)]
unsafe fn accumulate_8bit(acc: &mut Tile<i32>, lhs: *const i8, rhs: *const i8, depth: usize) {
    let chunk_len = KERNEL_BLOCK * KERNEL_8BIT_INNER;
    for chunk in 0..depth / KERNEL_8BIT_INNER {
        let lhs_chunk = std::slice::from_raw_parts(lhs.add(chunk * chunk_len), chunk_len);
        let rhs_chunk = std::slice::from_raw_parts(rhs.add(chunk * chunk_len), chunk_len);
        for (j, column) in acc.iter_mut().enumerate() {
            let rhs_values = &rhs_chunk[j * KERNEL_8BIT_INNER..][..KERNEL_8BIT_INNER];
            for (r, value) in column.iter_mut().enumerate() {
                let lhs_values = &lhs_chunk[r * KERNEL_8BIT_INNER..][..KERNEL_8BIT_INNER];
                let dot: i32 = lhs_values
                    .iter()
                    .zip(rhs_values)
                    .map(|(&l, &r)| l as i32 * r as i32)
                    .sum();
                *value = value.wrapping_add(dot);
            }
        }
    }
}

#[inline]
#[allow(unsafe_op_in_unsafe_fn)]
unsafe fn multiplier_for_row(params: &KernelParams8bit, row: usize) -> (i32, i32) {
    if params.flags.contains(KernelFlags::PER_CHANNEL) {
        (
            *params.multiplier_fixedpoint.add(row),
            *params.multiplier_exponent.add(row),
        )
    } else {
        (*params.multiplier_fixedpoint, *params.multiplier_exponent)
    }
}

#[allow(unsafe_op_in_unsafe_fn)]
unsafe fn store_tile_8bit(
    params: &KernelParams8bit,
    dst: *mut u8,
    residual_rows: usize,
    residual_cols: usize,
    acc: &Tile<i32>,
) {
    for (j, column) in acc.iter().enumerate().take(residual_cols) {
        for (r, &value) in column.iter().enumerate().take(residual_rows) {
            let offset = j * params.dst_stride + r;
            match params.dst_type {
                DstType::Int8 | DstType::Uint8 => dst.add(offset).write(value as u8),
                DstType::Int16 => (dst as *mut i16).add(offset).write_unaligned(value as i16),
                DstType::Int32 => (dst as *mut i32).add(offset).write_unaligned(value),
            }
        }
    }
}

/// Scalar version of [`crate::kernels::kernel_float_avx2`].
///
/// # Safety
///
/// Same contract as the AVX2 kernel minus the CPU feature requirement.
#[allow(unsafe_op_in_unsafe_fn)]
pub unsafe fn kernel_float_scalar(params: &KernelParamsFloat) {
    debug_assert_eq!(params.validate(), Ok(()));

    let end_col = params.col_end();
    let mut col = params.start_col;

    while col + KERNEL_BLOCK <= end_col {
        column_block_float(params, col, KERNEL_BLOCK);
        col += KERNEL_BLOCK;
    }
    if col < end_col {
        column_block_float(params, col, end_col - col);
    }
}

#[allow(unsafe_op_in_unsafe_fn)]
unsafe fn column_block_float(params: &KernelParamsFloat, col: usize, residual_cols: usize) {
    let end_row = params.row_end();
    let has_bias = params.flags.contains(KernelFlags::HAS_BIAS);

    let col_block = (col - params.start_col) / KERNEL_BLOCK;
    let rhs = params
        .rhs_base
        .wrapping_add(col_block * KERNEL_BLOCK * params.rhs_stride);
    let dst_col_ptr = params
        .dst_base
        .wrapping_add((col - params.start_col) * params.dst_stride);

    let mut lhs = params.lhs_base;
    let mut row = params.start_row;
    while row < end_row {
        let residual_rows = (end_row - row).min(KERNEL_BLOCK);

        let mut acc: Tile<f32> = [[0.0; KERNEL_BLOCK]; KERNEL_BLOCK];
        if has_bias {
            for column in acc.iter_mut() {
                for (r, value) in column.iter_mut().enumerate().take(residual_rows) {
                    *value = *params.bias.add(row + r);
                }
            }
        }

        for d in 0..params.depth {
            let lhs_step = std::slice::from_raw_parts(lhs.add(d * KERNEL_BLOCK), KERNEL_BLOCK);
            let rhs_step = std::slice::from_raw_parts(rhs.add(d * KERNEL_BLOCK), KERNEL_BLOCK);
            for (column, &rhs_value) in acc.iter_mut().zip(rhs_step) {
                for (value, &lhs_value) in column.iter_mut().zip(lhs_step) {
                    *value = lhs_value.mul_add(rhs_value, *value);
                }
            }
        }

        let dst = dst_col_ptr.wrapping_add(row - params.start_row);
        for (j, column) in acc.iter().enumerate().take(residual_cols) {
            for (r, &value) in column.iter().enumerate().take(residual_rows) {
                dst.add(j * params.dst_stride + r)
                    .write(clamp_like_simd(value, params.clamp_min, params.clamp_max));
            }
        }

        lhs = lhs.wrapping_add(KERNEL_BLOCK * params.lhs_stride);
        row += KERNEL_BLOCK;
    }
}

/// `max(min(v, hi), lo)` with `vminps`/`vmaxps` operand order, so NaN
/// handling matches the AVX2 kernel.
#[inline]
fn clamp_like_simd(value: f32, lo: f32, hi: f32) -> f32 {
    let upper = if value < hi { value } else { hi };
    if upper > lo { upper } else { lo }
}
