//! 8×8 AVX2 + FMA float kernel.

use crate::kernels::lanes::{loadu_n_ps, storeu_n_ps};
use crate::params::{KERNEL_BLOCK, KernelFlags, KernelParamsFloat};
use std::arch::x86_64::*;

/// Computes every 8×8 tile of `params` with AVX2 and FMA.
///
/// Columns are walked in two passes: all full 8-wide blocks, then at most one
/// trailing block narrower than 8. Rows stop at `min(dst_rows, last_row + 8)`
/// and the last row block is masked.
///
/// # Safety
///
/// Caller must ensure:
/// - CPU supports AVX2 and FMA (checked via `#[target_feature]`)
/// - `params` satisfies [`KernelParamsFloat::validate`]
/// - packed operands hold full 8-row blocks of `depth` steps for every tile
/// - `bias` covers every row in range when `HAS_BIAS` is set
/// - the destination tiles are not written concurrently by anyone else
#[target_feature(enable = "avx2,fma")]
#[allow(unsafe_op_in_unsafe_fn)]
pub unsafe fn kernel_float_avx2(params: &KernelParamsFloat) {
    debug_assert_eq!(params.validate(), Ok(()));

    let end_col = params.col_end();
    let mut col = params.start_col;

    while col + KERNEL_BLOCK <= end_col {
        column_block(params, col, KERNEL_BLOCK);
        col += KERNEL_BLOCK;
    }
    if col < end_col {
        column_block(params, col, end_col - col);
    }
}

#[inline]
#[target_feature(enable = "avx2,fma")]
#[allow(unsafe_op_in_unsafe_fn)]
unsafe fn column_block(params: &KernelParamsFloat, col: usize, residual_cols: usize) {
    let end_row = params.row_end();
    let has_bias = params.flags.contains(KernelFlags::HAS_BIAS);
    let clamp_min = _mm256_set1_ps(params.clamp_min);
    let clamp_max = _mm256_set1_ps(params.clamp_max);

    let col_block = (col - params.start_col) / KERNEL_BLOCK;
    let rhs_ptr = params
        .rhs_base
        .wrapping_add(col_block * KERNEL_BLOCK * params.rhs_stride);
    let dst_col_ptr = params
        .dst_base
        .wrapping_add((col - params.start_col) * params.dst_stride);

    let mut lhs_ptr = params.lhs_base;
    let mut row = params.start_row;
    while row < end_row {
        let residual_rows = (end_row - row).min(KERNEL_BLOCK);

        let initial = if has_bias {
            loadu_n_ps(residual_rows, params.bias.add(row))
        } else {
            _mm256_setzero_ps()
        };
        let mut accum = [initial; KERNEL_BLOCK];

        for d in 0..params.depth {
            let lhs_data = _mm256_loadu_ps(lhs_ptr.add(d * KERNEL_BLOCK));
            let rhs_step = rhs_ptr.add(d * KERNEL_BLOCK);
            for (j, acc) in accum.iter_mut().enumerate() {
                let rhs_value = _mm256_broadcast_ss(&*rhs_step.add(j));
                *acc = _mm256_fmadd_ps(lhs_data, rhs_value, *acc);
            }
        }

        let dst_ptr = dst_col_ptr.wrapping_add(row - params.start_row);
        for (j, acc) in accum.iter().enumerate().take(residual_cols) {
            let clamped = _mm256_max_ps(_mm256_min_ps(*acc, clamp_max), clamp_min);
            storeu_n_ps(dst_ptr.wrapping_add(j * params.dst_stride), residual_rows, clamped);
        }

        lhs_ptr = lhs_ptr.wrapping_add(KERNEL_BLOCK * params.lhs_stride);
        row += KERNEL_BLOCK;
    }
}
