//! Zero-point correction of raw integer dot products.
//!
//! With operands stored as `q = real / scale + zero_point`, the dot product of
//! the shifted operands expands to
//!
//! ```text
//! sum((l - lzp) * (r - rzp)) = raw - rzp * sum(l) - lzp * sum(r) + lzp * rzp * depth
//! ```
//!
//! so the kernel only needs per-row LHS sums, per-column RHS sums and the
//! precomputed `prod_zp_depth`. All arithmetic wraps like the SIMD lanes.

use crate::params::{KERNEL_BLOCK, KernelFlags, KernelParams8bit};

/// Amount subtracted from every accumulator of one row.
#[inline]
pub fn lhs_sums_offset(rhs_zero_point: i32, lhs_sum: i32) -> i32 {
    rhs_zero_point.wrapping_mul(lhs_sum)
}

/// Amount subtracted from every accumulator of one column.
#[inline]
pub fn rhs_sums_offset(lhs_zero_point: i32, rhs_sum: i32, prod_zp_depth: i32) -> i32 {
    lhs_zero_point
        .wrapping_mul(rhs_sum)
        .wrapping_sub(prod_zp_depth)
}

/// Corrects one raw accumulator given its row and column sums.
pub fn correct(
    raw: i32,
    lhs_sum: i32,
    rhs_sum: i32,
    lhs_zero_point: i32,
    rhs_zero_point: i32,
    prod_zp_depth: i32,
) -> i32 {
    raw.wrapping_sub(lhs_sums_offset(rhs_zero_point, lhs_sum))
        .wrapping_sub(rhs_sums_offset(lhs_zero_point, rhs_sum, prod_zp_depth))
}

/// Applies the correction to a tile of accumulators laid out `acc[col][row]`.
///
/// Sums are only read for the first `residual_rows` rows and `residual_cols`
/// columns, and not at all when the matching zero point is zero.
///
/// # Safety
///
/// When the corresponding flags are set, `params.lhs_sums` must be readable
/// at `row..row + residual_rows` and `params.rhs_sums` at
/// `col..col + residual_cols`.
#[allow(unsafe_op_in_unsafe_fn)]
pub(crate) unsafe fn correct_tile(
    params: &KernelParams8bit,
    row: usize,
    col: usize,
    residual_rows: usize,
    residual_cols: usize,
    acc: &mut [[i32; KERNEL_BLOCK]; KERNEL_BLOCK],
) {
    let flags = params.flags;
    let rhs_zero_point = params.rhs_zero_point;
    let lhs_zero_point = params.lhs_zero_point;

    if flags.contains(KernelFlags::HAS_LHS_SUMS) && rhs_zero_point != 0 {
        for r in 0..residual_rows {
            let offset = lhs_sums_offset(rhs_zero_point, *params.lhs_sums.add(row + r));
            for column in acc.iter_mut() {
                column[r] = column[r].wrapping_sub(offset);
            }
        }
    }

    let use_rhs_sums = flags.contains(KernelFlags::HAS_RHS_SUMS) && lhs_zero_point != 0;
    if use_rhs_sums || params.prod_zp_depth != 0 {
        for (c, column) in acc.iter_mut().enumerate().take(residual_cols) {
            let rhs_sum = if use_rhs_sums {
                *params.rhs_sums.add(col + c)
            } else {
                0
            };
            let offset = rhs_sums_offset(lhs_zero_point, rhs_sum, params.prod_zp_depth);
            for value in column.iter_mut() {
                *value = value.wrapping_sub(offset);
            }
        }
    }
}
