//! Reference packing into the layouts the 8×8 kernels consume.
//!
//! Packing is not part of the kernels' hot path and these routines are not
//! tuned. They exist so the kernels can be fed, tested and benchmarked.
//!
//! Both operands are packed the same way: the LHS as rows × depth and the
//! RHS as cols × depth (its transpose), in blocks of 8 rows.
//!
//! Integer layout, per block of 8 rows: depth chunk `k` occupies 32 bytes at
//! `32 * k`, element `(r, d)` at `4 * r + d % 4`. Depth is padded to a
//! multiple of 4 and rows to a multiple of 8 with the zero point, so padding
//! contributes nothing after zero-point correction.
//!
//! Float layout, per block of 8 rows: depth step `d` occupies 8 values at
//! `8 * d`, one per row. Padding rows are zero.

use crate::matrix::transpose::transpose;
use crate::params::{KERNEL_8BIT_INNER, KERNEL_BLOCK};

/// A packed operand.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedMatrix<T> {
    /// Packed values, `padded_rows * stride` of them.
    pub data: Vec<T>,
    /// Logical rows (LHS rows or RHS columns).
    pub rows: usize,
    /// Depth the kernel iterates over, after padding.
    pub depth: usize,
    /// Elements per packed row; a block of 8 rows spans `8 * stride`.
    pub stride: usize,
    /// Per-row sums over the padded depth. Empty for float operands.
    pub sums: Vec<i32>,
}

impl<T> PackedMatrix<T> {
    /// Rows including padding up to the block size.
    pub fn padded_rows(&self) -> usize {
        self.data.len() / self.stride.max(1)
    }
}

fn round_up(value: usize, multiple: usize) -> usize {
    value.div_ceil(multiple) * multiple
}

/// Packs a rows × depth row-major `i8` matrix with row stride `src_stride`.
pub fn pack_8bit(
    src: &[i8],
    rows: usize,
    depth: usize,
    src_stride: usize,
    zero_point: i8,
) -> PackedMatrix<i8> {
    assert!(src_stride >= depth, "src_stride {} < depth {}", src_stride, depth);
    assert!(
        rows == 0 || src.len() >= (rows - 1) * src_stride + depth,
        "src too short for {}x{} with stride {}",
        rows,
        depth,
        src_stride
    );

    let padded_depth = round_up(depth, KERNEL_8BIT_INNER);
    let padded_rows = round_up(rows, KERNEL_BLOCK);
    let block_len = KERNEL_BLOCK * padded_depth;
    let mut data = vec![zero_point; padded_rows * padded_depth];

    for r in 0..rows {
        let block = r / KERNEL_BLOCK;
        let lane = r % KERNEL_BLOCK;
        for d in 0..depth {
            let chunk = d / KERNEL_8BIT_INNER;
            let offset = block * block_len
                + chunk * KERNEL_BLOCK * KERNEL_8BIT_INNER
                + lane * KERNEL_8BIT_INNER
                + d % KERNEL_8BIT_INNER;
            data[offset] = src[r * src_stride + d];
        }
    }

    let mut sums = vec![0i32; padded_rows];
    for (r, sum) in sums.iter_mut().enumerate() {
        let block = &data[(r / KERNEL_BLOCK) * block_len..][..block_len];
        let lane = r % KERNEL_BLOCK;
        *sum = block
            .chunks_exact(KERNEL_BLOCK * KERNEL_8BIT_INNER)
            .flat_map(|chunk| &chunk[lane * KERNEL_8BIT_INNER..][..KERNEL_8BIT_INNER])
            .map(|&v| v as i32)
            .sum();
    }

    PackedMatrix {
        data,
        rows,
        depth: padded_depth,
        stride: padded_depth,
        sums,
    }
}

/// Packs a row-major rows × depth LHS.
pub fn pack_lhs_8bit(lhs: &[i8], rows: usize, depth: usize, zero_point: i8) -> PackedMatrix<i8> {
    pack_8bit(lhs, rows, depth, depth, zero_point)
}

/// Packs a row-major depth × cols RHS.
pub fn pack_rhs_8bit(rhs: &[i8], depth: usize, cols: usize, zero_point: i8) -> PackedMatrix<i8> {
    let mut rhs_t = vec![0i8; depth * cols];
    transpose(rhs, &mut rhs_t, depth, cols);
    pack_8bit(&rhs_t, cols, depth, depth, zero_point)
}

/// Maps `u8` operands and their zero point onto the signed domain.
///
/// Subtracting 128 from both the values and the zero point leaves every
/// `value - zero_point` difference unchanged.
pub fn to_signed(src: &[u8], zero_point: i32) -> (Vec<i8>, i32) {
    let values = src.iter().map(|&v| (v ^ 0x80) as i8).collect();
    (values, zero_point - 128)
}

/// Packs a rows × depth row-major `f32` matrix with row stride `src_stride`.
pub fn pack_float(src: &[f32], rows: usize, depth: usize, src_stride: usize) -> PackedMatrix<f32> {
    assert!(src_stride >= depth, "src_stride {} < depth {}", src_stride, depth);

    let padded_rows = round_up(rows, KERNEL_BLOCK);
    let mut data = vec![0.0f32; padded_rows * depth];

    for r in 0..rows {
        let block = r / KERNEL_BLOCK;
        let lane = r % KERNEL_BLOCK;
        for d in 0..depth {
            data[block * KERNEL_BLOCK * depth + d * KERNEL_BLOCK + lane] = src[r * src_stride + d];
        }
    }

    PackedMatrix {
        data,
        rows,
        depth,
        stride: depth,
        sums: Vec::new(),
    }
}

/// Packs a row-major rows × depth float LHS.
pub fn pack_lhs_float(lhs: &[f32], rows: usize, depth: usize) -> PackedMatrix<f32> {
    pack_float(lhs, rows, depth, depth)
}

/// Packs a row-major depth × cols float RHS.
pub fn pack_rhs_float(rhs: &[f32], depth: usize, cols: usize) -> PackedMatrix<f32> {
    let mut rhs_t = vec![0.0f32; depth * cols];
    transpose(rhs, &mut rhs_t, depth, cols);
    pack_float(&rhs_t, cols, depth, depth)
}
