//! Unpacked triple-loop references for both kernels.
//!
//! These are correctness baselines, not fast paths. Operands are row-major:
//! the LHS is rows × depth and the RHS depth × cols. Results are returned
//! column-major, `result[col * rows + row]`, like the kernels' destinations.

use crate::params::DstType;
use crate::quant::multiplier::rescale_reference;
use crate::quant::spec::QuantSpec;

/// Quantized GEMM computed directly from the zero-point-shifted operands.
///
/// Returns the value each destination element should hold, widened to `i32`:
/// the raw corrected accumulator for [`DstType::Int32`], otherwise the
/// rescaled, offset and clamped result.
pub fn matmul_8bit_reference(
    lhs: &[i8],
    rhs: &[i8],
    rows: usize,
    cols: usize,
    depth: usize,
    spec: &QuantSpec,
) -> Vec<i32> {
    assert_eq!(lhs.len(), rows * depth, "LHS: expected {}x{} elements", rows, depth);
    assert_eq!(rhs.len(), depth * cols, "RHS: expected {}x{} elements", depth, cols);

    let mut out = vec![0i32; rows * cols];
    for j in 0..cols {
        for i in 0..rows {
            let mut acc: i64 = spec.bias.as_ref().map_or(0, |bias| bias[i] as i64);
            for p in 0..depth {
                let l = lhs[i * depth + p] as i64 - spec.lhs_zero_point as i64;
                let r = rhs[p * cols + j] as i64 - spec.rhs_zero_point as i64;
                acc += l * r;
            }
            let acc = acc as i32;

            out[j * rows + i] = if spec.dst_type == DstType::Int32 {
                acc
            } else {
                let (fixedpoint, exponent) = spec.multiplier.for_row(i);
                let scaled = rescale_reference(acc, fixedpoint, exponent)
                    + spec.dst_zero_point as i64;
                scaled.clamp(spec.clamp_min as i64, spec.clamp_max as i64) as i32
            };
        }
    }
    out
}

/// Float GEMM with bias and clamping, one fused multiply-add per term in
/// depth order, so it matches the kernels bit for bit.
#[allow(clippy::too_many_arguments)]
pub fn matmul_float_reference(
    lhs: &[f32],
    rhs: &[f32],
    rows: usize,
    cols: usize,
    depth: usize,
    bias: Option<&[f32]>,
    clamp_min: f32,
    clamp_max: f32,
) -> Vec<f32> {
    assert_eq!(lhs.len(), rows * depth, "LHS: expected {}x{} elements", rows, depth);
    assert_eq!(rhs.len(), depth * cols, "RHS: expected {}x{} elements", depth, cols);

    let mut out = vec![0.0f32; rows * cols];
    for j in 0..cols {
        for i in 0..rows {
            let mut acc = bias.map_or(0.0, |bias| bias[i]);
            for p in 0..depth {
                acc = lhs[i * depth + p].mul_add(rhs[p * cols + j], acc);
            }
            out[j * rows + i] = acc.min(clamp_max).max(clamp_min);
        }
    }
    out
}
