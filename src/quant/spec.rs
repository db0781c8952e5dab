//! Owned description of a quantized multiplication.

use crate::error::ParamsError;
use crate::matrix::pack::PackedMatrix;
use crate::params::{DstType, KERNEL_BLOCK, KernelFlags, KernelParams8bit, check_sub_range};
use crate::quant::multiplier::{MAX_EXPONENT, MIN_EXPONENT};
use std::ops::Range;

/// Output rescale factor, shared by all rows or one per row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Multiplier {
    PerTensor { fixedpoint: i32, exponent: i32 },
    PerChannel { fixedpoint: Vec<i32>, exponent: Vec<i32> },
}

impl Multiplier {
    /// The multiplier that leaves values unchanged: `2^30 * 2^(1 - 31)`.
    pub fn identity() -> Self {
        Multiplier::PerTensor {
            fixedpoint: 1 << 30,
            exponent: 1,
        }
    }

    /// `(fixedpoint, exponent)` applied to `row`.
    pub fn for_row(&self, row: usize) -> (i32, i32) {
        match self {
            Multiplier::PerTensor {
                fixedpoint,
                exponent,
            } => (*fixedpoint, *exponent),
            Multiplier::PerChannel {
                fixedpoint,
                exponent,
            } => (fixedpoint[row], exponent[row]),
        }
    }

    fn validate(&self, rows: usize) -> Result<(), ParamsError> {
        let (fixedpoints, exponents): (&[i32], &[i32]) = match self {
            Multiplier::PerTensor {
                fixedpoint,
                exponent,
            } => (std::slice::from_ref(fixedpoint), std::slice::from_ref(exponent)),
            Multiplier::PerChannel {
                fixedpoint,
                exponent,
            } => {
                check_len("multiplier_fixedpoint", fixedpoint.len(), rows)?;
                check_len("multiplier_exponent", exponent.len(), rows)?;
                (fixedpoint, exponent)
            }
        };
        if let Some(&m) = fixedpoints.iter().find(|&&m| m < 0) {
            return Err(ParamsError::NegativeMultiplier(m));
        }
        if let Some(&e) = exponents
            .iter()
            .find(|&&e| !(MIN_EXPONENT..=MAX_EXPONENT).contains(&e))
        {
            return Err(ParamsError::ExponentOutOfRange(e));
        }
        Ok(())
    }
}

/// Zero points, bias, rescaling and output range of one quantized GEMM.
///
/// Zero points are those of the packed (signed) operands; see
/// [`crate::matrix::pack::to_signed`] for unsigned inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantSpec {
    pub lhs_zero_point: i32,
    pub rhs_zero_point: i32,
    pub dst_zero_point: i32,
    pub bias: Option<Vec<i32>>,
    pub multiplier: Multiplier,
    pub clamp_min: i32,
    pub clamp_max: i32,
    pub dst_type: DstType,
}

impl QuantSpec {
    /// Symmetric operands, identity rescale, clamped to the full range of `dst_type`.
    pub fn new(dst_type: DstType) -> Self {
        let (clamp_min, clamp_max) = dst_type.range();
        Self {
            lhs_zero_point: 0,
            rhs_zero_point: 0,
            dst_zero_point: 0,
            bias: None,
            multiplier: Multiplier::identity(),
            clamp_min,
            clamp_max,
            dst_type,
        }
    }

    /// Checks what the kernel cannot see through the descriptor's pointers.
    pub fn validate(&self, rows: usize) -> Result<(), ParamsError> {
        if let Some(bias) = &self.bias {
            check_len("bias", bias.len(), rows)?;
        }
        self.multiplier.validate(rows)
    }

    /// Descriptor covering the whole `lhs.rows × rhs.rows` output.
    ///
    /// `dst` must point to a column-major buffer of `dst_type` elements with
    /// `dst_stride` elements between columns. The returned descriptor borrows
    /// `self`, `lhs` and `rhs` through raw pointers; they must outlive its use.
    pub fn kernel_params(
        &self,
        lhs: &PackedMatrix<i8>,
        rhs: &PackedMatrix<i8>,
        dst: *mut u8,
        dst_stride: usize,
    ) -> KernelParams8bit {
        debug_assert_eq!(lhs.depth, rhs.depth);
        self.build_params(lhs, rhs, dst, dst_stride, 0..lhs.rows, 0..rhs.rows)
    }

    /// Descriptor covering the sub-rectangle `rows × cols` of the output.
    ///
    /// `dst` is the base of the whole output. Both ranges must start on a
    /// tile boundary and end on one or at the full extent; see
    /// [`check_sub_range`].
    pub fn kernel_params_for(
        &self,
        lhs: &PackedMatrix<i8>,
        rhs: &PackedMatrix<i8>,
        dst: *mut u8,
        dst_stride: usize,
        rows: Range<usize>,
        cols: Range<usize>,
    ) -> Result<KernelParams8bit, ParamsError> {
        debug_assert_eq!(lhs.depth, rhs.depth);
        check_sub_range("row", &rows, lhs.rows)?;
        check_sub_range("col", &cols, rhs.rows)?;
        Ok(self.build_params(lhs, rhs, dst, dst_stride, rows, cols))
    }

    fn build_params(
        &self,
        lhs: &PackedMatrix<i8>,
        rhs: &PackedMatrix<i8>,
        dst: *mut u8,
        dst_stride: usize,
        rows: Range<usize>,
        cols: Range<usize>,
    ) -> KernelParams8bit {
        let mut flags = KernelFlags::HAS_LHS_SUMS | KernelFlags::HAS_RHS_SUMS;
        flags.set(KernelFlags::HAS_BIAS, self.bias.is_some());

        let (multiplier_fixedpoint, multiplier_exponent) = match &self.multiplier {
            Multiplier::PerTensor {
                fixedpoint,
                exponent,
            } => (fixedpoint as *const i32, exponent as *const i32),
            Multiplier::PerChannel {
                fixedpoint,
                exponent,
            } => {
                flags |= KernelFlags::PER_CHANNEL;
                (fixedpoint.as_ptr(), exponent.as_ptr())
            }
        };

        let elem_size = self.dst_type.size_of();
        let dst_offset = (cols.start * dst_stride + rows.start) * elem_size;
        let depth = lhs.depth;

        KernelParams8bit {
            lhs_base: lhs.data.as_ptr().wrapping_add(rows.start * lhs.stride),
            rhs_base: rhs.data.as_ptr().wrapping_add(cols.start * rhs.stride),
            dst_base: dst.wrapping_add(dst_offset),
            dst_stride,
            dst_type: self.dst_type,
            lhs_stride: lhs.stride,
            rhs_stride: rhs.stride,
            depth,
            start_row: rows.start,
            last_row: last_tile_start(&rows),
            start_col: cols.start,
            last_col: last_tile_start(&cols),
            dst_rows: lhs.rows,
            dst_cols: rhs.rows,
            bias: self
                .bias
                .as_ref()
                .map_or(std::ptr::null(), |bias| bias.as_ptr()),
            lhs_zero_point: self.lhs_zero_point,
            rhs_zero_point: self.rhs_zero_point,
            dst_zero_point: self.dst_zero_point,
            prod_zp_depth: self
                .lhs_zero_point
                .wrapping_mul(self.rhs_zero_point)
                .wrapping_mul(depth as i32),
            multiplier_fixedpoint,
            multiplier_exponent,
            lhs_sums: lhs.sums.as_ptr(),
            rhs_sums: rhs.sums.as_ptr(),
            flags,
            clamp_min: self.clamp_min,
            clamp_max: self.clamp_max,
        }
    }
}

/// First index of the last 8-wide tile of `range`.
pub(crate) fn last_tile_start(range: &Range<usize>) -> usize {
    range.start + (range.end - range.start - 1) / KERNEL_BLOCK * KERNEL_BLOCK
}

fn check_len(what: &'static str, actual: usize, expected: usize) -> Result<(), ParamsError> {
    if actual < expected {
        return Err(ParamsError::TooFewValues {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}
