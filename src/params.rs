//! Per-invocation parameter descriptors for the 8×8 kernels.
//!
//! A descriptor is a plain bag of pointers and geometry handed to a kernel
//! by reference. The kernel trusts it completely; [`KernelParams8bit::validate`]
//! and [`KernelParamsFloat::validate`] exist for callers and debug builds.
//!
//! Row/column ranges follow one convention for both kernels: tiles start at
//! `start_row, start_row + 8, ..` up to and including `last_row`, so
//! `last_row` is the first row of the last tile. The same holds for columns.

use crate::error::ParamsError;
use crate::matrix::pack::PackedMatrix;
use std::ops::{BitOr, BitOrAssign, Range};
use std::ptr;

/// Rows and columns per output tile.
pub const KERNEL_BLOCK: usize = 8;

/// Depth values per packed chunk on the integer path.
pub const KERNEL_8BIT_INNER: usize = 4;

/// Destination element encodings understood by the integer kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DstType {
    Int8,
    Uint8,
    Int16,
    Int32,
}

impl DstType {
    /// Size of one destination element in bytes.
    pub fn size_of(self) -> usize {
        match self {
            DstType::Int8 | DstType::Uint8 => 1,
            DstType::Int16 => 2,
            DstType::Int32 => 4,
        }
    }

    /// Smallest and largest value the element can hold.
    pub fn range(self) -> (i32, i32) {
        match self {
            DstType::Int8 => (i8::MIN as i32, i8::MAX as i32),
            DstType::Uint8 => (u8::MIN as i32, u8::MAX as i32),
            DstType::Int16 => (i16::MIN as i32, i16::MAX as i32),
            DstType::Int32 => (i32::MIN, i32::MAX),
        }
    }
}

/// Independent options of a kernel invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct KernelFlags(u32);

impl KernelFlags {
    pub const HAS_BIAS: Self = Self(1 << 0);
    pub const HAS_LHS_SUMS: Self = Self(1 << 1);
    pub const HAS_RHS_SUMS: Self = Self(1 << 2);
    /// Multipliers are per-row arrays instead of a single value.
    pub const PER_CHANNEL: Self = Self(1 << 3);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, other: Self, on: bool) {
        if on {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }
}

impl BitOr for KernelFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for KernelFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Descriptor for the quantized 8-bit kernel.
///
/// Strides are in elements: `lhs_stride`/`rhs_stride` in packed `i8` values
/// per row (a block of 8 rows spans `8 * stride`), `dst_stride` in
/// destination elements between consecutive columns.
///
/// `bias`, `lhs_sums`, per-channel multipliers and exponents are indexed by
/// absolute row, `rhs_sums` by absolute column. Without
/// [`KernelFlags::PER_CHANNEL`] the multiplier pointers each address a
/// single value.
#[derive(Debug, Clone, Copy)]
pub struct KernelParams8bit {
    pub lhs_base: *const i8,
    pub rhs_base: *const i8,
    pub dst_base: *mut u8,
    pub dst_stride: usize,
    pub dst_type: DstType,
    pub lhs_stride: usize,
    pub rhs_stride: usize,
    pub depth: usize,
    pub start_row: usize,
    pub last_row: usize,
    pub start_col: usize,
    pub last_col: usize,
    pub dst_rows: usize,
    pub dst_cols: usize,
    pub bias: *const i32,
    pub lhs_zero_point: i32,
    pub rhs_zero_point: i32,
    pub dst_zero_point: i32,
    pub prod_zp_depth: i32,
    pub multiplier_fixedpoint: *const i32,
    pub multiplier_exponent: *const i32,
    pub lhs_sums: *const i32,
    pub rhs_sums: *const i32,
    pub flags: KernelFlags,
    pub clamp_min: i32,
    pub clamp_max: i32,
}

impl Default for KernelParams8bit {
    fn default() -> Self {
        Self {
            lhs_base: ptr::null(),
            rhs_base: ptr::null(),
            dst_base: ptr::null_mut(),
            dst_stride: 0,
            dst_type: DstType::Int32,
            lhs_stride: 0,
            rhs_stride: 0,
            depth: 0,
            start_row: 0,
            last_row: 0,
            start_col: 0,
            last_col: 0,
            dst_rows: 0,
            dst_cols: 0,
            bias: ptr::null(),
            lhs_zero_point: 0,
            rhs_zero_point: 0,
            dst_zero_point: 0,
            prod_zp_depth: 0,
            multiplier_fixedpoint: ptr::null(),
            multiplier_exponent: ptr::null(),
            lhs_sums: ptr::null(),
            rhs_sums: ptr::null(),
            flags: KernelFlags::empty(),
            clamp_min: i32::MIN,
            clamp_max: i32::MAX,
        }
    }
}

impl KernelParams8bit {
    /// One past the last output row this invocation may write.
    pub fn row_end(&self) -> usize {
        self.dst_rows.min(self.last_row + KERNEL_BLOCK)
    }

    /// One past the last output column this invocation may write.
    pub fn col_end(&self) -> usize {
        self.dst_cols.min(self.last_col + KERNEL_BLOCK)
    }

    /// Checks every contract that can be checked without dereferencing.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.lhs_base.is_null() {
            return Err(ParamsError::NullPointer("lhs_base"));
        }
        if self.rhs_base.is_null() {
            return Err(ParamsError::NullPointer("rhs_base"));
        }
        if self.dst_base.is_null() {
            return Err(ParamsError::NullPointer("dst_base"));
        }
        if self.dst_type != DstType::Int32 {
            if self.multiplier_fixedpoint.is_null() {
                return Err(ParamsError::NullPointer("multiplier_fixedpoint"));
            }
            if self.multiplier_exponent.is_null() {
                return Err(ParamsError::NullPointer("multiplier_exponent"));
            }
        }
        check_flag(self.flags, KernelFlags::HAS_BIAS, "HAS_BIAS", self.bias, "bias")?;
        check_flag(
            self.flags,
            KernelFlags::HAS_LHS_SUMS,
            "HAS_LHS_SUMS",
            self.lhs_sums,
            "lhs_sums",
        )?;
        check_flag(
            self.flags,
            KernelFlags::HAS_RHS_SUMS,
            "HAS_RHS_SUMS",
            self.rhs_sums,
            "rhs_sums",
        )?;

        if self.depth % KERNEL_8BIT_INNER != 0 {
            return Err(ParamsError::DepthNotAligned {
                depth: self.depth,
                unroll: KERNEL_8BIT_INNER,
            });
        }
        check_range("row", self.start_row, self.last_row, self.dst_rows)?;
        check_range("col", self.start_col, self.last_col, self.dst_cols)?;
        check_stride("lhs", self.lhs_stride, self.depth)?;
        check_stride("rhs", self.rhs_stride, self.depth)?;
        check_stride("dst", self.dst_stride, self.row_end() - self.start_row)?;

        let expected =
            self.lhs_zero_point as i64 * self.rhs_zero_point as i64 * self.depth as i64;
        // The kernels add it with wrapping i32 arithmetic.
        if expected as i32 != self.prod_zp_depth {
            return Err(ParamsError::ProdZpDepthMismatch {
                expected,
                actual: self.prod_zp_depth,
            });
        }

        if self.dst_type != DstType::Int32 {
            let (lo, hi) = self.dst_type.range();
            if self.clamp_min > self.clamp_max || self.clamp_min < lo || self.clamp_max > hi {
                return Err(ParamsError::ClampOutOfRange {
                    dst_type: self.dst_type,
                    min: self.clamp_min,
                    max: self.clamp_max,
                });
            }
        }
        Ok(())
    }
}

/// Descriptor for the float kernel. All strides are in `f32` elements.
#[derive(Debug, Clone, Copy)]
pub struct KernelParamsFloat {
    pub lhs_base: *const f32,
    pub rhs_base: *const f32,
    pub dst_base: *mut f32,
    pub dst_stride: usize,
    pub lhs_stride: usize,
    pub rhs_stride: usize,
    pub depth: usize,
    pub start_row: usize,
    pub last_row: usize,
    pub start_col: usize,
    pub last_col: usize,
    pub dst_rows: usize,
    pub dst_cols: usize,
    pub bias: *const f32,
    pub flags: KernelFlags,
    pub clamp_min: f32,
    pub clamp_max: f32,
}

impl Default for KernelParamsFloat {
    fn default() -> Self {
        Self {
            lhs_base: ptr::null(),
            rhs_base: ptr::null(),
            dst_base: ptr::null_mut(),
            dst_stride: 0,
            lhs_stride: 0,
            rhs_stride: 0,
            depth: 0,
            start_row: 0,
            last_row: 0,
            start_col: 0,
            last_col: 0,
            dst_rows: 0,
            dst_cols: 0,
            bias: ptr::null(),
            flags: KernelFlags::empty(),
            clamp_min: f32::NEG_INFINITY,
            clamp_max: f32::INFINITY,
        }
    }
}

impl KernelParamsFloat {
    /// Descriptor for the `rows × cols` sub-rectangle of a column-major
    /// output at `dst` with `dst_stride` elements between columns.
    ///
    /// No bias, no clamping; set `bias`, `flags` and the clamp bounds on the
    /// result as needed. See [`check_sub_range`] for the accepted ranges.
    pub fn for_packed(
        lhs: &PackedMatrix<f32>,
        rhs: &PackedMatrix<f32>,
        dst: *mut f32,
        dst_stride: usize,
        rows: Range<usize>,
        cols: Range<usize>,
    ) -> Result<Self, ParamsError> {
        debug_assert_eq!(lhs.depth, rhs.depth);
        check_sub_range("row", &rows, lhs.rows)?;
        check_sub_range("col", &cols, rhs.rows)?;

        Ok(Self {
            lhs_base: lhs.data.as_ptr().wrapping_add(rows.start * lhs.stride),
            rhs_base: rhs.data.as_ptr().wrapping_add(cols.start * rhs.stride),
            dst_base: dst.wrapping_add(cols.start * dst_stride + rows.start),
            dst_stride,
            lhs_stride: lhs.stride,
            rhs_stride: rhs.stride,
            depth: lhs.depth,
            start_row: rows.start,
            last_row: rows.start + (rows.len() - 1) / KERNEL_BLOCK * KERNEL_BLOCK,
            start_col: cols.start,
            last_col: cols.start + (cols.len() - 1) / KERNEL_BLOCK * KERNEL_BLOCK,
            dst_rows: lhs.rows,
            dst_cols: rhs.rows,
            ..Default::default()
        })
    }

    /// One past the last output row this invocation may write.
    pub fn row_end(&self) -> usize {
        self.dst_rows.min(self.last_row + KERNEL_BLOCK)
    }

    /// One past the last output column this invocation may write.
    pub fn col_end(&self) -> usize {
        self.dst_cols.min(self.last_col + KERNEL_BLOCK)
    }

    /// Checks every contract that can be checked without dereferencing.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.lhs_base.is_null() {
            return Err(ParamsError::NullPointer("lhs_base"));
        }
        if self.rhs_base.is_null() {
            return Err(ParamsError::NullPointer("rhs_base"));
        }
        if self.dst_base.is_null() {
            return Err(ParamsError::NullPointer("dst_base"));
        }
        check_flag(self.flags, KernelFlags::HAS_BIAS, "HAS_BIAS", self.bias, "bias")?;
        check_range("row", self.start_row, self.last_row, self.dst_rows)?;
        check_range("col", self.start_col, self.last_col, self.dst_cols)?;
        check_stride("lhs", self.lhs_stride, self.depth)?;
        check_stride("rhs", self.rhs_stride, self.depth)?;
        check_stride("dst", self.dst_stride, self.row_end() - self.start_row)?;
        Ok(())
    }
}

/// Checks a caller-requested sub-range of an axis with `extent` entries.
///
/// Kernels always run a tile to `min(extent, last + 8)`, so a range must
/// start on a tile boundary and end on one or at `extent`. Anything else
/// would write entries outside the range.
pub fn check_sub_range(
    axis: &'static str,
    range: &Range<usize>,
    extent: usize,
) -> Result<(), ParamsError> {
    let aligned_end = range.end % KERNEL_BLOCK == 0 || range.end == extent;
    if range.is_empty() || range.end > extent || range.start % KERNEL_BLOCK != 0 || !aligned_end {
        return Err(ParamsError::RangeNotTileAligned {
            axis,
            start: range.start,
            end: range.end,
            extent,
        });
    }
    Ok(())
}

fn check_flag<T>(
    flags: KernelFlags,
    flag: KernelFlags,
    flag_name: &'static str,
    data: *const T,
    field: &'static str,
) -> Result<(), ParamsError> {
    if flags.contains(flag) && data.is_null() {
        return Err(ParamsError::FlagWithoutData {
            flag: flag_name,
            field,
        });
    }
    Ok(())
}

fn check_range(axis: &'static str, start: usize, last: usize, extent: usize) -> Result<(), ParamsError> {
    if start > last || last >= extent || (last - start) % KERNEL_BLOCK != 0 {
        return Err(ParamsError::BadRange {
            axis,
            start,
            last,
            extent,
        });
    }
    Ok(())
}

fn check_stride(which: &'static str, stride: usize, min: usize) -> Result<(), ParamsError> {
    if stride < min {
        return Err(ParamsError::StrideTooSmall { which, stride, min });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_8bit(lhs: &[i8], rhs: &[i8], dst: &mut [i8], one: &i32) -> KernelParams8bit {
        KernelParams8bit {
            lhs_base: lhs.as_ptr(),
            rhs_base: rhs.as_ptr(),
            dst_base: dst.as_mut_ptr() as *mut u8,
            dst_stride: 8,
            dst_type: DstType::Int8,
            lhs_stride: 4,
            rhs_stride: 4,
            depth: 4,
            dst_rows: 8,
            dst_cols: 8,
            multiplier_fixedpoint: one,
            multiplier_exponent: one,
            clamp_min: -128,
            clamp_max: 127,
            ..Default::default()
        }
    }

    #[test]
    fn test_flags_combine() {
        let mut flags = KernelFlags::HAS_BIAS | KernelFlags::PER_CHANNEL;
        assert!(flags.contains(KernelFlags::HAS_BIAS));
        assert!(!flags.contains(KernelFlags::HAS_LHS_SUMS));
        flags.set(KernelFlags::HAS_BIAS, false);
        assert_eq!(flags, KernelFlags::PER_CHANNEL);
        flags |= KernelFlags::HAS_RHS_SUMS;
        assert_eq!(flags.bits(), 0b1100);
    }

    #[test]
    fn test_dst_type_ranges() {
        assert_eq!(DstType::Int8.range(), (-128, 127));
        assert_eq!(DstType::Uint8.range(), (0, 255));
        assert_eq!(DstType::Int16.size_of(), 2);
        assert_eq!(DstType::Int32.size_of(), 4);
    }

    #[test]
    fn test_validate_accepts_minimal_params() {
        let lhs = vec![0i8; 32];
        let rhs = vec![0i8; 32];
        let mut dst = vec![0i8; 64];
        let one = 1;
        let params = valid_8bit(&lhs, &rhs, &mut dst, &one);
        assert_eq!(params.validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_contract_violations() {
        let lhs = vec![0i8; 32];
        let rhs = vec![0i8; 32];
        let mut dst = vec![0i8; 64];
        let one = 1;
        let base = valid_8bit(&lhs, &rhs, &mut dst, &one);

        let p = KernelParams8bit { depth: 6, lhs_stride: 8, rhs_stride: 8, ..base };
        assert!(matches!(p.validate(), Err(ParamsError::DepthNotAligned { .. })));

        let p = KernelParams8bit { clamp_min: -200, ..base };
        assert!(matches!(p.validate(), Err(ParamsError::ClampOutOfRange { .. })));

        let p = KernelParams8bit { flags: KernelFlags::HAS_BIAS, ..base };
        assert!(matches!(p.validate(), Err(ParamsError::FlagWithoutData { .. })));

        let p = KernelParams8bit { last_row: 3, ..base };
        assert!(matches!(p.validate(), Err(ParamsError::BadRange { axis: "row", .. })));

        let p = KernelParams8bit { lhs_zero_point: 3, rhs_zero_point: 2, ..base };
        assert!(matches!(p.validate(), Err(ParamsError::ProdZpDepthMismatch { expected: 24, .. })));

        let p = KernelParams8bit { dst_stride: 5, ..base };
        assert!(matches!(p.validate(), Err(ParamsError::StrideTooSmall { which: "dst", .. })));
    }

    #[test]
    fn test_int32_destination_skips_clamp_check() {
        let lhs = vec![0i8; 32];
        let rhs = vec![0i8; 32];
        let mut dst = vec![0i32; 64];
        let params = KernelParams8bit {
            lhs_base: lhs.as_ptr(),
            rhs_base: rhs.as_ptr(),
            dst_base: dst.as_mut_ptr() as *mut u8,
            dst_stride: 8,
            lhs_stride: 4,
            rhs_stride: 4,
            depth: 4,
            dst_rows: 8,
            dst_cols: 8,
            ..Default::default()
        };
        assert_eq!(params.validate(), Ok(()));
    }

    #[test]
    fn test_sub_range_must_stay_on_tiles() {
        assert_eq!(check_sub_range("row", &(0..29), 29), Ok(()));
        assert_eq!(check_sub_range("row", &(8..16), 29), Ok(()));
        assert_eq!(check_sub_range("row", &(16..29), 29), Ok(()));
        for bad in [0..12, 12..29, 3..8, 8..8, 24..32] {
            assert!(
                matches!(
                    check_sub_range("row", &bad, 29),
                    Err(ParamsError::RangeNotTileAligned { axis: "row", .. })
                ),
                "{:?} accepted",
                bad
            );
        }
    }

    #[test]
    fn test_float_builder_rejects_partial_tile_end() {
        let lhs = crate::matrix::pack::pack_lhs_float(&[1.0; 29 * 3], 29, 3);
        let rhs = crate::matrix::pack::pack_rhs_float(&[1.0; 3 * 3], 3, 3);
        let mut dst = vec![-1.0f32; 29 * 3];
        let dst_ptr = dst.as_mut_ptr();

        let err = KernelParamsFloat::for_packed(&lhs, &rhs, dst_ptr, 29, 0..12, 0..3).unwrap_err();
        assert_eq!(
            err,
            ParamsError::RangeNotTileAligned {
                axis: "row",
                start: 0,
                end: 12,
                extent: 29
            }
        );
        assert!(KernelParamsFloat::for_packed(&lhs, &rhs, dst_ptr, 29, 0..16, 0..3).is_ok());
    }

    #[test]
    fn test_row_end_clips_to_matrix() {
        let params = KernelParamsFloat {
            start_row: 8,
            last_row: 16,
            dst_rows: 21,
            ..Default::default()
        };
        assert_eq!(params.row_end(), 21);
        let params = KernelParamsFloat { dst_rows: 40, ..params };
        assert_eq!(params.row_end(), 24);
    }
}
