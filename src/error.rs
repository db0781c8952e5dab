//! Error types for the code around the kernels.
//!
//! The kernels themselves never fail: everything they need is a caller
//! precondition. These errors come from parameter validation and from
//! kernel selection, both of which run outside the hot path.

use crate::dispatch::KernelPath;
use crate::params::DstType;
use thiserror::Error;

/// A kernel parameter descriptor that breaks one of the kernel's contracts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamsError {
    #[error("{0} pointer is null")]
    NullPointer(&'static str),

    #[error("{flag} flag is set but the {field} pointer is null")]
    FlagWithoutData {
        flag: &'static str,
        field: &'static str,
    },

    #[error("depth {depth} is not a multiple of {unroll}")]
    DepthNotAligned { depth: usize, unroll: usize },

    #[error("{axis} range {start}..={last} is invalid for an extent of {extent}")]
    BadRange {
        axis: &'static str,
        start: usize,
        last: usize,
        extent: usize,
    },

    #[error("{axis} range {start}..{end} is not tile aligned within an extent of {extent}")]
    RangeNotTileAligned {
        axis: &'static str,
        start: usize,
        end: usize,
        extent: usize,
    },

    #[error("{which} stride {stride} is smaller than {min}")]
    StrideTooSmall {
        which: &'static str,
        stride: usize,
        min: usize,
    },

    #[error("clamp range [{min}, {max}] does not fit {dst_type:?}")]
    ClampOutOfRange { dst_type: DstType, min: i32, max: i32 },

    #[error("multiplier exponent {0} is outside [-32, 31]")]
    ExponentOutOfRange(i32),

    #[error("fixed-point multiplier {0} is negative")]
    NegativeMultiplier(i32),

    #[error("{what} has {actual} values, need at least {expected}")]
    TooFewValues {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("prod_zp_depth {actual} does not match lhs_zp * rhs_zp * depth = {expected}")]
    ProdZpDepthMismatch { expected: i64, actual: i32 },
}

/// Failure to pick a kernel implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("kernel path {0} is not supported on this CPU")]
    Unsupported(KernelPath),

    #[error("unknown kernel path {0:?} (expected \"avx2\" or \"scalar\")")]
    UnknownPath(String),
}
