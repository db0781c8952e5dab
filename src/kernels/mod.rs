//! 8×8 GEMM microkernels.
//!
//! Each kernel walks the 8×8 output tiles described by a parameter
//! descriptor, accumulates packed LHS × packed RHS for every tile and writes
//! the tile to a column-major destination, masking rows and columns past the
//! matrix edge.
//!
//! Available kernels:
//! - `kernel_8bit_avx2`: int8 operands, i32 accumulators, zero-point
//!   correction, fixed-point requantization, i8/u8/i16/i32 output (AVX2)
//! - `kernel_float_avx2`: f32 with bias and clamp (AVX2 + FMA)
//! - `kernel_scalar`: portable twins of both, bit-identical
//!
//! Callers normally go through [`crate::dispatch`] rather than naming one.

#[cfg(target_arch = "x86_64")]
pub mod kernel_8bit_avx2;
#[cfg(target_arch = "x86_64")]
pub mod kernel_float_avx2;
pub mod kernel_scalar;
#[cfg(target_arch = "x86_64")]
mod lanes;
#[cfg(target_arch = "x86_64")]
mod requant_avx2;

#[cfg(target_arch = "x86_64")]
pub use kernel_8bit_avx2::kernel_8bit_avx2;
#[cfg(target_arch = "x86_64")]
pub use kernel_float_avx2::kernel_float_avx2;
pub use kernel_scalar::{kernel_8bit_scalar, kernel_float_scalar};
