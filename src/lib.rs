//! 8×8 GEMM micro-kernels for quantized and float matrix multiplication.
//!
//! The integer kernel multiplies packed int8 operands into i32 accumulators,
//! corrects for zero points, rescales with a fixed-point multiplier and
//! stores i8, u8, i16 or raw i32 results. The float kernel does the same
//! tiling with FMA, a bias and a clamp. Both come as AVX2 intrinsics and as
//! a portable scalar twin with identical results; the right pair is picked
//! once per process.
//!
//! ## Usage
//!
//! ```
//! use qmatmul::matrix::pack::{pack_lhs_8bit, pack_rhs_8bit};
//! use qmatmul::{DstType, QuantSpec, kernel_8bit};
//!
//! let (rows, cols, depth) = (3, 2, 4);
//! let lhs = vec![1i8; rows * depth];
//! let rhs = vec![2i8; depth * cols];
//! let lhs_pack = pack_lhs_8bit(&lhs, rows, depth, 0);
//! let rhs_pack = pack_rhs_8bit(&rhs, depth, cols, 0);
//!
//! let spec = QuantSpec::new(DstType::Int32);
//! let mut dst = vec![0i32; rows * cols];
//! let params = spec.kernel_params(&lhs_pack, &rhs_pack, dst.as_mut_ptr() as *mut u8, rows);
//! assert_eq!(params.validate(), Ok(()));
//!
//! // SAFETY: params were just validated and all buffers outlive the call.
//! unsafe { kernel_8bit(&params) };
//! assert_eq!(dst, vec![8; rows * cols]);
//! ```
//!
//! ## What's inside
//!
//! - `kernels`: the AVX2 and scalar 8×8 kernels
//! - `params`: per-invocation descriptors and their validation
//! - `quant`: fixed-point rescaling, zero-point correction, [`QuantSpec`]
//! - `matrix`: packing into the kernels' layouts and naive references
//! - `dispatch`: one-time kernel selection

pub mod dispatch;
pub mod error;
pub mod kernels;
pub mod matrix;
pub mod params;
pub mod quant;

pub use dispatch::{KernelPath, Kernels};
pub use error::{DispatchError, ParamsError};
pub use params::{DstType, KernelFlags, KernelParams8bit, KernelParamsFloat};
pub use quant::{Multiplier, QuantSpec};

/// Quantized 8×8 kernel on the fastest path this CPU supports.
///
/// # Safety
///
/// `params` must satisfy [`KernelParams8bit::validate`], and every buffer it
/// points into must be live and cover the tiles in range. No other thread may
/// write the destination tiles during the call.
pub unsafe fn kernel_8bit(params: &KernelParams8bit) {
    // SAFETY: the dispatcher only hands out kernels the CPU supports.
    unsafe { (dispatch::kernels().kernel_8bit)(params) }
}

/// Float 8×8 kernel on the fastest path this CPU supports.
///
/// # Safety
///
/// Same contract as [`kernel_8bit`] with [`KernelParamsFloat::validate`].
pub unsafe fn kernel_float(params: &KernelParamsFloat) {
    // SAFETY: the dispatcher only hands out kernels the CPU supports.
    unsafe { (dispatch::kernels().kernel_float)(params) }
}
