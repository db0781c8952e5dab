//! Quantization arithmetic shared by the integer kernels and their callers.
//!
//! - `multiplier`: fixed-point rescaling with round-half-away-from-zero
//! - `zero_point`: zero-point correction of raw dot products
//! - `spec`: owned description of a quantized GEMM, builds kernel descriptors

pub mod multiplier;
pub mod spec;
pub mod zero_point;

pub use multiplier::{multiply_by_quantized_multiplier, quantize_multiplier, rescale_reference};
pub use spec::{Multiplier, QuantSpec};
