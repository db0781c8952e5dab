//! Operand-side helpers around the kernels.
//!
//! These provide correctness baselines and the packing the kernels expect.
//! None of them run inside a kernel invocation.

pub mod naive;
pub mod pack;
pub mod transpose;
