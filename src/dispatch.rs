//! One-time selection of the kernel implementation.
//!
//! The kernels never check CPU features. This module does it once per
//! process, picks a matching pair of function pointers and hands them out.
//! `QMATMUL_KERNEL_PATH=avx2|scalar` overrides detection; a value the CPU
//! cannot run, or one that does not parse, is logged and ignored.

use crate::error::DispatchError;
use crate::kernels;
use crate::params::{KernelParams8bit, KernelParamsFloat};
use log::{debug, info, warn};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Environment variable that forces a kernel path.
pub const ENV_VAR: &str = "QMATMUL_KERNEL_PATH";

pub type Kernel8bitFn = unsafe fn(&KernelParams8bit);
pub type KernelFloatFn = unsafe fn(&KernelParamsFloat);

/// Instruction set a kernel pair is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelPath {
    Scalar,
    Avx2,
}

impl KernelPath {
    /// Whether the running CPU can execute this path.
    pub fn is_supported(self) -> bool {
        match self {
            KernelPath::Scalar => true,
            #[cfg(target_arch = "x86_64")]
            KernelPath::Avx2 => is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma"),
            #[cfg(not(target_arch = "x86_64"))]
            KernelPath::Avx2 => false,
        }
    }

    /// Fastest path the running CPU supports.
    pub fn detect() -> Self {
        if KernelPath::Avx2.is_supported() {
            KernelPath::Avx2
        } else {
            KernelPath::Scalar
        }
    }
}

impl fmt::Display for KernelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelPath::Scalar => write!(f, "scalar"),
            KernelPath::Avx2 => write!(f, "avx2"),
        }
    }
}

impl FromStr for KernelPath {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scalar" => Ok(KernelPath::Scalar),
            "avx2" => Ok(KernelPath::Avx2),
            _ => Err(DispatchError::UnknownPath(s.to_string())),
        }
    }
}

/// A matched pair of kernels for one path.
#[derive(Clone, Copy)]
pub struct Kernels {
    pub path: KernelPath,
    pub kernel_8bit: Kernel8bitFn,
    pub kernel_float: KernelFloatFn,
}

impl Kernels {
    /// The kernels for `path`, or an error if this CPU cannot run them.
    pub fn for_path(path: KernelPath) -> Result<Self, DispatchError> {
        if !path.is_supported() {
            return Err(DispatchError::Unsupported(path));
        }
        Ok(match path {
            KernelPath::Scalar => Self {
                path,
                kernel_8bit: kernels::kernel_8bit_scalar,
                kernel_float: kernels::kernel_float_scalar,
            },
            #[cfg(target_arch = "x86_64")]
            KernelPath::Avx2 => Self {
                path,
                kernel_8bit: kernels::kernel_8bit_avx2,
                kernel_float: kernels::kernel_float_avx2,
            },
            #[cfg(not(target_arch = "x86_64"))]
            KernelPath::Avx2 => return Err(DispatchError::Unsupported(path)),
        })
    }

    /// The fastest kernels this CPU supports.
    pub fn detect() -> Self {
        let path = KernelPath::detect();
        match Self::for_path(path) {
            Ok(kernels) => kernels,
            Err(_) => Self::scalar(),
        }
    }

    fn scalar() -> Self {
        Self {
            path: KernelPath::Scalar,
            kernel_8bit: kernels::kernel_8bit_scalar,
            kernel_float: kernels::kernel_float_scalar,
        }
    }

    /// Selection honoring an override string such as the env var value.
    fn select(requested: Option<&str>) -> Self {
        let Some(requested) = requested else {
            return Self::detect();
        };
        match requested.parse::<KernelPath>().and_then(Self::for_path) {
            Ok(kernels) => {
                debug!("{}={} honored", ENV_VAR, requested);
                kernels
            }
            Err(err) => {
                warn!("{}: {}, falling back to detection", ENV_VAR, err);
                Self::detect()
            }
        }
    }
}

impl fmt::Debug for Kernels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernels").field("path", &self.path).finish_non_exhaustive()
    }
}

/// Process-wide kernel selection, made on first use.
pub fn kernels() -> &'static Kernels {
    static KERNELS: OnceLock<Kernels> = OnceLock::new();
    KERNELS.get_or_init(|| {
        let requested = std::env::var(ENV_VAR).ok();
        let kernels = Kernels::select(requested.as_deref());
        info!("using {} kernels", kernels.path);
        kernels
    })
}
