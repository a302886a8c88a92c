//! Fastpath XDP Layer
//!
//! Capability reporting and process setup for kernel-bypass networking.
//!
//! Nothing here gates correctness: an unsupported kernel, a missing
//! `bpffs` or a refused `RLIMIT_MEMLOCK` raise leave the service on the
//! software path and are only reported.

pub mod capability;
pub mod config;
pub mod rlimit;

pub use capability::{is_xdp_supported, KernelVersion, XdpCapability};
pub use config::{XdpConfig, XdpMode, XdpStatus};
pub use rlimit::{current_memlock_limit, set_rlimit_memlock, MemlockLimit};

use fastpath_common::FastpathError;
use thiserror::Error;

/// XDP layer errors
#[derive(Error, Debug)]
pub enum XdpError {
    #[error("failed to raise RLIMIT_MEMLOCK: {0}")]
    Rlimit(#[source] std::io::Error),

    #[error("unknown XDP mode: {0:?} (expected native, generic or offload)")]
    UnknownMode(String),

    #[error("XDP is not supported on this platform")]
    Unsupported,
}

impl From<XdpError> for FastpathError {
    fn from(e: XdpError) -> Self {
        FastpathError::Xdp(e.to_string())
    }
}

/// Result type for XDP operations
pub type XdpResult<T> = std::result::Result<T, XdpError>;
