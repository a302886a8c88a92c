//! Locked-memory limit
//!
//! AF_XDP UMEM and BPF maps are charged against `RLIMIT_MEMLOCK`, whose
//! default (often 64 KiB or 8 MiB) is far too small.

use crate::{XdpError, XdpResult};
use serde::Serialize;

/// `RLIMIT_MEMLOCK` in bytes; `None` means unlimited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemlockLimit {
    pub soft: Option<u64>,
    pub hard: Option<u64>,
}

impl MemlockLimit {
    pub fn is_unlimited(&self) -> bool {
        self.soft.is_none()
    }
}

/// Raise `RLIMIT_MEMLOCK` as far as the process is allowed
///
/// Tries unlimited first, then lifts the soft limit to the hard limit.
/// Returns the limit now in force.
#[cfg(target_os = "linux")]
pub fn set_rlimit_memlock() -> XdpResult<MemlockLimit> {
    let unlimited = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    // SAFETY: valid pointer to an initialised rlimit
    if unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &unlimited) } == 0 {
        tracing::debug!("RLIMIT_MEMLOCK raised to unlimited");
        return current_memlock_limit();
    }

    let mut current = read_rlimit()?;
    if current.rlim_cur != current.rlim_max {
        current.rlim_cur = current.rlim_max;
        // SAFETY: as above
        if unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &current) } != 0 {
            return Err(XdpError::Rlimit(std::io::Error::last_os_error()));
        }
        tracing::debug!(limit = current.rlim_max, "RLIMIT_MEMLOCK soft limit raised to hard limit");
    }

    current_memlock_limit()
}

#[cfg(not(target_os = "linux"))]
pub fn set_rlimit_memlock() -> XdpResult<MemlockLimit> {
    Err(XdpError::Unsupported)
}

/// Current `RLIMIT_MEMLOCK`
#[cfg(target_os = "linux")]
pub fn current_memlock_limit() -> XdpResult<MemlockLimit> {
    let limit = read_rlimit()?;
    Ok(MemlockLimit {
        soft: finite(limit.rlim_cur),
        hard: finite(limit.rlim_max),
    })
}

#[cfg(not(target_os = "linux"))]
pub fn current_memlock_limit() -> XdpResult<MemlockLimit> {
    Err(XdpError::Unsupported)
}

#[cfg(target_os = "linux")]
fn read_rlimit() -> XdpResult<libc::rlimit> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: valid pointer to writable rlimit
    if unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, &mut limit) } != 0 {
        return Err(XdpError::Rlimit(std::io::Error::last_os_error()));
    }
    Ok(limit)
}

#[cfg(target_os = "linux")]
fn finite(value: libc::rlim_t) -> Option<u64> {
    if value == libc::RLIM_INFINITY {
        None
    } else {
        Some(value as u64)
    }
}
