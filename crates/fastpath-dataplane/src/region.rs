//! Slab Backing Memory
//!
//! One contiguous region holds every slot of a pool.
//!
//! # Design
//!
//! - Linux: anonymous `mmap`, optionally `MAP_HUGETLB` (2MB pages) with
//!   a fallback to regular pages when the hugetlb pool is empty
//! - Best-effort `mbind(MPOL_PREFERRED)` to the requested NUMA node
//! - Other platforms: cache-line aligned zeroed heap allocation
//!
//! Placement is a hint. `is_numa_bound()` reports whether the kernel
//! accepted the policy; pages still land wherever the kernel decides if
//! the preferred node runs out of memory.

use fastpath_common::{PoolError, PoolResult};
use std::ptr::NonNull;

/// Hugepage size used for `MAP_HUGETLB` rounding
pub const HUGEPAGE_SIZE: usize = 2 * 1024 * 1024;

/// Cache line size
pub const CACHE_LINE: usize = 64;

/// Page size assumed when pre-faulting
const PAGE_SIZE: usize = 4096;

/// Placement options for a region
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionOptions {
    /// Request hugepage backing
    pub use_hugepages: bool,
    /// Preferred NUMA node
    pub numa_node: Option<u32>,
}

enum Backing {
    #[cfg(target_os = "linux")]
    Mapped { mapped_len: usize },
    #[cfg_attr(target_os = "linux", allow(dead_code))]
    Heap(std::alloc::Layout),
}

/// Contiguous slab memory
pub struct SlabRegion {
    base: NonNull<u8>,
    len: usize,
    backing: Backing,
    hugepages: bool,
    numa_bound: bool,
}

// SAFETY: the region is plain memory; the pool serializes slot ownership
unsafe impl Send for SlabRegion {}
unsafe impl Sync for SlabRegion {}

impl SlabRegion {
    /// Reserve `len` bytes of zeroed memory
    pub fn new(len: usize, opts: RegionOptions) -> PoolResult<Self> {
        if len == 0 {
            return Err(PoolError::InvalidConfig("region length must be non-zero".into()));
        }

        let mut region = Self::allocate(len, opts.use_hugepages)?;

        if let Some(node) = opts.numa_node {
            region.numa_bound = region.bind(node);
        }

        Ok(region)
    }

    #[cfg(target_os = "linux")]
    fn allocate(len: usize, use_hugepages: bool) -> PoolResult<Self> {
        if use_hugepages {
            let huge_len = len.div_ceil(HUGEPAGE_SIZE) * HUGEPAGE_SIZE;
            match map_anonymous(huge_len, true) {
                Ok(base) => {
                    return Ok(Self {
                        base,
                        len,
                        backing: Backing::Mapped { mapped_len: huge_len },
                        hugepages: true,
                        numa_bound: false,
                    })
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        bytes = huge_len,
                        "hugepages unavailable, falling back to regular pages"
                    );
                }
            }
        }

        let base = map_anonymous(len, false)
            .map_err(|e| PoolError::Allocation(e.to_string()))?;

        Ok(Self {
            base,
            len,
            backing: Backing::Mapped { mapped_len: len },
            hugepages: false,
            numa_bound: false,
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn allocate(len: usize, use_hugepages: bool) -> PoolResult<Self> {
        if use_hugepages {
            tracing::warn!("hugepages not supported on this platform, using regular pages");
        }
        Self::allocate_heap(len)
    }

    #[cfg_attr(target_os = "linux", allow(dead_code))]
    fn allocate_heap(len: usize) -> PoolResult<Self> {
        let layout = std::alloc::Layout::from_size_align(len, CACHE_LINE)
            .map_err(|e| PoolError::InvalidConfig(e.to_string()))?;

        // SAFETY: layout has non-zero size (checked in new)
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        let base = NonNull::new(ptr)
            .ok_or_else(|| PoolError::Allocation(format!("heap allocation of {} bytes failed", len)))?;

        Ok(Self {
            base,
            len,
            backing: Backing::Heap(layout),
            hugepages: false,
            numa_bound: false,
        })
    }

    #[cfg(target_os = "linux")]
    fn bind(&self, node: u32) -> bool {
        let mapped_len = match self.backing {
            Backing::Mapped { mapped_len } => mapped_len,
            Backing::Heap(_) => return false,
        };

        match mbind_preferred(self.base, mapped_len, node) {
            Ok(()) => {
                tracing::debug!(node, bytes = mapped_len, "slab region bound to NUMA node");
                true
            }
            Err(e) => {
                tracing::warn!(node, error = %e, "NUMA binding failed, using default placement");
                false
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn bind(&self, node: u32) -> bool {
        tracing::debug!(node, "NUMA binding not supported on this platform");
        false
    }

    /// Base pointer
    #[inline(always)]
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Usable length in bytes
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; zero-length regions are rejected
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Backed by hugepages
    pub fn is_hugepage_backed(&self) -> bool {
        self.hugepages
    }

    /// Kernel accepted the NUMA placement policy
    pub fn is_numa_bound(&self) -> bool {
        self.numa_bound
    }

    /// Fault in every page of `offset..offset + len`
    ///
    /// # Safety
    ///
    /// The range must lie inside the region and no other reference to it
    /// may be live.
    pub unsafe fn prefault(&self, offset: usize, len: usize) {
        debug_assert!(offset + len <= self.len);
        let start = self.base.as_ptr().add(offset);
        let mut touched = 0;
        while touched < len {
            std::ptr::write_volatile(start.add(touched), 0);
            touched += PAGE_SIZE;
        }
        if len > 0 {
            std::ptr::write_volatile(start.add(len - 1), 0);
        }
    }
}

impl Drop for SlabRegion {
    fn drop(&mut self) {
        match self.backing {
            #[cfg(target_os = "linux")]
            Backing::Mapped { mapped_len } => {
                // SAFETY: base/mapped_len came from a successful mmap
                let rc = unsafe { libc::munmap(self.base.as_ptr().cast(), mapped_len) };
                if rc != 0 {
                    tracing::error!(error = %std::io::Error::last_os_error(), "munmap failed");
                }
            }
            Backing::Heap(layout) => {
                // SAFETY: allocated with this exact layout
                unsafe { std::alloc::dealloc(self.base.as_ptr(), layout) };
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn map_anonymous(len: usize, huge: bool) -> std::io::Result<NonNull<u8>> {
    let mut flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
    if huge {
        flags |= libc::MAP_HUGETLB;
    }

    // SAFETY: anonymous private mapping, no file descriptor involved
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            flags,
            -1,
            0,
        )
    };

    if ptr == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error());
    }
    NonNull::new(ptr.cast()).ok_or_else(|| std::io::Error::other("mmap returned null"))
}

#[cfg(target_os = "linux")]
fn mbind_preferred(base: NonNull<u8>, len: usize, node: u32) -> std::io::Result<()> {
    const MPOL_PREFERRED: libc::c_ulong = 1;

    if node >= libc::c_ulong::BITS {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "node id exceeds nodemask width",
        ));
    }

    let nodemask: libc::c_ulong = 1 << node;
    // maxnode counts bits plus one, matching libnuma
    let maxnode = libc::c_ulong::from(libc::c_ulong::BITS) + 1;

    // SAFETY: base/len describe a live mapping owned by the caller
    let rc = unsafe {
        libc::syscall(
            libc::SYS_mbind,
            base.as_ptr() as libc::c_ulong,
            len as libc::c_ulong,
            MPOL_PREFERRED,
            &nodemask as *const libc::c_ulong,
            maxnode,
            0 as libc::c_ulong,
        )
    };

    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}
