//! Fixed-Slot Memory Pool
//!
//! Slab allocator handing out fixed-size packet buffers by index.
//!
//! # Design
//!
//! - One contiguous [`SlabRegion`] carved into `num_slots` slots
//! - LIFO free-list of indices behind a single mutex; the critical
//!   section is a push/pop plus counter updates
//! - `acquire()` fails fast with `PoolExhausted`, never queues
//! - Slots are held either through a [`PoolSlot`] guard (released on
//!   drop) or detached to a bare index released via
//!   [`MemoryPool::release`]
//!
//! A slot owned by a live guard cannot be released by index, so two
//! callers can never see the same buffer.

use crate::numa;
use crate::region::{RegionOptions, SlabRegion};
use crate::stats::PoolStats;
use crate::telemetry;
use fastpath_common::{PoolError, PoolResult, Timestamp};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default slot size (fits a 1500 MTU frame plus headroom)
pub const DEFAULT_SLOT_SIZE: usize = 2048;

/// Default slot count
pub const DEFAULT_NUM_SLOTS: usize = 1024;

/// Minimum spacing between exhaustion warnings
const EXHAUSTED_WARN_INTERVAL_NS: u64 = 1_000_000_000;

/// Pool construction parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of slots
    pub num_slots: usize,
    /// Bytes per slot
    pub slot_size: usize,
    /// Preferred NUMA node for the backing memory
    pub numa_node: Option<u32>,
    /// Request hugepage backing
    pub use_hugepages: bool,
    /// Fault in all slot memory at construction
    pub preallocate: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_slots: DEFAULT_NUM_SLOTS,
            slot_size: DEFAULT_SLOT_SIZE,
            numa_node: None,
            use_hugepages: false,
            preallocate: true,
        }
    }
}

impl PoolConfig {
    /// Config with the given geometry and default placement
    pub fn new(num_slots: usize, slot_size: usize) -> Self {
        Self {
            num_slots,
            slot_size,
            ..Default::default()
        }
    }

    /// Set the NUMA node hint
    pub fn with_numa_node(mut self, node: Option<u32>) -> Self {
        self.numa_node = node;
        self
    }

    /// Enable or disable hugepages
    pub fn with_hugepages(mut self, enabled: bool) -> Self {
        self.use_hugepages = enabled;
        self
    }

    /// Enable or disable eager allocation
    pub fn with_preallocate(mut self, enabled: bool) -> Self {
        self.preallocate = enabled;
        self
    }

    /// Total bytes the pool will reserve
    pub fn total_memory(&self) -> Option<usize> {
        self.num_slots.checked_mul(self.slot_size)
    }

    /// Reject geometry the pool cannot represent
    pub fn validate(&self) -> PoolResult<()> {
        if self.num_slots == 0 {
            return Err(PoolError::InvalidConfig("num_slots must be > 0".into()));
        }
        if self.slot_size == 0 {
            return Err(PoolError::InvalidConfig("slot_size must be > 0".into()));
        }
        if u32::try_from(self.num_slots).is_err() {
            return Err(PoolError::InvalidConfig(format!(
                "num_slots {} exceeds {}",
                self.num_slots,
                u32::MAX
            )));
        }
        if self.total_memory().is_none() {
            return Err(PoolError::InvalidConfig("num_slots * slot_size overflows".into()));
        }
        Ok(())
    }
}

/// Ownership state of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    /// Owned by a live `PoolSlot`
    Guarded,
    /// Owned by whoever holds the bare index
    Detached,
}

/// Mutex-protected bookkeeping
struct FreeList {
    free: Vec<u32>,
    state: Vec<SlotState>,
    touched: Vec<bool>,
    total_allocs: u64,
    total_frees: u64,
    peak_usage: usize,
}

impl FreeList {
    fn new(num_slots: usize, touched: bool) -> Self {
        Self {
            // Reversed so the first acquire hands out slot 0
            free: (0..num_slots as u32).rev().collect(),
            state: vec![SlotState::Free; num_slots],
            touched: vec![touched; num_slots],
            total_allocs: 0,
            total_frees: 0,
            peak_usage: 0,
        }
    }

    #[inline]
    fn used(&self) -> usize {
        self.state.len() - self.free.len()
    }

    /// Pop a free index; returns it with a first-touch flag
    #[inline]
    fn pop(&mut self) -> Option<(usize, bool)> {
        let index = self.free.pop()? as usize;
        self.state[index] = SlotState::Guarded;
        self.total_allocs += 1;
        self.peak_usage = self.peak_usage.max(self.used());

        let first_touch = !self.touched[index];
        self.touched[index] = true;
        Some((index, first_touch))
    }

    #[inline]
    fn push(&mut self, index: usize, expected: SlotState) -> bool {
        match self.state.get(index) {
            Some(state) if *state == expected => {
                self.state[index] = SlotState::Free;
                self.free.push(index as u32);
                self.total_frees += 1;
                true
            }
            _ => false,
        }
    }
}

/// NUMA-aware fixed-slot memory pool
pub struct MemoryPool {
    region: SlabRegion,
    config: PoolConfig,
    inner: Mutex<FreeList>,
    available: Condvar,
    exhausted: AtomicU64,
    last_exhausted_warn: AtomicU64,
}

impl MemoryPool {
    /// Create a pool; platform capabilities that are missing degrade silently
    pub fn new(mut config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;
        let total = config.num_slots * config.slot_size;

        if let Some(node) = config.numa_node {
            let topology = numa::numa_info();
            if !topology.available || !topology.has_node(node) {
                tracing::info!(
                    node,
                    numa_available = topology.available,
                    "NUMA node not present, skipping memory binding"
                );
                config.numa_node = None;
            }
        }

        let region = SlabRegion::new(
            total,
            RegionOptions {
                use_hugepages: config.use_hugepages,
                numa_node: config.numa_node,
            },
        )?;

        if config.preallocate {
            // SAFETY: whole region, nothing handed out yet
            unsafe { region.prefault(0, total) };
        }

        tracing::info!(
            slots = config.num_slots,
            slot_size = config.slot_size,
            total_memory = total,
            hugepages = region.is_hugepage_backed(),
            numa_node = ?config.numa_node,
            numa_bound = region.is_numa_bound(),
            preallocate = config.preallocate,
            "memory pool ready"
        );

        Ok(Self {
            inner: Mutex::new(FreeList::new(config.num_slots, config.preallocate)),
            region,
            config,
            available: Condvar::new(),
            exhausted: AtomicU64::new(0),
            last_exhausted_warn: AtomicU64::new(0),
        })
    }

    /// Take a free slot, failing immediately when none is left
    #[inline]
    pub fn acquire(&self) -> PoolResult<PoolSlot<'_>> {
        let popped = self.inner.lock().pop();
        match popped {
            Some((index, first_touch)) => Ok(self.hand_out(index, first_touch)),
            None => {
                self.on_exhausted();
                Err(PoolError::PoolExhausted)
            }
        }
    }

    /// Take a free slot, waiting up to `timeout` for one to be released
    pub fn acquire_timeout(&self, timeout: Duration) -> PoolResult<PoolSlot<'_>> {
        let deadline = Instant::now() + timeout;
        let mut list = self.inner.lock();

        loop {
            if let Some((index, first_touch)) = list.pop() {
                drop(list);
                return Ok(self.hand_out(index, first_touch));
            }
            if self.available.wait_until(&mut list, deadline).timed_out() {
                if let Some((index, first_touch)) = list.pop() {
                    drop(list);
                    return Ok(self.hand_out(index, first_touch));
                }
                drop(list);
                self.on_exhausted();
                return Err(PoolError::Timeout);
            }
        }
    }

    /// Release a detached slot by index
    ///
    /// Fails with `InvalidSlot` when the index is out of range, free
    /// (double release), or still owned by a live guard.
    pub fn release(&self, index: usize) -> PoolResult<()> {
        self.release_slot(index, SlotState::Detached)
    }

    /// Consistent snapshot of occupancy and counters
    pub fn stats(&self) -> PoolStats {
        let list = self.inner.lock();
        PoolStats::new(
            self.config.num_slots,
            list.used(),
            self.config.slot_size,
            list.total_allocs,
            list.total_frees,
            list.peak_usage,
        )
    }

    /// Tear down the pool and unmap its memory
    ///
    /// Guards borrow the pool, so only detached slots can still be held
    /// here; they are reported as `SlotsOutstanding`.
    pub fn close(self) -> PoolResult<()> {
        let outstanding = self.inner.lock().used();
        let stats = self.stats();
        drop(self);

        if outstanding > 0 {
            tracing::warn!(outstanding, "memory pool closed with slots still held");
            return Err(PoolError::SlotsOutstanding(outstanding));
        }

        tracing::info!(
            total_allocs = stats.total_allocs,
            peak_usage = stats.peak_usage,
            "memory pool closed"
        );
        Ok(())
    }

    /// Number of slots
    pub fn num_slots(&self) -> usize {
        self.config.num_slots
    }

    /// Bytes per slot
    pub fn slot_size(&self) -> usize {
        self.config.slot_size
    }

    /// Effective configuration (NUMA hint cleared if the node is absent)
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Backed by hugepages
    pub fn is_hugepage_backed(&self) -> bool {
        self.region.is_hugepage_backed()
    }

    /// Backing memory carries a NUMA placement policy
    pub fn is_numa_bound(&self) -> bool {
        self.region.is_numa_bound()
    }

    /// Failed acquires since construction
    pub fn exhausted_count(&self) -> u64 {
        self.exhausted.load(Ordering::Relaxed)
    }

    #[inline(always)]
    fn slot_ptr(&self, index: usize) -> *mut u8 {
        debug_assert!(index < self.config.num_slots);
        // SAFETY: index < num_slots, region spans num_slots * slot_size
        unsafe { self.region.as_ptr().add(index * self.config.slot_size) }
    }

    #[inline]
    fn hand_out(&self, index: usize, first_touch: bool) -> PoolSlot<'_> {
        if first_touch {
            // SAFETY: slot is exclusively ours until released
            unsafe {
                self.region
                    .prefault(index * self.config.slot_size, self.config.slot_size)
            };
        }
        PoolSlot { pool: self, index }
    }

    fn release_slot(&self, index: usize, expected: SlotState) -> PoolResult<()> {
        let released = self.inner.lock().push(index, expected);
        if !released {
            telemetry::record_invalid_release();
            tracing::error!(slot = index, "invalid slot release");
            return Err(PoolError::InvalidSlot(index));
        }
        self.available.notify_one();
        Ok(())
    }

    fn detach(&self, index: usize) {
        let mut list = self.inner.lock();
        debug_assert_eq!(list.state[index], SlotState::Guarded);
        list.state[index] = SlotState::Detached;
    }

    fn on_exhausted(&self) {
        let count = self.exhausted.fetch_add(1, Ordering::Relaxed) + 1;
        telemetry::record_pool_exhausted();

        let now = Timestamp::now().as_nanos().max(1);
        let last = self.last_exhausted_warn.load(Ordering::Relaxed);
        if (last == 0 || now.saturating_sub(last) >= EXHAUSTED_WARN_INTERVAL_NS)
            && self
                .last_exhausted_warn
                .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            tracing::warn!(
                total_slots = self.config.num_slots,
                exhausted = count,
                "memory pool exhausted"
            );
        }
    }
}

/// A held slot; released when dropped
pub struct PoolSlot<'a> {
    pool: &'a MemoryPool,
    index: usize,
}

impl<'a> PoolSlot<'a> {
    /// Slot index within the pool
    #[inline(always)]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Return the slot to the pool
    pub fn release(self) -> PoolResult<()> {
        let this = ManuallyDrop::new(self);
        this.pool.release_slot(this.index, SlotState::Guarded)
    }

    /// Give up buffer access and keep the slot held by index
    ///
    /// The index must later be passed to [`MemoryPool::release`].
    pub fn into_index(self) -> usize {
        let this = ManuallyDrop::new(self);
        this.pool.detach(this.index);
        this.index
    }
}

impl Deref for PoolSlot<'_> {
    type Target = [u8];

    #[inline(always)]
    fn deref(&self) -> &[u8] {
        // SAFETY: Guarded state gives this guard exclusive access to the slot
        unsafe { std::slice::from_raw_parts(self.pool.slot_ptr(self.index), self.pool.slot_size()) }
    }
}

impl DerefMut for PoolSlot<'_> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self prevents aliasing through the guard
        unsafe {
            std::slice::from_raw_parts_mut(self.pool.slot_ptr(self.index), self.pool.slot_size())
        }
    }
}

impl Drop for PoolSlot<'_> {
    fn drop(&mut self) {
        // Cannot fail: only this guard can move the slot out of Guarded
        let _ = self.pool.release_slot(self.index, SlotState::Guarded);
    }
}

impl std::fmt::Debug for PoolSlot<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolSlot")
            .field("index", &self.index)
            .field("len", &self.pool.slot_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    fn pool(slots: usize) -> MemoryPool {
        MemoryPool::new(PoolConfig::new(slots, 256)).unwrap()
    }

    #[test]
    fn test_acquire_exhaust_release() {
        let pool = pool(8);

        let slots: Vec<_> = (0..8).map(|_| pool.acquire().unwrap()).collect();
        let indices: HashSet<_> = slots.iter().map(|s| s.index()).collect();
        assert_eq!(indices.len(), 8);

        assert!(matches!(pool.acquire(), Err(PoolError::PoolExhausted)));
        assert_eq!(pool.exhausted_count(), 1);

        let mut slots = slots;
        slots.pop().unwrap().release().unwrap();

        let again = pool.acquire().unwrap();
        assert!(matches!(pool.acquire(), Err(PoolError::PoolExhausted)));
        drop(again);
    }

    #[test]
    fn test_first_acquire_is_slot_zero() {
        let pool = pool(4);
        assert_eq!(pool.acquire().unwrap().index(), 0);
    }

    #[test]
    fn test_stats_balance() {
        let pool = pool(16);
        {
            let _a = pool.acquire().unwrap();
            let _b = pool.acquire().unwrap();
            let _c = pool.acquire().unwrap();

            let stats = pool.stats();
            assert_eq!(stats.used_slots, 3);
            assert_eq!(stats.free_slots, 13);
            assert_eq!(stats.total_slots, stats.used_slots + stats.free_slots);
        }

        let stats = pool.stats();
        assert_eq!(stats.used_slots, 0);
        assert_eq!(stats.free_slots, 16);
        assert_eq!(stats.total_allocs, 3);
        assert_eq!(stats.total_frees, 3);
        assert_eq!(stats.peak_usage, 3);
        assert_eq!(stats.total_memory, 16 * 256);
    }

    #[test]
    fn test_double_release_detected() {
        let pool = pool(4);
        let index = pool.acquire().unwrap().into_index();

        pool.release(index).unwrap();
        let before = pool.stats();

        assert!(matches!(pool.release(index), Err(PoolError::InvalidSlot(i)) if i == index));

        let after = pool.stats();
        assert_eq!(before.used_slots, after.used_slots);
        assert_eq!(before.free_slots, after.free_slots);
        assert_eq!(before.total_frees, after.total_frees);
    }

    #[test]
    fn test_release_out_of_range() {
        let pool = pool(4);
        assert!(matches!(pool.release(4), Err(PoolError::InvalidSlot(4))));
        assert!(matches!(pool.release(usize::MAX), Err(PoolError::InvalidSlot(_))));
    }

    #[test]
    fn test_guarded_slot_not_releasable_by_index() {
        let pool = pool(4);
        let slot = pool.acquire().unwrap();

        assert!(matches!(pool.release(slot.index()), Err(PoolError::InvalidSlot(_))));
        assert_eq!(pool.stats().used_slots, 1);

        slot.release().unwrap();
        assert_eq!(pool.stats().used_slots, 0);
    }

    #[test]
    fn test_slot_buffer_roundtrip() {
        let pool = pool(2);
        let mut slot = pool.acquire().unwrap();
        assert_eq!(slot.len(), 256);

        slot[..4].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        let index = slot.index();
        slot.release().unwrap();

        // LIFO free-list returns the same slot with its bytes intact
        let slot = pool.acquire().unwrap();
        assert_eq!(slot.index(), index);
        assert_eq!(&slot[..4], &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_lazy_pool() {
        let pool = MemoryPool::new(PoolConfig::new(4, 8192).with_preallocate(false)).unwrap();
        let slot = pool.acquire().unwrap();
        assert!(slot.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_first_touch_tracking() {
        let mut lazy = FreeList::new(4, false);
        for expected in 0..4 {
            assert_eq!(lazy.pop(), Some((expected, true)));
        }
        assert_eq!(lazy.pop(), None);

        for index in 0..4 {
            assert!(lazy.push(index, SlotState::Guarded));
        }
        let mut reused = HashSet::new();
        while let Some((index, first_touch)) = lazy.pop() {
            assert!(!first_touch, "slot {index} faulted twice");
            reused.insert(index);
        }
        assert_eq!(reused.len(), 4);

        let mut eager = FreeList::new(4, true);
        while let Some((_, first_touch)) = eager.pop() {
            assert!(!first_touch);
        }
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            MemoryPool::new(PoolConfig::new(0, 2048)),
            Err(PoolError::InvalidConfig(_))
        ));
        assert!(matches!(
            MemoryPool::new(PoolConfig::new(16, 0)),
            Err(PoolError::InvalidConfig(_))
        ));
        assert!(PoolConfig::new(usize::MAX / 2, 4).validate().is_err());
    }

    #[test]
    fn test_degraded_placement() {
        let config = PoolConfig::new(8, 1024)
            .with_hugepages(true)
            .with_numa_node(Some(999));
        let pool = MemoryPool::new(config).unwrap();
        assert!(!pool.is_numa_bound());
        assert_eq!(pool.config().numa_node, None);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn test_close() {
        let pool = pool(4);
        let _ = pool.acquire().unwrap();
        pool.close().unwrap();

        let pool = self::pool(4);
        let _leaked = pool.acquire().unwrap().into_index();
        assert!(matches!(pool.close(), Err(PoolError::SlotsOutstanding(1))));
    }

    #[test]
    fn test_acquire_timeout() {
        let pool = pool(1);
        let held = pool.acquire().unwrap();

        let start = Instant::now();
        assert!(matches!(
            pool.acquire_timeout(Duration::from_millis(20)),
            Err(PoolError::Timeout)
        ));
        assert!(start.elapsed() >= Duration::from_millis(20));

        crossbeam::thread::scope(|s| {
            s.spawn(|_| {
                std::thread::sleep(Duration::from_millis(10));
                drop(held);
            });
            let slot = pool.acquire_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(slot.index(), 0);
        })
        .unwrap();
    }

    #[test]
    fn test_concurrent_acquire_release() {
        const THREADS: usize = 8;
        const ITERATIONS: usize = 1000;
        const SLOTS: usize = 4;

        let pool = pool(SLOTS);
        let held = Mutex::new(HashSet::new());
        let max_seen = AtomicUsize::new(0);

        crossbeam::thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|_| {
                    for _ in 0..ITERATIONS {
                        let slot = match pool.acquire() {
                            Ok(slot) => slot,
                            Err(PoolError::PoolExhausted) => continue,
                            Err(e) => panic!("unexpected error: {}", e),
                        };

                        assert!(held.lock().insert(slot.index()), "slot handed out twice");

                        let used = pool.stats().used_slots;
                        assert!(used <= SLOTS);
                        max_seen.fetch_max(used, Ordering::Relaxed);

                        assert!(held.lock().remove(&slot.index()));
                        slot.release().unwrap();
                    }
                });
            }
        })
        .unwrap();

        let stats = pool.stats();
        assert_eq!(stats.used_slots, 0);
        assert_eq!(stats.free_slots, SLOTS);
        assert_eq!(stats.total_allocs, stats.total_frees);
        assert!(stats.peak_usage <= SLOTS);
        assert!(max_seen.load(Ordering::Relaxed) >= 1);
    }
}
