//! Data Plane Statistics
//!
//! Pool occupancy snapshots and lock-free forward-path counters.

use fastpath_common::AtomicCounter;
use serde::Serialize;

/// Consistent snapshot of a memory pool
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PoolStats {
    pub total_slots: usize,
    pub used_slots: usize,
    pub free_slots: usize,
    pub slot_size: usize,
    /// `total_slots * slot_size`
    pub total_memory: usize,
    pub total_allocs: u64,
    pub total_frees: u64,
    /// Highest `used_slots` ever observed
    pub peak_usage: usize,
    /// `used_slots / total_slots`
    pub utilization: f64,
}

impl PoolStats {
    /// Build a snapshot from raw counters
    pub fn new(
        total_slots: usize,
        used_slots: usize,
        slot_size: usize,
        total_allocs: u64,
        total_frees: u64,
        peak_usage: usize,
    ) -> Self {
        let utilization = if total_slots == 0 {
            0.0
        } else {
            used_slots as f64 / total_slots as f64
        };

        Self {
            total_slots,
            used_slots,
            free_slots: total_slots - used_slots,
            slot_size,
            total_memory: total_slots * slot_size,
            total_allocs,
            total_frees,
            peak_usage,
            utilization,
        }
    }
}

/// Forward-path counters (cache-line aligned)
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct PathStats {
    pub processed: AtomicCounter,
    pub completed: AtomicCounter,
    pub dropped: AtomicCounter,
    pub bytes: AtomicCounter,
    pub rejected: AtomicCounter,
}

impl PathStats {
    #[inline(always)]
    pub fn record_completed(&self, bytes: u64) {
        self.processed.inc();
        self.completed.inc();
        self.bytes.add(bytes);
    }

    #[inline(always)]
    pub fn record_drop(&self) {
        self.processed.inc();
        self.dropped.inc();
    }

    /// Packet never entered the pipeline (no slot, oversized frame)
    #[inline(always)]
    pub fn record_rejected(&self) {
        self.rejected.inc();
    }

    pub fn snapshot(&self) -> PathStatsSnapshot {
        PathStatsSnapshot {
            processed: self.processed.get(),
            completed: self.completed.get(),
            dropped: self.dropped.get(),
            bytes: self.bytes.get(),
            rejected: self.rejected.get(),
        }
    }
}

/// Stats snapshot (non-atomic)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PathStatsSnapshot {
    pub processed: u64,
    pub completed: u64,
    pub dropped: u64,
    pub bytes: u64,
    pub rejected: u64,
}

impl PathStatsSnapshot {
    pub fn drop_rate(&self) -> f64 {
        if self.processed == 0 {
            return 0.0;
        }
        self.dropped as f64 / self.processed as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_stats() {
        let stats = PoolStats::new(64, 16, 2048, 100, 84, 20);
        assert_eq!(stats.free_slots, 48);
        assert_eq!(stats.total_memory, 64 * 2048);
        assert!((stats.utilization - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pool_stats_json_shape() {
        let json = serde_json::to_value(PoolStats::new(4, 1, 512, 3, 2, 2)).unwrap();
        for key in [
            "total_slots",
            "used_slots",
            "free_slots",
            "slot_size",
            "total_memory",
            "total_allocs",
            "total_frees",
            "peak_usage",
            "utilization",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["utilization"], 0.25);
    }

    #[test]
    fn test_path_stats() {
        let stats = PathStats::default();
        stats.record_completed(1500);
        stats.record_drop();
        stats.record_rejected();

        let snap = stats.snapshot();
        assert_eq!(snap.processed, 2);
        assert_eq!(snap.completed, 1);
        assert_eq!(snap.bytes, 1500);
        assert_eq!(snap.rejected, 1);
        assert!((snap.drop_rate() - 0.5).abs() < f64::EPSILON);
    }
}
