//! Lock-free latency tracking for per-packet timing

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Upper bound (µs) of each histogram bucket; the last bucket is open-ended
const BUCKET_LIMITS_US: [u64; 8] = [1, 5, 10, 50, 100, 500, 1000, 10000];

/// Lock-free histogram for latency tracking
#[derive(Debug)]
pub struct LatencyHistogram {
    /// Buckets: 0-1μs, 1-5μs, 5-10μs, 10-50μs, 50-100μs, 100-500μs, 500μs-1ms, >1ms
    buckets: [AtomicU64; 8],
    count: AtomicU64,
    sum_us: AtomicU64,
    min_us: AtomicU64,
    max_us: AtomicU64,
}

impl LatencyHistogram {
    /// Create new histogram
    pub const fn new() -> Self {
        Self {
            buckets: [
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
            ],
            count: AtomicU64::new(0),
            sum_us: AtomicU64::new(0),
            min_us: AtomicU64::new(u64::MAX),
            max_us: AtomicU64::new(0),
        }
    }

    /// Record a latency value in microseconds
    #[inline(always)]
    pub fn record(&self, latency_us: u64) {
        let bucket = match latency_us {
            0..=1 => 0,
            2..=5 => 1,
            6..=10 => 2,
            11..=50 => 3,
            51..=100 => 4,
            101..=500 => 5,
            501..=1000 => 6,
            _ => 7,
        };

        self.buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.min_us.fetch_min(latency_us, Ordering::Relaxed);
        self.max_us.fetch_max(latency_us, Ordering::Relaxed);
    }

    /// Number of recorded samples
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Get average latency in microseconds
    pub fn average(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        self.sum_us.load(Ordering::Relaxed) as f64 / count as f64
    }

    /// Get percentile (approximate, bucket upper bound)
    pub fn percentile(&self, p: f64) -> u64 {
        let count = self.count();
        if count == 0 {
            return 0;
        }
        let target = ((count as f64) * p).ceil() as u64;
        let mut cumulative = 0u64;

        for (i, bucket) in self.buckets.iter().enumerate() {
            cumulative += bucket.load(Ordering::Relaxed);
            if cumulative >= target {
                return BUCKET_LIMITS_US[i];
            }
        }

        BUCKET_LIMITS_US[7]
    }

    /// Get P99 latency
    pub fn p99(&self) -> u64 {
        self.percentile(0.99)
    }

    /// Get snapshot
    pub fn snapshot(&self) -> HistogramSnapshot {
        let count = self.count();
        HistogramSnapshot {
            count,
            sum_us: self.sum_us.load(Ordering::Relaxed),
            min_us: if count == 0 { 0 } else { self.min_us.load(Ordering::Relaxed) },
            max_us: self.max_us.load(Ordering::Relaxed),
            p50: self.percentile(0.50),
            p90: self.percentile(0.90),
            p99: self.percentile(0.99),
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Histogram snapshot
#[derive(Debug, Clone, Default, Serialize)]
pub struct HistogramSnapshot {
    /// Samples recorded
    pub count: u64,
    /// Sum of all samples in microseconds
    pub sum_us: u64,
    /// Smallest sample; 0 when empty
    pub min_us: u64,
    /// Largest sample
    pub max_us: u64,
    /// Median, as a bucket upper bound
    pub p50: u64,
    /// 90th percentile, as a bucket upper bound
    pub p90: u64,
    /// 99th percentile, as a bucket upper bound
    pub p99: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram() {
        let h = LatencyHistogram::new();

        h.record(1);
        h.record(5);
        h.record(10);
        h.record(50);
        h.record(100);

        assert_eq!(h.count(), 5);
        assert!(h.average() > 0.0);

        let snap = h.snapshot();
        assert_eq!(snap.min_us, 1);
        assert_eq!(snap.max_us, 100);
        assert_eq!(snap.p99, 100);
    }

    #[test]
    fn test_empty_histogram() {
        let snap = LatencyHistogram::new().snapshot();
        assert_eq!(snap.count, 0);
        assert_eq!(snap.sum_us, 0);
        assert_eq!(snap.min_us, 0);
        assert_eq!(snap.max_us, 0);
        assert_eq!(snap.p50, 0);
        assert_eq!(snap.p90, 0);
        assert_eq!(snap.p99, 0);
    }
}
