//! Fastpath Common - shared types for the packet data plane
//!
//! This crate provides the pieces every other fastpath crate leans on:
//! - Error taxonomy (pool, codec, service)
//! - Monotonic timestamps for sub-microsecond timing
//! - Lock-free counters and latency histograms

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod metrics;

pub use error::*;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Monotonic nanosecond timestamp for sub-microsecond timing
///
/// Measured from a process-wide epoch captured on first use, so values are
/// only comparable within one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Timestamp(u64);

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

impl Timestamp {
    /// Get current timestamp (nanoseconds since process epoch)
    #[inline(always)]
    pub fn now() -> Self {
        Self(epoch().elapsed().as_nanos() as u64)
    }

    /// Get nanoseconds value
    #[inline(always)]
    pub fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Duration since this timestamp in nanoseconds
    #[inline(always)]
    pub fn elapsed_nanos(&self) -> u64 {
        Self::now().0.saturating_sub(self.0)
    }

    /// Duration since this timestamp in microseconds
    #[inline(always)]
    pub fn elapsed_micros(&self) -> u64 {
        self.elapsed_nanos() / 1000
    }
}

/// High-performance counter for lock-free metrics
#[derive(Debug, Default)]
pub struct AtomicCounter(AtomicU64);

impl AtomicCounter {
    /// Create new counter
    pub const fn new(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }

    /// Increment and return previous value
    #[inline(always)]
    pub fn inc(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// Add value and return previous
    #[inline(always)]
    pub fn add(&self, val: u64) -> u64 {
        self.0.fetch_add(val, Ordering::Relaxed)
    }

    /// Get current value
    #[inline(always)]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
