//! Packet Forward Path
//!
//! Acquire a slot, copy the frame in, run the pipeline, release. Exists
//! to exercise the pool lifecycle under real request load.

use crate::pipeline::Pipeline;
use crate::pool::MemoryPool;
use crate::stats::{PathStats, PathStatsSnapshot};
use crate::telemetry;
use fastpath_common::metrics::LatencyHistogram;
use fastpath_common::{FastpathResult, PacketError, Timestamp};
use serde::Serialize;
use std::sync::Arc;

/// What happened to one forwarded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForwardOutcome {
    /// Slot that carried the frame
    pub slot_index: usize,
    /// Every pipeline stage returned `Continue`
    pub completed: bool,
    /// Length of the pipeline output
    pub bytes: usize,
}

/// Pool + pipeline pairing used by the service
pub struct ForwardPath {
    pool: Arc<MemoryPool>,
    pipeline: Pipeline,
    stats: PathStats,
    latency: LatencyHistogram,
}

impl ForwardPath {
    pub fn new(pool: Arc<MemoryPool>, pipeline: Pipeline) -> Self {
        Self {
            pool,
            pipeline,
            stats: PathStats::default(),
            latency: LatencyHistogram::new(),
        }
    }

    /// Forward one frame through a pool slot
    ///
    /// `None` acquires and releases a slot without running the pipeline.
    /// Fails with `PoolExhausted` when no slot is free and with
    /// `BufferTooSmall` when the frame does not fit in a slot; the slot is
    /// always back in the pool when this returns.
    pub fn forward(&self, frame: Option<&[u8]>) -> FastpathResult<ForwardOutcome> {
        let start = Timestamp::now();

        let mut slot = match self.pool.acquire() {
            Ok(slot) => slot,
            Err(e) => {
                self.stats.record_rejected();
                return Err(e.into());
            }
        };
        let slot_index = slot.index();

        let Some(frame) = frame else {
            slot.release()?;
            return Ok(ForwardOutcome {
                slot_index,
                completed: true,
                bytes: 0,
            });
        };

        if frame.len() > slot.len() {
            self.stats.record_rejected();
            return Err(PacketError::BufferTooSmall {
                needed: frame.len(),
                actual: slot.len(),
            }
            .into());
        }

        let buf = &mut slot[..frame.len()];
        buf.copy_from_slice(frame);

        let processed = self.pipeline.process(buf);
        let outcome = ForwardOutcome {
            slot_index,
            completed: processed.completed,
            bytes: processed.data.len(),
        };
        if let Some(stage) = processed.stopped_at {
            tracing::trace!(slot = slot_index, stage, "packet dropped");
        }

        slot.release()?;

        if outcome.completed {
            self.stats.record_completed(outcome.bytes as u64);
        } else {
            self.stats.record_drop();
        }
        telemetry::record_packet(outcome.completed);
        self.latency.record(start.elapsed_micros());

        Ok(outcome)
    }

    pub fn stats(&self) -> PathStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn latency(&self) -> &LatencyHistogram {
        &self.latency
    }

    pub fn pool(&self) -> &Arc<MemoryPool> {
        &self.pool
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Give back the pool, e.g. to close it at shutdown
    pub fn into_pool(self) -> Arc<MemoryPool> {
        self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::tests::udp_frame;
    use crate::pool::PoolConfig;
    use fastpath_common::{FastpathError, PoolError};

    fn path(slots: usize, slot_size: usize) -> ForwardPath {
        let pool = MemoryPool::new(PoolConfig::new(slots, slot_size)).unwrap();
        ForwardPath::new(Arc::new(pool), Pipeline::forwarding())
    }

    #[test]
    fn test_forward_releases_slot() {
        let fp = path(4, 256);
        let frame = udp_frame(b"hello");

        for _ in 0..10 {
            let outcome = fp.forward(Some(&frame[..])).unwrap();
            assert!(outcome.completed);
            assert_eq!(outcome.bytes, frame.len());
            // LIFO free-list hands slot 0 back every time
            assert_eq!(outcome.slot_index, 0);
        }

        let pool_stats = fp.pool().stats();
        assert_eq!(pool_stats.used_slots, 0);
        assert_eq!(pool_stats.total_allocs, 10);
        assert_eq!(pool_stats.total_frees, 10);

        let stats = fp.stats();
        assert_eq!(stats.completed, 10);
        assert_eq!(stats.bytes, 10 * frame.len() as u64);
        assert_eq!(fp.latency().count(), 10);
    }

    #[test]
    fn test_forward_without_frame() {
        let fp = path(2, 128);
        let outcome = fp.forward(None).unwrap();
        assert_eq!(
            outcome,
            ForwardOutcome {
                slot_index: 0,
                completed: true,
                bytes: 0
            }
        );
        assert_eq!(fp.pool().stats().used_slots, 0);
        assert_eq!(fp.stats().processed, 0);
    }

    #[test]
    fn test_dropped_frame_still_releases() {
        let fp = path(2, 128);
        let outcome = fp.forward(Some(&[0u8; 20][..])).unwrap();
        assert!(!outcome.completed);
        assert_eq!(fp.pool().stats().used_slots, 0);
        assert_eq!(fp.stats().dropped, 1);
    }

    #[test]
    fn test_oversized_frame() {
        let fp = path(2, 64);
        let err = fp.forward(Some(&[0u8; 65][..])).unwrap_err();
        assert!(matches!(
            err,
            FastpathError::Packet(PacketError::BufferTooSmall { needed: 65, actual: 64 })
        ));
        assert_eq!(fp.pool().stats().used_slots, 0);
        assert_eq!(fp.stats().rejected, 1);
    }

    #[test]
    fn test_exhaustion_propagates() {
        let fp = path(1, 64);
        let held = fp.pool().acquire().unwrap();

        let err = fp.forward(None).unwrap_err();
        assert!(matches!(err, FastpathError::Pool(PoolError::PoolExhausted)));

        drop(held);
        assert!(fp.forward(None).is_ok());
    }

    #[test]
    fn test_into_pool_closes_cleanly() {
        let fp = path(2, 64);
        fp.forward(None).unwrap();

        let pool = Arc::try_unwrap(fp.into_pool()).ok().unwrap();
        assert!(pool.close().is_ok());
    }

    #[test]
    fn test_outcome_json() {
        let json = serde_json::to_value(ForwardOutcome {
            slot_index: 3,
            completed: false,
            bytes: 42,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"slot_index": 3, "completed": false, "bytes": 42}));
    }
}
