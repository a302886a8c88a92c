//! Error types for the fastpath data plane

use thiserror::Error;

/// Memory pool errors
#[derive(Error, Debug)]
pub enum PoolError {
    /// No free slot; the caller decides whether to retry or shed load
    #[error("memory pool exhausted")]
    PoolExhausted,

    /// Index out of range, not currently held, or owned by a live guard
    #[error("invalid slot: {0}")]
    InvalidSlot(usize),

    /// Rejected pool configuration
    #[error("invalid pool config: {0}")]
    InvalidConfig(String),

    /// Timed acquire gave up waiting for a free slot
    #[error("timed out waiting for a free slot")]
    Timeout,

    /// Pool closed with detached slots still unreleased
    #[error("pool closed with {0} slots still held")]
    SlotsOutstanding(usize),

    /// Backing memory could not be reserved
    #[error("slab allocation failed: {0}")]
    Allocation(String),
}

impl PoolError {
    /// Whether the caller can reasonably retry the operation
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PoolError::PoolExhausted | PoolError::Timeout)
    }
}

/// Packet codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Input shorter than the header requires
    #[error("packet too short: need {needed} bytes, have {actual}")]
    PacketTooShort {
        /// Bytes required
        needed: usize,
        /// Bytes available
        actual: usize,
    },

    /// Header field holds a value the codec refuses
    #[error("invalid packet: {0}")]
    InvalidPacket(&'static str),

    /// Output buffer cannot hold the serialized header
    #[error("buffer too small: need {needed} bytes, have {actual}")]
    BufferTooSmall {
        /// Bytes required
        needed: usize,
        /// Bytes available
        actual: usize,
    },

    /// EtherType or IP protocol the decoder does not handle
    #[error("unsupported type: {0:#06x}")]
    UnsupportedType(u16),
}

/// Service-level error type
#[derive(Error, Debug)]
pub enum FastpathError {
    /// Memory pool failure
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Codec failure
    #[error(transparent)]
    Packet(#[from] PacketError),

    /// XDP capability or rlimit failure
    #[error("XDP error: {0}")]
    Xdp(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Result type for codec operations
pub type PacketResult<T> = Result<T, PacketError>;

/// Result type for service operations
pub type FastpathResult<T> = Result<T, FastpathError>;
