//! Fastpath Data Plane
//!
//! NUMA-aware slab memory pool, zero-copy L2-L4 packet codec and an
//! ordered packet pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        FORWARD PATH                          │
//! │                                                              │
//! │   frame ──► MemoryPool::acquire ──► copy into slot           │
//! │                     │                                        │
//! │                     ▼                                        │
//! │   ┌──────────┐   ┌──────────┐   ┌──────────┐                 │
//! │   │ Stage 0  │──►│ Stage 1  │──►│ Stage N  │   (Drop stops)  │
//! │   └──────────┘   └──────────┘   └──────────┘                 │
//! │                     │                                        │
//! │                     ▼                                        │
//! │              slot released                                   │
//! │                                                              │
//! │   SlabRegion: one mmap (hugepages, mbind) split into slots   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Properties
//!
//! 1. **Fail-fast allocation**: `acquire()` never blocks
//! 2. **Zero-copy**: headers decode from and encode into the slot buffer
//! 3. **Best-effort placement**: missing hugepages or NUMA degrade, never fail
//! 4. **No panics on input**: every parse path is bounds-checked

pub mod forward;
pub mod numa;
pub mod packet;
pub mod pipeline;
pub mod pool;
pub mod region;
pub mod stats;
pub mod telemetry;

pub use forward::{ForwardOutcome, ForwardPath};
pub use numa::{numa_info, NumaInfo, NumaProbe};
pub use packet::{
    EtherType, EthernetHeader, IpProtocol, Ipv4Header, PacketView, TcpFlags, TcpHeader,
    Transport, UdpHeader, ETHERNET_HEADER_LEN,
};
pub use pipeline::{
    DecrementTtlStage, DscpMarkStage, Pipeline, Processed, Stage, ValidateIpv4Stage, Verdict,
};
pub use pool::{MemoryPool, PoolConfig, PoolSlot, DEFAULT_NUM_SLOTS, DEFAULT_SLOT_SIZE};
pub use region::{SlabRegion, HUGEPAGE_SIZE};
pub use stats::{PathStats, PathStatsSnapshot, PoolStats};
