//! Packet Processing Pipeline
//!
//! Ordered chain of stages threaded over one mutable buffer.
//!
//! Each stage receives the slice produced by the previous one and may
//! return a sub-slice of it, so the chain never copies. A `Drop` verdict
//! stops the chain immediately. The stage list is fixed once the
//! pipeline is shared, so `process` takes `&self` and needs no locking.

use crate::packet::checksum;
use crate::packet::{EtherType, EthernetHeader, Ipv4Header, ETHERNET_HEADER_LEN};

/// Stage outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Hand the result to the next stage
    Continue,
    /// Stop the chain; the packet is dropped
    Drop,
}

/// Pipeline stage trait
pub trait Stage: Send + Sync {
    fn process<'a>(&self, data: &'a mut [u8]) -> (&'a mut [u8], Verdict);
    fn name(&self) -> &'static str;
}

/// Closure adapter used by [`Pipeline::add_handler`]
struct FnStage<F> {
    name: &'static str,
    handler: F,
}

impl<F> Stage for FnStage<F>
where
    F: for<'a> Fn(&'a mut [u8]) -> (&'a mut [u8], Verdict) + Send + Sync,
{
    #[inline]
    fn process<'a>(&self, data: &'a mut [u8]) -> (&'a mut [u8], Verdict) {
        (self.handler)(data)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Result of running the chain
#[derive(Debug)]
pub struct Processed<'a> {
    /// Output of the last stage that ran
    pub data: &'a mut [u8],
    /// Every stage returned `Continue`
    pub completed: bool,
    /// Name of the stage that dropped the packet
    pub stopped_at: Option<&'static str>,
}

/// Ordered handler chain
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// Empty chain; `process` returns its input unchanged
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// IPv4 forwarding chain: validate, then decrement TTL
    pub fn forwarding() -> Self {
        let mut p = Self::new();
        p.add_stage(Box::new(ValidateIpv4Stage));
        p.add_stage(Box::new(DecrementTtlStage));
        p
    }

    pub fn add_stage(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    /// Append a closure stage
    pub fn add_handler<F>(&mut self, name: &'static str, handler: F)
    where
        F: for<'a> Fn(&'a mut [u8]) -> (&'a mut [u8], Verdict) + Send + Sync + 'static,
    {
        self.add_stage(Box::new(FnStage { name, handler }));
    }

    /// Run `data` through every stage in registration order
    #[inline]
    pub fn process<'a>(&self, data: &'a mut [u8]) -> Processed<'a> {
        let mut data = data;
        for stage in &self.stages {
            let (out, verdict) = stage.process(data);
            data = out;
            if verdict == Verdict::Drop {
                return Processed {
                    data,
                    completed: false,
                    stopped_at: Some(stage.name()),
                };
            }
        }
        Processed {
            data,
            completed: true,
            stopped_at: None,
        }
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

// ============================================================================
// Built-in stages (Ethernet II + IPv4 at offset 14)
// ============================================================================

/// Drop anything that is not a well-formed IPv4 frame; trims L2 padding
pub struct ValidateIpv4Stage;

impl Stage for ValidateIpv4Stage {
    fn process<'a>(&self, data: &'a mut [u8]) -> (&'a mut [u8], Verdict) {
        let eth = match EthernetHeader::parse(data) {
            Ok(eth) => eth,
            Err(_) => return (data, Verdict::Drop),
        };
        if eth.ether_type != EtherType::IPV4 {
            return (data, Verdict::Drop);
        }

        let ip = match Ipv4Header::parse(&data[ETHERNET_HEADER_LEN..]) {
            Ok(ip) => ip,
            Err(_) => return (data, Verdict::Drop),
        };

        let total = ip.total_length as usize;
        let frame_len = ETHERNET_HEADER_LEN + total;
        if total < ip.header_len() || frame_len > data.len() {
            return (data, Verdict::Drop);
        }

        let header = &data[ETHERNET_HEADER_LEN..ETHERNET_HEADER_LEN + ip.header_len()];
        if !checksum::verify(header) {
            return (data, Verdict::Drop);
        }

        (&mut data[..frame_len], Verdict::Continue)
    }

    fn name(&self) -> &'static str {
        "validate_ipv4"
    }
}

/// Decrement the IPv4 TTL in place; drop when it would reach zero
pub struct DecrementTtlStage;

impl Stage for DecrementTtlStage {
    fn process<'a>(&self, data: &'a mut [u8]) -> (&'a mut [u8], Verdict) {
        let verdict = rewrite_ipv4(data, |ip| {
            if ip.ttl <= 1 {
                return false;
            }
            ip.ttl -= 1;
            true
        });
        (data, verdict)
    }

    fn name(&self) -> &'static str {
        "decrement_ttl"
    }
}

/// Rewrite the DSCP code point, keeping the ECN bits
pub struct DscpMarkStage {
    dscp: u8,
}

impl DscpMarkStage {
    /// `dscp` is masked to six bits
    pub fn new(dscp: u8) -> Self {
        Self { dscp: dscp & 0x3f }
    }
}

impl Stage for DscpMarkStage {
    fn process<'a>(&self, data: &'a mut [u8]) -> (&'a mut [u8], Verdict) {
        let dscp = self.dscp;
        let verdict = rewrite_ipv4(data, |ip| {
            ip.tos = (dscp << 2) | ip.ecn();
            true
        });
        (data, verdict)
    }

    fn name(&self) -> &'static str {
        "dscp_mark"
    }
}

/// Parse the IPv4 header at offset 14, apply `edit`, write it back with a
/// fresh checksum. `edit` returning false drops the packet untouched.
fn rewrite_ipv4(data: &mut [u8], edit: impl FnOnce(&mut Ipv4Header) -> bool) -> Verdict {
    let Some(l3) = data.get_mut(ETHERNET_HEADER_LEN..) else {
        return Verdict::Drop;
    };
    let mut ip = match Ipv4Header::parse(l3) {
        Ok(ip) => ip,
        Err(_) => return Verdict::Drop,
    };
    if !edit(&mut ip) {
        return Verdict::Drop;
    }
    match ip.serialize(l3) {
        Ok(_) => Verdict::Continue,
        Err(_) => Verdict::Drop,
    }
}
