//! UDP header

use super::checksum::transport_checksum;
use super::{ensure_capacity, ensure_len, IpProtocol};
use fastpath_common::PacketResult;
use std::net::Ipv4Addr;

/// UDP header length
pub const UDP_HEADER_LEN: usize = 8;

/// Decoded UDP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    /// Header plus payload length
    pub length: u16,
    pub checksum: u16,
}

impl UdpHeader {
    pub fn new(src_port: u16, dst_port: u16, payload_len: u16) -> Self {
        Self {
            src_port,
            dst_port,
            length: payload_len.saturating_add(UDP_HEADER_LEN as u16),
            checksum: 0,
        }
    }

    pub fn parse(data: &[u8]) -> PacketResult<Self> {
        ensure_len(data, UDP_HEADER_LEN)?;

        Ok(Self {
            src_port: u16::from_be_bytes([data[0], data[1]]),
            dst_port: u16::from_be_bytes([data[2], data[3]]),
            length: u16::from_be_bytes([data[4], data[5]]),
            checksum: u16::from_be_bytes([data[6], data[7]]),
        })
    }

    pub fn serialize(&self, buf: &mut [u8]) -> PacketResult<usize> {
        ensure_capacity(buf, UDP_HEADER_LEN)?;

        buf[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        buf[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        buf[4..6].copy_from_slice(&self.length.to_be_bytes());
        buf[6..8].copy_from_slice(&self.checksum.to_be_bytes());
        Ok(UDP_HEADER_LEN)
    }

    /// Payload length declared by the header
    #[inline]
    pub fn payload_len(&self) -> usize {
        (self.length as usize).saturating_sub(UDP_HEADER_LEN)
    }

    /// Recompute the checksum over `datagram` (header + payload) in place
    ///
    /// A computed zero is sent as `0xffff`; zero on the wire means "no checksum".
    pub fn compute_checksum(
        &mut self,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        datagram: &mut [u8],
    ) -> PacketResult<u16> {
        ensure_len(datagram, UDP_HEADER_LEN)?;
        datagram[6..8].copy_from_slice(&[0, 0]);
        let csum = match transport_checksum(src, dst, IpProtocol::UDP, datagram) {
            0 => 0xffff,
            c => c,
        };
        self.checksum = csum;
        datagram[6..8].copy_from_slice(&csum.to_be_bytes());
        Ok(csum)
    }
}
