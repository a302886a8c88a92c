//! TCP header

use super::checksum::transport_checksum;
use super::{ensure_capacity, ensure_len, IpProtocol};
use fastpath_common::{PacketError, PacketResult};
use std::net::Ipv4Addr;

/// Minimum (option-less) TCP header length
pub const TCP_MIN_HEADER_LEN: usize = 20;

/// TCP control bits
pub struct TcpFlags;

impl TcpFlags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;
    pub const ECE: u8 = 0x40;
    pub const CWR: u8 = 0x80;
}

/// Decoded TCP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    /// Header length in bytes (data offset nibble * 4)
    pub data_offset: u8,
    pub flags: u8,
    pub window: u16,
    pub checksum: u16,
    pub urgent_ptr: u16,
}

impl TcpHeader {
    /// Decode the header at the start of `data`
    pub fn parse(data: &[u8]) -> PacketResult<Self> {
        ensure_len(data, TCP_MIN_HEADER_LEN)?;

        let data_offset = (data[12] >> 4) * 4;
        if (data_offset as usize) < TCP_MIN_HEADER_LEN {
            return Err(PacketError::InvalidPacket("TCP data offset below 5"));
        }
        ensure_len(data, data_offset as usize)?;

        Ok(Self {
            src_port: u16::from_be_bytes([data[0], data[1]]),
            dst_port: u16::from_be_bytes([data[2], data[3]]),
            seq: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ack: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            data_offset,
            flags: data[13],
            window: u16::from_be_bytes([data[14], data[15]]),
            checksum: u16::from_be_bytes([data[16], data[17]]),
            urgent_ptr: u16::from_be_bytes([data[18], data[19]]),
        })
    }

    /// Write the fixed 20 bytes into `buf`; options already in place are kept
    pub fn serialize(&self, buf: &mut [u8]) -> PacketResult<usize> {
        let len = self.header_len();
        if len < TCP_MIN_HEADER_LEN || len > 60 || len % 4 != 0 {
            return Err(PacketError::InvalidPacket("TCP data offset out of range"));
        }
        ensure_capacity(buf, len)?;

        buf[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        buf[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        buf[4..8].copy_from_slice(&self.seq.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ack.to_be_bytes());
        buf[12] = (self.data_offset / 4) << 4;
        buf[13] = self.flags;
        buf[14..16].copy_from_slice(&self.window.to_be_bytes());
        buf[16..18].copy_from_slice(&self.checksum.to_be_bytes());
        buf[18..20].copy_from_slice(&self.urgent_ptr.to_be_bytes());
        Ok(len)
    }

    #[inline]
    pub fn header_len(&self) -> usize {
        self.data_offset as usize
    }

    #[inline]
    pub fn has_flags(&self, flags: u8) -> bool {
        self.flags & flags == flags
    }

    /// Recompute the checksum over `segment` (header + payload) in place
    ///
    /// `segment` must start with this header. Updates `self.checksum`.
    pub fn compute_checksum(
        &mut self,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        segment: &mut [u8],
    ) -> PacketResult<u16> {
        if self.header_len() < TCP_MIN_HEADER_LEN {
            return Err(PacketError::InvalidPacket("TCP data offset out of range"));
        }
        ensure_len(segment, self.header_len())?;
        segment[16..18].copy_from_slice(&[0, 0]);
        self.checksum = transport_checksum(src, dst, IpProtocol::TCP, segment);
        segment[16..18].copy_from_slice(&self.checksum.to_be_bytes());
        Ok(self.checksum)
    }
}
