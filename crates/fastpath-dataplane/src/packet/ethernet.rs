//! Ethernet II header

use super::{ensure_capacity, ensure_len};
use fastpath_common::PacketResult;

/// Ethernet II header length
pub const ETHERNET_HEADER_LEN: usize = 14;

/// Broadcast MAC
pub const BROADCAST_MAC: [u8; 6] = [0xff; 6];

/// Decoded Ethernet II header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst_mac: [u8; 6],
    pub src_mac: [u8; 6],
    pub ether_type: u16,
}

impl EthernetHeader {
    /// Decode the first 14 bytes of `data`
    #[inline]
    pub fn parse(data: &[u8]) -> PacketResult<Self> {
        ensure_len(data, ETHERNET_HEADER_LEN)?;

        let mut dst_mac = [0u8; 6];
        let mut src_mac = [0u8; 6];
        dst_mac.copy_from_slice(&data[0..6]);
        src_mac.copy_from_slice(&data[6..12]);

        Ok(Self {
            dst_mac,
            src_mac,
            ether_type: u16::from_be_bytes([data[12], data[13]]),
        })
    }

    /// Write the header to the start of `buf`, returning bytes written
    #[inline]
    pub fn serialize(&self, buf: &mut [u8]) -> PacketResult<usize> {
        ensure_capacity(buf, ETHERNET_HEADER_LEN)?;

        buf[0..6].copy_from_slice(&self.dst_mac);
        buf[6..12].copy_from_slice(&self.src_mac);
        buf[12..14].copy_from_slice(&self.ether_type.to_be_bytes());
        Ok(ETHERNET_HEADER_LEN)
    }

    /// Destination is the broadcast address
    pub fn is_broadcast(&self) -> bool {
        self.dst_mac == BROADCAST_MAC
    }

    /// Swap source and destination, as when reflecting a frame
    pub fn swap_macs(&mut self) {
        std::mem::swap(&mut self.dst_mac, &mut self.src_mac);
    }
}
