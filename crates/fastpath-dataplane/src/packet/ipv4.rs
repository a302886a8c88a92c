//! IPv4 header

use super::checksum::{internet_checksum, verify};
use super::{ensure_capacity, ensure_len};
use fastpath_common::{PacketError, PacketResult};
use std::net::Ipv4Addr;

/// Minimum (option-less) IPv4 header length
pub const IPV4_MIN_HEADER_LEN: usize = 20;

/// Default TTL for locally built headers
pub const DEFAULT_TTL: u8 = 64;

/// Decoded IPv4 header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    /// Header length in 32-bit words
    pub ihl: u8,
    pub tos: u8,
    pub total_length: u16,
    pub identification: u16,
    /// 3-bit flags field (`DONT_FRAGMENT`, `MORE_FRAGMENTS`)
    pub flags: u8,
    /// 13-bit fragment offset in 8-byte units
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

impl Ipv4Header {
    pub const DONT_FRAGMENT: u8 = 0b010;
    pub const MORE_FRAGMENTS: u8 = 0b001;

    /// Option-less header for a datagram carrying `payload_len` bytes
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, payload_len: u16) -> Self {
        Self {
            ihl: 5,
            tos: 0,
            total_length: payload_len.saturating_add(IPV4_MIN_HEADER_LEN as u16),
            identification: 0,
            flags: Self::DONT_FRAGMENT,
            fragment_offset: 0,
            ttl: DEFAULT_TTL,
            protocol,
            checksum: 0,
            src,
            dst,
        }
    }

    /// Decode the header at the start of `data`
    pub fn parse(data: &[u8]) -> PacketResult<Self> {
        ensure_len(data, IPV4_MIN_HEADER_LEN)?;

        let version = data[0] >> 4;
        if version != 4 {
            return Err(PacketError::InvalidPacket("IP version is not 4"));
        }

        let ihl = data[0] & 0x0f;
        if ihl < 5 {
            return Err(PacketError::InvalidPacket("IPv4 IHL below 5"));
        }
        ensure_len(data, ihl as usize * 4)?;

        let frag = u16::from_be_bytes([data[6], data[7]]);

        Ok(Self {
            ihl,
            tos: data[1],
            total_length: u16::from_be_bytes([data[2], data[3]]),
            identification: u16::from_be_bytes([data[4], data[5]]),
            flags: (frag >> 13) as u8,
            fragment_offset: frag & 0x1fff,
            ttl: data[8],
            protocol: data[9],
            checksum: u16::from_be_bytes([data[10], data[11]]),
            src: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            dst: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
        })
    }

    /// Write the fixed header into `buf` and recompute the checksum
    ///
    /// The checksum covers `header_len()` bytes of `buf`, so options
    /// already present after byte 20 are kept and included. Updates
    /// `self.checksum` and returns the header length.
    pub fn serialize(&mut self, buf: &mut [u8]) -> PacketResult<usize> {
        let len = self.header_len();
        if len < IPV4_MIN_HEADER_LEN {
            return Err(PacketError::InvalidPacket("IPv4 IHL below 5"));
        }
        ensure_capacity(buf, len)?;

        let frag = ((self.flags as u16 & 0x7) << 13) | (self.fragment_offset & 0x1fff);

        buf[0] = (4 << 4) | (self.ihl & 0x0f);
        buf[1] = self.tos;
        buf[2..4].copy_from_slice(&self.total_length.to_be_bytes());
        buf[4..6].copy_from_slice(&self.identification.to_be_bytes());
        buf[6..8].copy_from_slice(&frag.to_be_bytes());
        buf[8] = self.ttl;
        buf[9] = self.protocol;
        buf[10..12].copy_from_slice(&[0, 0]);
        buf[12..16].copy_from_slice(&self.src.octets());
        buf[16..20].copy_from_slice(&self.dst.octets());

        self.checksum = internet_checksum(&buf[..len]);
        buf[10..12].copy_from_slice(&self.checksum.to_be_bytes());
        Ok(len)
    }

    /// Header length in bytes (`IHL * 4`)
    #[inline]
    pub fn header_len(&self) -> usize {
        (self.ihl & 0x0f) as usize * 4
    }

    /// Payload length declared by the header
    #[inline]
    pub fn payload_len(&self) -> usize {
        (self.total_length as usize).saturating_sub(self.header_len())
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        self.src
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        self.dst
    }

    /// Part of a fragmented datagram
    pub fn is_fragment(&self) -> bool {
        self.flags & Self::MORE_FRAGMENTS != 0 || self.fragment_offset != 0
    }

    /// DSCP code point (upper six bits of TOS)
    pub fn dscp(&self) -> u8 {
        self.tos >> 2
    }

    /// ECN bits (lower two bits of TOS)
    pub fn ecn(&self) -> u8 {
        self.tos & 0x03
    }
}

/// Check the header checksum of the IPv4 header at the start of `data`
pub fn verify_header_checksum(data: &[u8]) -> PacketResult<bool> {
    let header = Ipv4Header::parse(data)?;
    Ok(verify(&data[..header.header_len()]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::IpProtocol;

    fn sample() -> Ipv4Header {
        let mut h = Ipv4Header::new(
            Ipv4Addr::new(192, 168, 1, 10),
            Ipv4Addr::new(10, 20, 30, 40),
            IpProtocol::TCP,
            1000,
        );
        h.tos = 0xb8;
        h.identification = 0xbeef;
        h.flags = Ipv4Header::MORE_FRAGMENTS;
        h.fragment_offset = 0x1abc;
        h.ttl = 17;
        h
    }

    #[test]
    fn test_round_trip_and_checksum() {
        let mut header = sample();
        let mut buf = [0u8; 20];
        assert_eq!(header.serialize(&mut buf).unwrap(), 20);
        assert!(verify(&buf));

        let parsed = Ipv4Header::parse(&buf).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.total_length, 1020);
        assert_eq!(parsed.flags, Ipv4Header::MORE_FRAGMENTS);
        assert_eq!(parsed.fragment_offset, 0x1abc);
        assert!(parsed.is_fragment());
        assert_eq!(parsed.dscp(), 46);
    }

    #[test]
    fn test_flags_split() {
        let mut buf = [0u8; 20];
        sample().serialize(&mut buf).unwrap();
        // DF clear, MF set, offset 0x1abc
        assert_eq!(u16::from_be_bytes([buf[6], buf[7]]), (0b001 << 13) | 0x1abc);
    }

    #[test]
    fn test_reject_short_and_bad_version() {
        assert_eq!(
            Ipv4Header::parse(&[0x45; 19]),
            Err(PacketError::PacketTooShort { needed: 20, actual: 19 })
        );

        let mut buf = [0u8; 20];
        sample().serialize(&mut buf).unwrap();
        buf[0] = 0x65;
        assert!(matches!(
            Ipv4Header::parse(&buf),
            Err(PacketError::InvalidPacket(_))
        ));
    }

    #[test]
    fn test_reject_bad_ihl() {
        let mut buf = [0u8; 20];
        sample().serialize(&mut buf).unwrap();

        buf[0] = 0x44;
        assert!(matches!(
            Ipv4Header::parse(&buf),
            Err(PacketError::InvalidPacket(_))
        ));

        // IHL 6 needs 24 bytes
        buf[0] = 0x46;
        assert_eq!(
            Ipv4Header::parse(&buf),
            Err(PacketError::PacketTooShort { needed: 24, actual: 20 })
        );
    }

    #[test]
    fn test_options_preserved_in_checksum() {
        let mut buf = [0u8; 24];
        let mut header = sample();
        header.ihl = 6;
        // NOP NOP NOP EOL
        buf[20..24].copy_from_slice(&[1, 1, 1, 0]);

        assert_eq!(header.serialize(&mut buf).unwrap(), 24);
        assert_eq!(&buf[20..24], &[1, 1, 1, 0]);
        assert!(verify(&buf));
        assert!(verify_header_checksum(&buf).unwrap());

        let parsed = Ipv4Header::parse(&buf).unwrap();
        assert_eq!(parsed.header_len(), 24);
    }

    #[test]
    fn test_serialize_buffer_too_small() {
        let mut header = sample();
        assert_eq!(
            header.serialize(&mut [0u8; 16]),
            Err(PacketError::BufferTooSmall { needed: 20, actual: 16 })
        );

        header.ihl = 2;
        assert!(matches!(
            header.serialize(&mut [0u8; 20]),
            Err(PacketError::InvalidPacket(_))
        ));
    }

    #[test]
    fn test_corrupted_checksum_detected() {
        let mut buf = [0u8; 20];
        sample().serialize(&mut buf).unwrap();
        buf[8] = buf[8].wrapping_sub(1);
        assert!(!verify_header_checksum(&buf).unwrap());
    }
}
