//! Packet Codec
//!
//! Bounds-checked header decode/encode over raw frame bytes.
//!
//! # Design
//!
//! - Headers are small `Copy` structs decoded from a borrowed slice;
//!   `serialize` writes back into a caller-supplied buffer, normally the
//!   same pool slot the frame arrived in
//! - Every accessor checks length before indexing; malformed input is a
//!   [`PacketError`], never a panic
//! - Pure functions, safe to call concurrently on distinct buffers

pub mod checksum;
pub mod ethernet;
pub mod ipv4;
pub mod tcp;
pub mod udp;

pub use ethernet::{EthernetHeader, ETHERNET_HEADER_LEN};
pub use ipv4::{Ipv4Header, IPV4_MIN_HEADER_LEN};
pub use tcp::{TcpFlags, TcpHeader, TCP_MIN_HEADER_LEN};
pub use udp::{UdpHeader, UDP_HEADER_LEN};

use fastpath_common::{PacketError, PacketResult};

/// EtherType values
pub struct EtherType;

impl EtherType {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
    pub const VLAN: u16 = 0x8100;
    pub const IPV6: u16 = 0x86dd;
}

/// IP protocol numbers
pub struct IpProtocol;

impl IpProtocol {
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

/// Input must hold at least `needed` bytes
#[inline(always)]
pub(crate) fn ensure_len(data: &[u8], needed: usize) -> PacketResult<()> {
    if data.len() < needed {
        return Err(PacketError::PacketTooShort {
            needed,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Output must have room for `needed` bytes
#[inline(always)]
pub(crate) fn ensure_capacity(buf: &[u8], needed: usize) -> PacketResult<()> {
    if buf.len() < needed {
        return Err(PacketError::BufferTooSmall {
            needed,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// Transport header of a decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp(TcpHeader),
    Udp(UdpHeader),
}

impl Transport {
    pub fn src_port(&self) -> u16 {
        match self {
            Transport::Tcp(h) => h.src_port,
            Transport::Udp(h) => h.src_port,
        }
    }

    pub fn dst_port(&self) -> u16 {
        match self {
            Transport::Tcp(h) => h.dst_port,
            Transport::Udp(h) => h.dst_port,
        }
    }

    pub fn header_len(&self) -> usize {
        match self {
            Transport::Tcp(h) => h.header_len(),
            Transport::Udp(_) => UDP_HEADER_LEN,
        }
    }
}

/// Full L2-L4 decode of an Ethernet/IPv4/{TCP,UDP} frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketView<'a> {
    pub ethernet: EthernetHeader,
    pub ipv4: Ipv4Header,
    pub transport: Transport,
    /// Bytes after the transport header, bounded by the IPv4 total length
    pub payload: &'a [u8],
    pub l3_offset: usize,
    pub l4_offset: usize,
    pub payload_offset: usize,
}

impl<'a> PacketView<'a> {
    /// Decode `frame`; trailing Ethernet padding past the IPv4 total length is ignored
    pub fn parse(frame: &'a [u8]) -> PacketResult<Self> {
        let ethernet = EthernetHeader::parse(frame)?;
        if ethernet.ether_type != EtherType::IPV4 {
            return Err(PacketError::UnsupportedType(ethernet.ether_type));
        }

        let l3_offset = ETHERNET_HEADER_LEN;
        let l3 = &frame[l3_offset..];
        let ipv4 = Ipv4Header::parse(l3)?;

        let total_len = ipv4.total_length as usize;
        if total_len < ipv4.header_len() {
            return Err(PacketError::InvalidPacket("IPv4 total length below header length"));
        }
        ensure_len(l3, total_len)?;
        let datagram = &l3[..total_len];

        let l4 = &datagram[ipv4.header_len()..];
        let transport = match ipv4.protocol {
            IpProtocol::TCP => Transport::Tcp(TcpHeader::parse(l4)?),
            IpProtocol::UDP => Transport::Udp(UdpHeader::parse(l4)?),
            other => return Err(PacketError::UnsupportedType(other as u16)),
        };

        let l4_offset = l3_offset + ipv4.header_len();
        let payload_offset = l4_offset + transport.header_len();

        Ok(Self {
            ethernet,
            ipv4,
            transport,
            payload: &l4[transport.header_len()..],
            l3_offset,
            l4_offset,
            payload_offset,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::net::Ipv4Addr;

    /// Ethernet + IPv4 + UDP frame with valid checksums
    pub(crate) fn udp_frame(payload: &[u8]) -> Vec<u8> {
        let src = Ipv4Addr::new(10, 1, 0, 1);
        let dst = Ipv4Addr::new(10, 2, 0, 1);
        let udp_len = UDP_HEADER_LEN + payload.len();
        let mut frame = vec![0u8; ETHERNET_HEADER_LEN + IPV4_MIN_HEADER_LEN + udp_len];

        EthernetHeader {
            dst_mac: [0x02, 0, 0, 0, 0, 0x02],
            src_mac: [0x02, 0, 0, 0, 0, 0x01],
            ether_type: EtherType::IPV4,
        }
        .serialize(&mut frame)
        .unwrap();

        Ipv4Header::new(src, dst, IpProtocol::UDP, udp_len as u16)
            .serialize(&mut frame[ETHERNET_HEADER_LEN..])
            .unwrap();

        let l4 = &mut frame[ETHERNET_HEADER_LEN + IPV4_MIN_HEADER_LEN..];
        l4[UDP_HEADER_LEN..].copy_from_slice(payload);
        let mut udp = UdpHeader::new(40000, 4789, payload.len() as u16);
        udp.serialize(l4).unwrap();
        udp.compute_checksum(src, dst, l4).unwrap();
        frame
    }

    #[test]
    fn test_parse_udp_frame() {
        let frame = udp_frame(b"payload!");
        let view = PacketView::parse(&frame).unwrap();

        assert_eq!(view.l3_offset, 14);
        assert_eq!(view.l4_offset, 34);
        assert_eq!(view.payload_offset, 42);
        assert_eq!(view.payload, b"payload!");
        assert_eq!(view.transport.src_port(), 40000);
        assert_eq!(view.transport.dst_port(), 4789);
        assert_eq!(view.ipv4.protocol, IpProtocol::UDP);
    }

    #[test]
    fn test_ethernet_padding_ignored() {
        let mut frame = udp_frame(b"x");
        frame.resize(60, 0xaa);

        let view = PacketView::parse(&frame).unwrap();
        assert_eq!(view.payload, b"x");
    }

    #[test]
    fn test_truncated_datagram() {
        let frame = udp_frame(b"0123456789");
        let cut = &frame[..frame.len() - 4];
        assert!(matches!(
            PacketView::parse(cut),
            Err(PacketError::PacketTooShort { .. })
        ));
    }

    #[test]
    fn test_unsupported_types() {
        let mut frame = udp_frame(b"");
        frame[12..14].copy_from_slice(&EtherType::IPV6.to_be_bytes());
        assert_eq!(
            PacketView::parse(&frame),
            Err(PacketError::UnsupportedType(EtherType::IPV6))
        );

        let mut frame = udp_frame(b"");
        frame[ETHERNET_HEADER_LEN + 9] = IpProtocol::ICMP;
        assert_eq!(
            PacketView::parse(&frame),
            Err(PacketError::UnsupportedType(IpProtocol::ICMP as u16))
        );
    }

    #[test]
    fn test_total_length_below_header() {
        let mut frame = udp_frame(b"");
        frame[ETHERNET_HEADER_LEN + 2..ETHERNET_HEADER_LEN + 4].copy_from_slice(&12u16.to_be_bytes());
        assert!(matches!(
            PacketView::parse(&frame),
            Err(PacketError::InvalidPacket(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_parse_never_panics(data in proptest::collection::vec(any::<u8>(), 0..128)) {
            let _ = EthernetHeader::parse(&data);
            let _ = Ipv4Header::parse(&data);
            let _ = TcpHeader::parse(&data);
            let _ = UdpHeader::parse(&data);
            let _ = PacketView::parse(&data);
        }

        #[test]
        fn prop_ipv4_frame_mutations_never_panic(
            payload in proptest::collection::vec(any::<u8>(), 0..64),
            pos in 0usize..42,
            byte in any::<u8>(),
        ) {
            let mut frame = udp_frame(&payload);
            frame[pos] = byte;
            let _ = PacketView::parse(&frame);
        }

        #[test]
        fn prop_serialized_ipv4_checksum_verifies(
            tos in any::<u8>(),
            id in any::<u16>(),
            ttl in any::<u8>(),
            src in any::<u32>(),
            dst in any::<u32>(),
        ) {
            let mut header = Ipv4Header::new(Ipv4Addr::from(src), Ipv4Addr::from(dst), IpProtocol::TCP, 0);
            header.tos = tos;
            header.identification = id;
            header.ttl = ttl;

            let mut buf = [0u8; 20];
            header.serialize(&mut buf).unwrap();
            prop_assert!(checksum::verify(&buf));
            prop_assert_eq!(Ipv4Header::parse(&buf).unwrap(), header);
        }
    }
}
