//! Internet checksum (RFC 1071)

use std::net::Ipv4Addr;

/// Sum 16-bit big-endian words; an odd trailing byte is the high byte of a padded word
#[inline]
fn sum_words(data: &[u8], mut sum: u64) -> u64 {
    let mut chunks = data.chunks_exact(2);
    for word in &mut chunks {
        sum += u16::from_be_bytes([word[0], word[1]]) as u64;
    }
    if let [last] = chunks.remainder() {
        sum += (*last as u64) << 8;
    }
    sum
}

/// Fold carries back into the low 16 bits until none remain
#[inline]
fn fold(mut sum: u64) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}

/// One's complement of the one's complement sum of `data`
///
/// The checksum field inside `data` must be zeroed by the caller.
#[inline]
pub fn internet_checksum(data: &[u8]) -> u16 {
    !fold(sum_words(data, 0))
}

/// True when `data` (checksum field included) sums to zero
#[inline]
pub fn verify(data: &[u8]) -> bool {
    internet_checksum(data) == 0
}

/// TCP/UDP checksum over the IPv4 pseudo-header and `segment`
///
/// The checksum field inside `segment` must be zeroed by the caller.
pub fn transport_checksum(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, segment: &[u8]) -> u16 {
    let mut sum = sum_words(&src.octets(), 0);
    sum = sum_words(&dst.octets(), sum);
    sum += protocol as u64;
    sum += segment.len() as u64;
    !fold(sum_words(segment, sum))
}
