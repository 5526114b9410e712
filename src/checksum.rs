//! Lovelink checksum
//!
//! The checksum is the low 8 bits of the plain byte sum. Both directions
//! cover the bytes from immediately after STX up to, but not including,
//! the checksum field.

/// Sum of `bytes` truncated to 8 bits
#[inline]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}
