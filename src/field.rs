//! ASCII field helpers
//!
//! Lovelink carries every number as fixed-width ASCII: uppercase hex for
//! addresses, codes, status words and checksums, decimal for magnitudes and
//! result codes.

use crate::error::{LoveError, LoveResult};

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Render a byte as two uppercase hex digits
#[inline]
pub fn byte_to_ascii_hex(byte: u8) -> [u8; 2] {
    [HEX_DIGITS[(byte >> 4) as usize], HEX_DIGITS[(byte & 0x0F) as usize]]
}

#[inline]
fn hex_nibble(c: u8) -> LoveResult<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        _ => Err(LoveError::invalid_data(format!(
            "invalid hex character: 0x{:02X}",
            c
        ))),
    }
}

/// Parse two hex digits into a byte
pub fn ascii_hex_to_byte(ascii: &[u8]) -> LoveResult<u8> {
    if ascii.len() != 2 {
        return Err(LoveError::invalid_data(format!(
            "hex byte needs 2 characters, got {}",
            ascii.len()
        )));
    }
    Ok((hex_nibble(ascii[0])? << 4) | hex_nibble(ascii[1])?)
}

/// Parse a hex field of up to 4 digits
pub fn parse_hex(field: &[u8]) -> LoveResult<u16> {
    if field.is_empty() || field.len() > 4 {
        return Err(LoveError::invalid_data(format!(
            "hex field width {} out of range",
            field.len()
        )));
    }
    field
        .iter()
        .try_fold(0u16, |acc, &c| Ok((acc << 4) | u16::from(hex_nibble(c)?)))
}

/// Parse an unsigned decimal field
pub fn parse_decimal(field: &[u8]) -> LoveResult<u32> {
    if field.is_empty() {
        return Err(LoveError::invalid_data("empty decimal field"));
    }
    if field.len() > 9 {
        return Err(LoveError::invalid_data(format!(
            "decimal field too wide: {} digits",
            field.len()
        )));
    }
    field.iter().try_fold(0u32, |acc, &c| {
        if c.is_ascii_digit() {
            Ok(acc * 10 + u32::from(c - b'0'))
        } else {
            Err(LoveError::invalid_data(format!(
                "invalid decimal character: 0x{:02X}",
                c
            )))
        }
    })
}

/// Slice `len` bytes at `offset` or fail with a framing error naming `what`
pub fn take<'a>(data: &'a [u8], offset: usize, len: usize, what: &str) -> LoveResult<&'a [u8]> {
    data.get(offset..offset + len).ok_or_else(|| {
        LoveError::framing(format!(
            "{} field missing: need {} bytes at offset {}, payload has {}",
            what,
            len,
            offset,
            data.len()
        ))
    })
}
