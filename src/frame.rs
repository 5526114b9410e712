//! Lovelink frame codec
//!
//! Outgoing requests:
//!
//! ```text
//! STX 'L' addr(2 hex) code(2|4 hex) [magnitude(4 dec) sign(2 hex)] cs(2 hex) [ETX]
//! ```
//!
//! Incoming responses:
//!
//! ```text
//! STX 'L' addr(2 hex) data cs(2 hex) [ACK]
//! STX 'L' addr(2 hex) 'N' code(2 dec) [ACK]
//! ```
//!
//! The checksum covers everything between STX and the checksum field. ETX is
//! omitted when the transport appends its own output terminator, and the ACK
//! is absent when the transport consumed it as its input terminator. Each
//! port is configured for exactly one of each; nothing is auto-detected.

use std::fmt;

use tracing::{debug, warn};

use crate::checksum::checksum;
use crate::constants::{
    ACK, ADDRESS_LEN, CHECKSUM_LEN, ERROR_CODE_LEN, ERROR_INDICATOR, ETX, FILTER,
    MAGNITUDE_DIGITS, MAX_FRAME_SIZE, MIN_ADDRESS, STX,
};
use crate::convert::encode_value;
use crate::error::{LoveError, LoveResult};
use crate::field::{ascii_hex_to_byte, byte_to_ascii_hex, parse_decimal};

// ============================================================================
// Terminator Modes
// ============================================================================

/// Who terminates outgoing frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminatorMode {
    /// Codec appends ETX
    #[default]
    Appended,
    /// Transport appends ETX as its output end-of-message byte
    SuppliedByTransport,
}

/// What the transport leaves at the end of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// Trailing ACK is still in the buffer
    #[default]
    Preserved,
    /// Transport consumed ACK as its input end-of-message byte
    Stripped,
}

// ============================================================================
// Frame Buffer
// ============================================================================

/// Bounded frame buffer
#[derive(Clone)]
pub struct Frame {
    data: [u8; MAX_FRAME_SIZE],
    len: usize,
}

impl Frame {
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0; MAX_FRAME_SIZE],
            len: 0,
        }
    }

    /// Copy raw bytes into a frame
    pub fn from_slice(data: &[u8]) -> LoveResult<Self> {
        let mut frame = Self::new();
        frame.extend(data)?;
        Ok(frame)
    }

    #[inline]
    pub fn push(&mut self, byte: u8) -> LoveResult<()> {
        if self.len >= MAX_FRAME_SIZE {
            return Err(LoveError::framing("frame buffer full"));
        }
        self.data[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    #[inline]
    pub fn extend(&mut self, data: &[u8]) -> LoveResult<()> {
        if self.len + data.len() > MAX_FRAME_SIZE {
            return Err(LoveError::framing(format!(
                "frame would exceed max size: {} + {} > {}",
                self.len,
                data.len(),
                MAX_FRAME_SIZE
            )));
        }
        self.data[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        Ok(())
    }

    /// Append a byte as two uppercase hex digits
    #[inline]
    pub fn push_hex(&mut self, byte: u8) -> LoveResult<()> {
        self.extend(&byte_to_ascii_hex(byte))
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({})", format_frame(self.as_slice()))
    }
}

impl PartialEq<[u8]> for Frame {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_slice() == other
    }
}

/// Render a frame for logs, control bytes as `<STX>`, `<ETX>`, `<ACK>`
pub fn format_frame(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() + 10);
    for &b in data {
        match b {
            STX => out.push_str("<STX>"),
            ETX => out.push_str("<ETX>"),
            ACK => out.push_str("<ACK>"),
            0x20..=0x7E => out.push(b as char),
            _ => out.push_str(&format!("<{:02X}>", b)),
        }
    }
    out
}

// ============================================================================
// Encoding
// ============================================================================

fn check_code(code: &str) -> LoveResult<()> {
    let valid_width = code.len() == 2 || code.len() == 4;
    let valid_chars = code
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b));
    if !valid_width || !valid_chars {
        return Err(LoveError::invalid_command(format!(
            "address code '{}' is not 2 or 4 uppercase hex digits",
            code
        )));
    }
    Ok(())
}

/// Build a request frame
///
/// `value` adds the magnitude and sign fields, scaled by `decimal_points`.
pub fn encode_request(
    address: u8,
    code: &str,
    value: Option<f64>,
    decimal_points: u8,
    terminator: TerminatorMode,
) -> LoveResult<Frame> {
    if address < MIN_ADDRESS {
        return Err(LoveError::invalid_data(format!(
            "illegal controller address {}",
            address
        )));
    }
    check_code(code)?;

    let mut frame = Frame::new();
    frame.push(STX)?;
    frame.push(FILTER)?;
    frame.push_hex(address)?;
    frame.extend(code.as_bytes())?;

    if let Some(v) = value {
        let wire = encode_value(v, decimal_points)?;
        let digits = format!("{:0width$}", wire.magnitude, width = MAGNITUDE_DIGITS);
        frame.extend(digits.as_bytes())?;
        frame.push_hex(wire.sign_byte())?;
    }

    let cs = checksum(&frame.as_slice()[1..]);
    frame.push_hex(cs)?;

    if terminator == TerminatorMode::Appended {
        frame.push(ETX)?;
    }

    debug!("Built request: {}", format_frame(frame.as_slice()));
    Ok(frame)
}

// ============================================================================
// Decoding
// ============================================================================

/// Validate a response and return its payload (address + data)
///
/// Error frames fail with [`LoveError::Controller`]; a bad checksum fails
/// with [`LoveError::ChecksumMismatch`].
pub fn decode_response(bytes: &[u8], ack: AckMode) -> LoveResult<&[u8]> {
    debug!("Evaluating response: {}", format_frame(bytes));

    if bytes.first() != Some(&STX) {
        warn!("Invalid STX in response: {}", format_frame(bytes));
        return Err(LoveError::framing("response does not start with STX"));
    }
    if bytes.get(1) != Some(&FILTER) {
        warn!("Invalid filter in response: {}", format_frame(bytes));
        return Err(LoveError::framing("response filter byte is not 'L'"));
    }

    let end = match ack {
        AckMode::Preserved => {
            if bytes.last() != Some(&ACK) || bytes.len() < 3 {
                return Err(LoveError::framing("response does not end with ACK"));
            }
            bytes.len() - 1
        }
        AckMode::Stripped => bytes.len(),
    };
    let body = &bytes[2..end];

    if body.len() > ADDRESS_LEN && body[ADDRESS_LEN] == ERROR_INDICATOR {
        let code_field = body
            .get(ADDRESS_LEN + 1..ADDRESS_LEN + 1 + ERROR_CODE_LEN)
            .ok_or_else(|| LoveError::framing("error response without error code"))?;
        let code = parse_decimal(code_field)?.min(99) as u8;
        let err = LoveError::controller(code);
        warn!("Controller reported error: {}", err);
        return Err(err);
    }

    if body.len() < ADDRESS_LEN + CHECKSUM_LEN {
        return Err(LoveError::framing(format!(
            "response too short: {} bytes between filter and terminator",
            body.len()
        )));
    }

    let split = body.len() - CHECKSUM_LEN;
    let (payload, cs_field) = body.split_at(split);
    let expected = checksum(&bytes[1..2 + split]);

    // a non-hex checksum field is a mismatch like any other
    let received = ascii_hex_to_byte(cs_field).ok();
    if received != Some(expected) {
        warn!(
            "Checksum failure: computed {:02X}, received {}",
            expected,
            format_frame(cs_field)
        );
        return Err(LoveError::ChecksumMismatch {
            expected,
            received: received.unwrap_or(0),
        });
    }

    Ok(payload)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a valid response frame around `payload`
    pub(crate) fn response(payload: &[u8], ack: AckMode) -> Vec<u8> {
        let mut out = vec![STX, FILTER];
        out.extend_from_slice(payload);
        let cs = checksum(&out[1..]);
        out.extend_from_slice(&byte_to_ascii_hex(cs));
        if ack == AckMode::Preserved {
            out.push(ACK);
        }
        out
    }

    #[test]
    fn test_encode_read_request() {
        let frame = encode_request(1, "00", None, 1, TerminatorMode::Appended).unwrap();
        assert_eq!(frame.as_slice(), b"\x02L01000D\x03");
    }

    #[test]
    fn test_encode_omits_etx_when_transport_supplies_it() {
        let frame = encode_request(1, "00", None, 1, TerminatorMode::SuppliedByTransport).unwrap();
        assert_eq!(frame.as_slice(), b"\x02L01000D");
    }

    #[test]
    fn test_encode_write_request_with_negative_value() {
        let frame =
            encode_request(0x1F, "0208", Some(-5.5), 1, TerminatorMode::Appended).unwrap();
        let body = b"L1F02080055FF";
        let mut expected = vec![STX];
        expected.extend_from_slice(body);
        expected.extend_from_slice(&byte_to_ascii_hex(checksum(body)));
        expected.push(ETX);
        assert_eq!(frame.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_encode_rejects_bad_arguments() {
        assert!(encode_request(0, "00", None, 1, TerminatorMode::Appended).is_err());
        assert!(encode_request(1, "0a", None, 1, TerminatorMode::Appended).is_err());
        assert!(encode_request(1, "012", None, 1, TerminatorMode::Appended).is_err());
        assert!(encode_request(1, "0200", Some(12345.0), 1, TerminatorMode::Appended).is_err());
    }

    #[test]
    fn test_decode_valid_response_both_modes() {
        for ack in [AckMode::Preserved, AckMode::Stripped] {
            let raw = response(b"0100011234", ack);
            assert_eq!(decode_response(&raw, ack).unwrap(), b"0100011234");
        }
    }

    #[test]
    fn test_ack_mode_mismatch_is_detected() {
        // a stripped frame read as if the ACK were still present
        let raw = response(b"0100", AckMode::Stripped);
        assert!(decode_response(&raw, AckMode::Preserved).is_err());

        // a preserved frame read as stripped shifts the checksum window
        let raw = response(b"0100", AckMode::Preserved);
        assert!(decode_response(&raw, AckMode::Stripped).is_err());
    }

    #[test]
    fn test_decode_error_frame() {
        let raw = b"\x02L01N03\x06";
        let err = decode_response(raw, AckMode::Preserved).unwrap_err();
        assert_eq!(
            err,
            LoveError::Controller {
                code: 3,
                message: "Command not performed by instrument."
            }
        );

        let raw = b"\x02L01N08";
        assert!(matches!(
            decode_response(raw, AckMode::Stripped),
            Err(LoveError::Controller { code: 8, .. })
        ));
    }

    #[test]
    fn test_decode_checksum_mismatch() {
        let mut raw = response(b"0100011234", AckMode::Preserved);
        let cs_pos = raw.len() - 3;
        raw[cs_pos] = if raw[cs_pos] == b'0' { b'1' } else { b'0' };
        assert!(matches!(
            decode_response(&raw, AckMode::Preserved),
            Err(LoveError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_non_hex_checksum_field_is_a_mismatch() {
        let mut raw = response(b"01401234", AckMode::Preserved);
        let cs_pos = raw.len() - 3;
        raw[cs_pos] = b'Z';
        raw[cs_pos + 1] = b'Z';
        assert_eq!(&raw[..], b"\x02L01401234ZZ\x06");
        assert!(matches!(
            decode_response(&raw, AckMode::Preserved),
            Err(LoveError::ChecksumMismatch { received: 0, .. })
        ));

        // one bad digit, stripped mode
        let mut raw = response(b"0100", AckMode::Stripped);
        let last = raw.len() - 1;
        raw[last] = b'g';
        assert!(matches!(
            decode_response(&raw, AckMode::Stripped),
            Err(LoveError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_any_payload_mutation_breaks_checksum() {
        let payload = b"0100211234";
        let clean = response(payload, AckMode::Preserved);
        for i in 0..payload.len() {
            let mut raw = clean.clone();
            // stay printable and avoid turning byte 2 into the error indicator
            raw[2 + i] = if raw[2 + i] == b'7' { b'8' } else { b'7' };
            assert!(
                matches!(
                    decode_response(&raw, AckMode::Preserved),
                    Err(LoveError::ChecksumMismatch { .. })
                ),
                "mutation at {} not detected",
                i
            );
        }
    }

    #[test]
    fn test_decode_framing_errors() {
        assert!(matches!(
            decode_response(b"L0100\x06", AckMode::Preserved),
            Err(LoveError::Framing { .. })
        ));
        assert!(matches!(
            decode_response(b"\x02X0100\x06", AckMode::Preserved),
            Err(LoveError::Framing { .. })
        ));
        assert!(matches!(
            decode_response(b"\x02L0\x06", AckMode::Preserved),
            Err(LoveError::Framing { .. })
        ));
        assert!(matches!(
            decode_response(b"\x02L01N\x06", AckMode::Preserved),
            Err(LoveError::Framing { .. })
        ));
        assert!(decode_response(b"", AckMode::Stripped).is_err());
    }

    #[test]
    fn test_frame_capacity() {
        let mut frame = Frame::new();
        assert!(frame.extend(&[0u8; MAX_FRAME_SIZE]).is_ok());
        assert!(frame.push(0).is_err());
        assert_eq!(frame.len(), MAX_FRAME_SIZE);
    }

    #[test]
    fn test_format_frame() {
        assert_eq!(format_frame(b"\x02L01000D\x03"), "<STX>L01000D<ETX>");
        assert_eq!(format_frame(&[ACK, 0x00]), "<ACK><00>");
    }
}
