//! Lovelink protocol constants
//!
//! Control bytes, field widths, status-word bit layouts and the fixed
//! controller error table. These values are part of the wire contract with
//! the physical controllers.

// ============================================================================
// Control Bytes
// ============================================================================

/// Start of every frame in both directions
pub const STX: u8 = 0x02;

/// Terminates an outgoing request
pub const ETX: u8 = 0x03;

/// Terminates an incoming response
pub const ACK: u8 = 0x06;

/// Filter byte following STX in both directions
pub const FILTER: u8 = b'L';

/// Marks an error response in place of the payload data
pub const ERROR_INDICATOR: u8 = b'N';

// ============================================================================
// Field Widths
// ============================================================================

/// Controller address: 2 uppercase hex digits
pub const ADDRESS_LEN: usize = 2;

/// Checksum field: 2 uppercase hex digits
pub const CHECKSUM_LEN: usize = 2;

/// Write magnitude: 4 decimal digits
pub const MAGNITUDE_DIGITS: usize = 4;

/// Write sign: 2 hex digits, `00` or `FF`
pub const SIGN_LEN: usize = 2;

/// Largest magnitude that fits the 4-digit data field
pub const MAX_MAGNITUDE: u16 = 9999;

/// Error code field after the error indicator
pub const ERROR_CODE_LEN: usize = 2;

/// Largest frame either side ever produces
///
/// Outgoing: STX + filter + addr(2) + code(4) + magnitude(4) + sign(2) + cs(2) + ETX = 17.
/// Incoming: STX + filter + addr(2) + data(up to 8) + cs(2) + ACK = 15.
pub const MAX_FRAME_SIZE: usize = 32;

/// Read size requested from the transport per response
pub const MAX_RESPONSE_SIZE: usize = 50;

// ============================================================================
// Addressing
// ============================================================================

/// Lowest valid controller address
pub const MIN_ADDRESS: u8 = 1;

/// Highest valid controller address
pub const MAX_ADDRESS: u8 = 255;

// ============================================================================
// Decimal Points
// ============================================================================

/// Decimal points assumed before the first successful acquisition
pub const DEFAULT_DECIMAL_POINTS: u8 = 1;

/// Largest decimal-points value a controller reports
pub const MAX_DECIMAL_POINTS: u8 = 3;

// ============================================================================
// Transaction Defaults
// ============================================================================

/// Attempts per transaction before giving up with a timeout
pub const DEFAULT_RETRIES: u32 = 3;

/// Controller turnaround delay before every write
pub const DEFAULT_INTER_COMMAND_DELAY_MS: u64 = 40;

/// Per-operation transport timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

// ============================================================================
// Status Word Bits
// ============================================================================

/// 1600 series status word
pub mod status_1600 {
    pub const AUTO: u16 = 0x8000;
    pub const COMM: u16 = 0x4000;
    pub const ERROR: u16 = 0x1000;
    pub const ALARM: u16 = 0x0800;
    pub const SETPOINT_TYPE: u16 = 0x0200;
    pub const OUTPUT_ACTIVE: u16 = 0x0002;
    pub const SIGN: u16 = 0x0001;
}

/// 16A family (16A, 32A, 2600, 8600) status word
pub mod status_16a {
    pub const AUTO: u16 = 0x8000;
    pub const COMM: u16 = 0x4000;
    pub const ERROR: u16 = 0x1000;
    pub const ALARM: u16 = 0x0800;
    pub const SETPOINT_TYPE: u16 = 0x0300;
    pub const OUTPUT_ACTIVE: u16 = 0x0080;
    pub const DECIMAL_POINTS: u16 = 0x0030;
    pub const DECIMAL_POINTS_SHIFT: u16 = 4;
    pub const SIGN: u16 = 0x0001;
}

// ============================================================================
// Controller Error Table
// ============================================================================

const ERROR_MESSAGES: [&str; 11] = [
    "Not used.",
    "Undefined command. Command not within acceptable range.",
    "Checksum error on received data from Host.",
    "Command not performed by instrument.",
    "Illegal ASCII characters received.",
    "Data field error. Not enough, too many, or improper positioning.",
    "Undefined command. Command not within acceptable range.",
    "Not used.",
    "Hardware fault. Return to Factory for service.",
    "Hardware fault. Return to Factory for service.",
    "Undefined command. Command not within acceptable range.",
];

/// Message for a controller error code
///
/// Codes outside the 11-entry table map to `"Unknown error code."`.
pub fn error_message(code: u8) -> &'static str {
    ERROR_MESSAGES
        .get(code as usize)
        .copied()
        .unwrap_or("Unknown error code.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_table() {
        assert_eq!(error_message(0), "Not used.");
        assert_eq!(error_message(7), "Not used.");
        assert_eq!(error_message(3), "Command not performed by instrument.");
        assert_eq!(
            error_message(8),
            "Hardware fault. Return to Factory for service."
        );
        assert_eq!(
            error_message(10),
            "Undefined command. Command not within acceptable range."
        );
        assert_eq!(error_message(11), "Unknown error code.");
    }

    #[test]
    fn test_frame_size_covers_longest_request() {
        let longest = 1 + 1 + ADDRESS_LEN + 4 + MAGNITUDE_DIGITS + SIGN_LEN + CHECKSUM_LEN + 1;
        assert!(longest <= MAX_FRAME_SIZE);
    }
}
