//! # Numeric Conversion
//!
//! Fixed-point scaling between engineering values and the Lovelink wire
//! representation, plus per-model decoding of response payloads.
//!
//! Values travel as an unsigned decimal magnitude scaled by
//! `10^decimal_points`, with the sign carried separately. Where the sign
//! and the decimal points come from depends on the model family:
//!
//! | Field | 1600 | 16A family |
//! |-------|------|------------|
//! | getValue sign | status bit 0 | status bit 0 |
//! | getValue decimal points | session cache | status bits 4..5 |
//! | signed reading sign | 2-digit decimal field | info bit 0 |
//! | signed reading decimal points | session cache | info bits 4..5 |

use std::fmt;

use tracing::debug;

use crate::constants::{status_1600, status_16a, MAX_DECIMAL_POINTS, MAX_MAGNITUDE};
use crate::error::{LoveError, LoveResult};
use crate::field::{parse_decimal, parse_hex, take};
use crate::model::{Command, ControllerModel, ModelFamily, ResponseLayout};

/// Offset of the data fields within a payload (after the 2-char address)
const DATA_OFFSET: usize = 2;

// ============================================================================
// Scaling
// ============================================================================

/// `10^decimal_points`
#[inline]
pub fn scale_factor(decimal_points: u8) -> f64 {
    10f64.powi(i32::from(decimal_points))
}

fn check_decimal_points(decimal_points: u8) -> LoveResult<()> {
    if decimal_points > MAX_DECIMAL_POINTS {
        return Err(LoveError::invalid_data(format!(
            "decimal points {} out of range 0..={}",
            decimal_points, MAX_DECIMAL_POINTS
        )));
    }
    Ok(())
}

/// Magnitude and sign as they appear in a write request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireValue {
    pub magnitude: u16,
    pub negative: bool,
}

impl WireValue {
    /// Sign field value: `0xFF` for negative, `0x00` otherwise
    #[inline]
    pub fn sign_byte(&self) -> u8 {
        if self.negative {
            0xFF
        } else {
            0x00
        }
    }
}

/// Scale `value` into a write magnitude and sign
///
/// The magnitude is `round(|value| * 10^decimal_points)` and must fit the
/// 4-digit data field.
pub fn encode_value(value: f64, decimal_points: u8) -> LoveResult<WireValue> {
    check_decimal_points(decimal_points)?;
    if !value.is_finite() {
        return Err(LoveError::invalid_data(format!(
            "cannot encode non-finite value {}",
            value
        )));
    }

    let scaled = (value.abs() * scale_factor(decimal_points)).round();
    if scaled > f64::from(MAX_MAGNITUDE) {
        return Err(LoveError::invalid_data(format!(
            "value {} with {} decimal points exceeds {} digits",
            value,
            decimal_points,
            crate::constants::MAGNITUDE_DIGITS
        )));
    }

    Ok(WireValue {
        magnitude: scaled as u16,
        negative: value < 0.0 && scaled > 0.0,
    })
}

/// Apply sign and decimal points to a raw magnitude
#[inline]
pub fn decode_value(magnitude: u32, negative: bool, decimal_points: u8) -> f64 {
    let value = f64::from(magnitude) / scale_factor(decimal_points);
    if negative {
        -value
    } else {
        value
    }
}

// ============================================================================
// Status Word
// ============================================================================

/// Controller status word from a getValue/getAlStatus response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusWord {
    pub raw: u16,
    pub family: ModelFamily,
}

impl StatusWord {
    pub fn new(raw: u16, family: ModelFamily) -> Self {
        Self { raw, family }
    }

    fn bit(&self, m1600: u16, m16a: u16) -> bool {
        let mask = match self.family {
            ModelFamily::Series1600 => m1600,
            ModelFamily::Series16A => m16a,
        };
        self.raw & mask != 0
    }

    /// Automatic (true) or manual control
    pub fn is_auto(&self) -> bool {
        self.bit(status_1600::AUTO, status_16a::AUTO)
    }

    /// Remote communications enabled
    pub fn is_remote(&self) -> bool {
        self.bit(status_1600::COMM, status_16a::COMM)
    }

    pub fn has_error(&self) -> bool {
        self.bit(status_1600::ERROR, status_16a::ERROR)
    }

    pub fn is_alarm(&self) -> bool {
        self.bit(status_1600::ALARM, status_16a::ALARM)
    }

    pub fn is_output_active(&self) -> bool {
        self.bit(status_1600::OUTPUT_ACTIVE, status_16a::OUTPUT_ACTIVE)
    }

    pub fn is_negative(&self) -> bool {
        self.bit(status_1600::SIGN, status_16a::SIGN)
    }

    /// Setpoint type field (1 bit on the 1600, 2 bits on the 16A family)
    pub fn setpoint_type(&self) -> u8 {
        match self.family {
            ModelFamily::Series1600 => u8::from(self.raw & status_1600::SETPOINT_TYPE != 0),
            ModelFamily::Series16A => ((self.raw & status_16a::SETPOINT_TYPE) >> 8) as u8,
        }
    }

    /// Decimal points, only carried by the 16A family
    pub fn decimal_points(&self) -> Option<u8> {
        match self.family {
            ModelFamily::Series1600 => None,
            ModelFamily::Series16A => Some(info_decimal_points(self.raw)),
        }
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04X} [{} {} alarm={} error={} active={}]",
            self.raw,
            if self.is_auto() { "auto" } else { "manual" },
            if self.is_remote() { "remote" } else { "local" },
            self.is_alarm(),
            self.has_error(),
            self.is_output_active()
        )
    }
}

#[inline]
fn info_decimal_points(raw: u16) -> u8 {
    ((raw & status_16a::DECIMAL_POINTS) >> status_16a::DECIMAL_POINTS_SHIFT) as u8
}

// ============================================================================
// Response Decoding
// ============================================================================

/// Typed result of one transaction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// Scaled analog value
    Analog(f64),
    /// Alarm or communication state
    Binary(bool),
    /// Alarm mode or input type code
    Discrete(u32),
    /// Decimal points reported by the controller
    DecimalPoints(u8),
    /// Write command accepted
    Accepted,
}

impl Reading {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Reading::Analog(v) => Some(*v),
            Reading::DecimalPoints(dp) => Some(f64::from(*dp)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Reading::Binary(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Analog(v) => write!(f, "{}", v),
            Reading::Binary(b) => write!(f, "{}", b),
            Reading::Discrete(v) => write!(f, "{}", v),
            Reading::DecimalPoints(dp) => write!(f, "{} dp", dp),
            Reading::Accepted => f.write_str("accepted"),
        }
    }
}

/// Decoded response plus any decimal points it revealed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decoded {
    pub reading: Reading,
    pub decimal_points: Option<u8>,
}

impl Decoded {
    fn plain(reading: Reading) -> Self {
        Self {
            reading,
            decimal_points: None,
        }
    }
}

/// Decode a stripped response payload (address + data) for `command`
///
/// `decimal_points` is the session's cached value, used whenever the
/// response itself does not carry decimal points.
pub fn decode_reading(
    model: ControllerModel,
    command: Command,
    payload: &[u8],
    decimal_points: u8,
) -> LoveResult<Decoded> {
    let family = model.family();

    let decoded = match command.layout() {
        ResponseLayout::Value => {
            let stat = StatusWord::new(parse_hex(take(payload, DATA_OFFSET, 4, "status")?)?, family);
            let magnitude = parse_decimal(magnitude_field(payload, DATA_OFFSET + 4)?)?;
            let dp = stat.decimal_points().unwrap_or(decimal_points);
            Decoded {
                reading: Reading::Analog(decode_value(magnitude, stat.is_negative(), dp)),
                decimal_points: stat.decimal_points(),
            }
        }
        ResponseLayout::AlarmStatus => {
            let stat = StatusWord::new(parse_hex(take(payload, DATA_OFFSET, 4, "status")?)?, family);
            Decoded::plain(Reading::Binary(stat.is_alarm()))
        }
        ResponseLayout::Signed => {
            let info = take(payload, DATA_OFFSET, 2, "info")?;
            let magnitude = parse_decimal(magnitude_field(payload, DATA_OFFSET + 2)?)?;
            match family {
                ModelFamily::Series1600 => {
                    let negative = parse_decimal(info)? != 0;
                    Decoded::plain(Reading::Analog(decode_value(
                        magnitude,
                        negative,
                        decimal_points,
                    )))
                }
                ModelFamily::Series16A => {
                    let info = parse_hex(info)?;
                    let dp = info_decimal_points(info);
                    Decoded {
                        reading: Reading::Analog(decode_value(
                            magnitude,
                            info & status_16a::SIGN != 0,
                            dp,
                        )),
                        decimal_points: Some(dp),
                    }
                }
            }
        }
        ResponseLayout::CommStatus => {
            let flag = take(payload, DATA_OFFSET, 2, "comm status")?;
            let value = match family {
                ModelFamily::Series1600 => parse_decimal(flag)?,
                ModelFamily::Series16A => u32::from(parse_hex(flag)?),
            };
            Decoded::plain(Reading::Binary(value != 0))
        }
        ResponseLayout::Discrete => {
            let value = parse_hex(take(payload, DATA_OFFSET, 2, command.name())?)?;
            Decoded::plain(Reading::Discrete(u32::from(value)))
        }
        ResponseLayout::DecimalPoints => {
            let dp = parse_decimal(take(payload, DATA_OFFSET, 2, "decimal points")?)?;
            if dp > u32::from(MAX_DECIMAL_POINTS) {
                return Err(LoveError::invalid_data(format!(
                    "controller reported {} decimal points",
                    dp
                )));
            }
            let dp = dp as u8;
            Decoded {
                reading: Reading::DecimalPoints(dp),
                decimal_points: Some(dp),
            }
        }
        ResponseLayout::WriteAck => {
            let code = parse_decimal(take(payload, DATA_OFFSET, 2, "write response")?)?;
            if code != 0 {
                debug!("{} not accepted, response code {:02}", command, code);
                return Err(LoveError::CommandRejected {
                    code: code.min(99) as u8,
                });
            }
            Decoded::plain(Reading::Accepted)
        }
    };

    Ok(decoded)
}

/// Magnitude runs from `offset` to the end of the payload
fn magnitude_field(payload: &[u8], offset: usize) -> LoveResult<&[u8]> {
    match payload.get(offset..) {
        Some(field) if !field.is_empty() => Ok(field),
        _ => Err(LoveError::framing(format!(
            "magnitude field missing at offset {} (payload {} bytes)",
            offset,
            payload.len()
        ))),
    }
}
