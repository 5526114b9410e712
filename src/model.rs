//! # Controller Models and Commands
//!
//! Static tables mapping the 20 abstract Lovelink commands onto the
//! per-model address codes understood by the controllers.
//!
//! | Model | Supported | Decimal points | Sign |
//! |-------|-----------|----------------|------|
//! | 1600  | yes | queried before every transaction | status bit / sign field |
//! | 16A   | yes | status bits on reads, queried before writes | status bit |
//! | 32A   | no  | (16A family) | (16A family) |
//! | 2600  | no  | (16A family) | (16A family) |
//! | 8600  | no  | (16A family) | (16A family) |

use std::fmt;
use std::str::FromStr;

use crate::error::{LoveError, LoveResult};

/// Number of entries in every model's command table
pub const COMMAND_COUNT: usize = 20;

// ============================================================================
// Commands
// ============================================================================

/// Direction of the record a command is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => f.write_str("read"),
            Direction::Write => f.write_str("write"),
        }
    }
}

/// Kind of value a command produces or consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Scaled floating point value
    Analog,
    /// On/off state or trigger
    Binary,
    /// Small enumerated value
    MultiBit,
}

/// Shape of the data following the address in a response payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseLayout {
    /// Status word (4 hex) then magnitude
    Value,
    /// Status word (4 hex), alarm bit only
    AlarmStatus,
    /// Info field (2 chars) then magnitude
    Signed,
    /// 2-char flag
    CommStatus,
    /// 2 hex digits
    Discrete,
    /// 2 decimal digits, 0..=3
    DecimalPoints,
    /// 2 decimal digits, zero when the write was accepted
    WriteAck,
}

/// Abstract Lovelink operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    GetValue,
    GetSp1,
    GetSp2,
    GetAlLo,
    GetAlHi,
    GetPeak,
    GetValley,
    GetAlStatus,
    GetAlMode,
    GetInpType,
    GetCommStatus,
    GetDecPt,
    PutSp1,
    PutSp2,
    PutAlLo,
    PutAlHi,
    ResetPeak,
    ResetValley,
    SetRemote,
    SetLocal,
}

impl Command {
    /// All commands in table order
    pub const ALL: [Command; COMMAND_COUNT] = [
        Command::GetValue,
        Command::GetSp1,
        Command::GetSp2,
        Command::GetAlLo,
        Command::GetAlHi,
        Command::GetPeak,
        Command::GetValley,
        Command::GetAlStatus,
        Command::GetAlMode,
        Command::GetInpType,
        Command::GetCommStatus,
        Command::GetDecPt,
        Command::PutSp1,
        Command::PutSp2,
        Command::PutAlLo,
        Command::PutAlHi,
        Command::ResetPeak,
        Command::ResetValley,
        Command::SetRemote,
        Command::SetLocal,
    ];

    /// Look up a command by its table index
    pub fn from_index(index: usize) -> LoveResult<Self> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(LoveError::UnknownCommand { index })
    }

    /// Position in the command table
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Name used in configuration and reports
    pub fn name(self) -> &'static str {
        match self {
            Command::GetValue => "getValue",
            Command::GetSp1 => "getSP1",
            Command::GetSp2 => "getSP2",
            Command::GetAlLo => "getAlLo",
            Command::GetAlHi => "getAlHi",
            Command::GetPeak => "getPeak",
            Command::GetValley => "getValley",
            Command::GetAlStatus => "getAlStatus",
            Command::GetAlMode => "getAlMode",
            Command::GetInpType => "getInpType",
            Command::GetCommStatus => "getCommStatus",
            Command::GetDecPt => "getDecPt",
            Command::PutSp1 => "putSP1",
            Command::PutSp2 => "putSP2",
            Command::PutAlLo => "putAlLo",
            Command::PutAlHi => "putAlHi",
            Command::ResetPeak => "resetPeak",
            Command::ResetValley => "resetValley",
            Command::SetRemote => "setRemote",
            Command::SetLocal => "setLocal",
        }
    }

    /// Reads come before `putSP1` in the table, writes from there on
    ///
    /// ```
    /// use lovelink::{Command, Direction};
    ///
    /// assert_eq!(Command::GetDecPt.direction(), Direction::Read);
    /// assert_eq!(Command::PutSp1.direction(), Direction::Write);
    /// ```
    pub fn direction(self) -> Direction {
        if self.index() < Command::PutSp1.index() {
            Direction::Read
        } else {
            Direction::Write
        }
    }

    /// Kind of record the command is bound to
    pub fn record_kind(self) -> RecordKind {
        match self {
            Command::GetAlStatus | Command::GetCommStatus => RecordKind::Binary,
            Command::GetAlMode | Command::GetInpType => RecordKind::MultiBit,
            Command::ResetPeak | Command::ResetValley | Command::SetRemote | Command::SetLocal => {
                RecordKind::Binary
            }
            _ => RecordKind::Analog,
        }
    }

    /// How the response payload is decoded
    pub fn layout(self) -> ResponseLayout {
        match self {
            Command::GetValue => ResponseLayout::Value,
            Command::GetAlStatus => ResponseLayout::AlarmStatus,
            Command::GetSp1
            | Command::GetSp2
            | Command::GetAlLo
            | Command::GetAlHi
            | Command::GetPeak
            | Command::GetValley => ResponseLayout::Signed,
            Command::GetCommStatus => ResponseLayout::CommStatus,
            Command::GetAlMode | Command::GetInpType => ResponseLayout::Discrete,
            Command::GetDecPt => ResponseLayout::DecimalPoints,
            _ => ResponseLayout::WriteAck,
        }
    }

    /// Whether the request frame carries a magnitude and sign field
    pub fn carries_value(self) -> bool {
        matches!(
            self,
            Command::PutSp1 | Command::PutSp2 | Command::PutAlLo | Command::PutAlHi
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Command {
    type Err = LoveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|cmd| cmd.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| LoveError::invalid_command(format!("unknown command name '{}'", s)))
    }
}

// ============================================================================
// Models
// ============================================================================

/// Decoding family a model belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// 1600 series
    Series1600,
    /// 16A, 32A, 2600 and 8600
    Series16A,
}

/// Where a model's decimal-points value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalPolicy {
    /// Queried with getDecPt before every read and write
    Queried,
    /// Carried in response status bits; queried only before writes
    StatusBits,
}

/// How a model reports the sign of signed readings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignPolicy {
    /// Dedicated decimal sign field, non-zero is negative
    SignField,
    /// Bit 0 of the status or info field
    StatusBit,
}

/// Supported hardware variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerModel {
    M16A,
    M32A,
    M1600,
    M2600,
    M8600,
}

const CODES_16A: [&str; COMMAND_COUNT] = [
    "00", "0101", "0105", "0106", "0107", "011D", "011E", "00", "031D", "0317", "0324", "031A",
    "0200", "0204", "0207", "0208", "040A", "040B", "0400", "0401",
];

const CODES_1600: [&str; COMMAND_COUNT] = [
    "00", "0100", "0102", "0104", "0105", "011A", "011B", "00", "0337", "0323", "032A", "0324",
    "0200", "0202", "0204", "0205", "0407", "0408", "0400", "0401",
];

impl ControllerModel {
    pub const ALL: [ControllerModel; 5] = [
        ControllerModel::M16A,
        ControllerModel::M32A,
        ControllerModel::M1600,
        ControllerModel::M2600,
        ControllerModel::M8600,
    ];

    /// Model name as used in configuration
    pub fn name(self) -> &'static str {
        match self {
            ControllerModel::M16A => "16A",
            ControllerModel::M32A => "32A",
            ControllerModel::M1600 => "1600",
            ControllerModel::M2600 => "2600",
            ControllerModel::M8600 => "8600",
        }
    }

    /// Only the 16A and 1600 are supported
    pub fn is_supported(self) -> bool {
        matches!(self, ControllerModel::M16A | ControllerModel::M1600)
    }

    pub fn family(self) -> ModelFamily {
        match self {
            ControllerModel::M1600 => ModelFamily::Series1600,
            _ => ModelFamily::Series16A,
        }
    }

    pub fn decimal_policy(self) -> DecimalPolicy {
        match self.family() {
            ModelFamily::Series1600 => DecimalPolicy::Queried,
            ModelFamily::Series16A => DecimalPolicy::StatusBits,
        }
    }

    pub fn sign_policy(self) -> SignPolicy {
        match self.family() {
            ModelFamily::Series1600 => SignPolicy::SignField,
            ModelFamily::Series16A => SignPolicy::StatusBit,
        }
    }

    /// Whether a transaction for `command` must first fetch decimal points
    pub fn needs_decimal_points(self, command: Command) -> bool {
        if command == Command::GetDecPt {
            return false;
        }
        match self.decimal_policy() {
            DecimalPolicy::Queried => true,
            DecimalPolicy::StatusBits => command.direction() == Direction::Write,
        }
    }

    /// Full address-code table, regardless of support
    pub fn codes(self) -> &'static [&'static str; COMMAND_COUNT] {
        match self.family() {
            ModelFamily::Series1600 => &CODES_1600,
            ModelFamily::Series16A => &CODES_16A,
        }
    }
}

impl fmt::Display for ControllerModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ControllerModel {
    type Err = LoveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| LoveError::unsupported_model(s))
    }
}

/// Address code `command` uses on `model`
///
/// Fails with [`LoveError::UnsupportedModel`] for models whose supported
/// flag is false.
pub fn resolve_command(model: ControllerModel, command: Command) -> LoveResult<&'static str> {
    if !model.is_supported() {
        return Err(LoveError::unsupported_model(model.name()));
    }
    Ok(model.codes()[command.index()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_supported_models() {
        assert_eq!(resolve_command(ControllerModel::M1600, Command::GetValue).unwrap(), "00");
        assert_eq!(resolve_command(ControllerModel::M1600, Command::GetPeak).unwrap(), "011A");
        assert_eq!(resolve_command(ControllerModel::M1600, Command::PutAlHi).unwrap(), "0205");
        assert_eq!(resolve_command(ControllerModel::M16A, Command::PutAlHi).unwrap(), "0208");
        assert_eq!(resolve_command(ControllerModel::M16A, Command::GetDecPt).unwrap(), "031A");
        assert_eq!(resolve_command(ControllerModel::M16A, Command::SetLocal).unwrap(), "0401");
    }

    #[test]
    fn test_unsupported_models_rejected() {
        for model in [ControllerModel::M32A, ControllerModel::M2600, ControllerModel::M8600] {
            let err = resolve_command(model, Command::GetValue).unwrap_err();
            assert_eq!(err, LoveError::unsupported_model(model.name()));
            // table is still present for reporting
            assert_eq!(model.codes(), &CODES_16A);
        }
    }

    #[test]
    fn test_codes_are_uppercase_hex_of_even_width() {
        for model in ControllerModel::ALL {
            for code in model.codes() {
                assert!(code.len() == 2 || code.len() == 4, "{}", code);
                assert!(code
                    .bytes()
                    .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b)));
            }
        }
    }

    #[test]
    fn test_command_index_lookup() {
        assert_eq!(Command::from_index(0).unwrap(), Command::GetValue);
        assert_eq!(Command::from_index(15).unwrap(), Command::PutAlHi);
        assert_eq!(Command::from_index(19).unwrap(), Command::SetLocal);
        assert_eq!(
            Command::from_index(20).unwrap_err(),
            LoveError::UnknownCommand { index: 20 }
        );
        for (i, cmd) in Command::ALL.iter().enumerate() {
            assert_eq!(cmd.index(), i);
        }
    }

    #[test]
    fn test_command_attributes() {
        assert_eq!(Command::GetDecPt.direction(), Direction::Read);
        assert_eq!(Command::PutSp1.direction(), Direction::Write);
        assert_eq!(Command::GetValue.record_kind(), RecordKind::Analog);
        assert_eq!(Command::GetDecPt.record_kind(), RecordKind::Analog);
        assert_eq!(Command::GetAlStatus.record_kind(), RecordKind::Binary);
        assert_eq!(Command::GetInpType.record_kind(), RecordKind::MultiBit);
        assert_eq!(Command::PutAlLo.record_kind(), RecordKind::Analog);
        assert_eq!(Command::SetRemote.record_kind(), RecordKind::Binary);
        assert!(Command::PutSp2.carries_value());
        assert!(!Command::ResetPeak.carries_value());
        assert_eq!(Command::ResetValley.layout(), ResponseLayout::WriteAck);
    }

    #[test]
    fn test_name_parsing() {
        assert_eq!("getSP1".parse::<Command>().unwrap(), Command::GetSp1);
        assert_eq!("PUTALHI".parse::<Command>().unwrap(), Command::PutAlHi);
        assert!("getNothing".parse::<Command>().is_err());

        assert_eq!("16a".parse::<ControllerModel>().unwrap(), ControllerModel::M16A);
        assert_eq!("1600".parse::<ControllerModel>().unwrap(), ControllerModel::M1600);
        assert!(matches!(
            "4C".parse::<ControllerModel>(),
            Err(LoveError::UnsupportedModel { .. })
        ));
    }

    #[test]
    fn test_decimal_point_acquisition_policy() {
        let m1600 = ControllerModel::M1600;
        let m16a = ControllerModel::M16A;
        assert!(m1600.needs_decimal_points(Command::GetValue));
        assert!(m1600.needs_decimal_points(Command::PutSp1));
        assert!(!m1600.needs_decimal_points(Command::GetDecPt));
        assert!(!m16a.needs_decimal_points(Command::GetValue));
        assert!(m16a.needs_decimal_points(Command::PutAlHi));
        assert!(m16a.needs_decimal_points(Command::ResetPeak));
    }
}
