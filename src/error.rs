//! Error types for Lovelink transactions
//!
//! Every failure a transaction can produce is a [`LoveError`] variant. Only
//! [`LoveError::Timeout`] is retried by the transaction engine; everything
//! else is surfaced to the caller on the first occurrence.

use std::fmt;

use thiserror::Error;

/// Result type used throughout the crate
pub type LoveResult<T> = Result<T, LoveError>;

/// Lovelink error taxonomy
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoveError {
    /// Write or read did not complete in time and the retry budget is spent
    #[error("Timeout error: {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Non-timeout failure reported by the byte transport
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Transport filled the read buffer before seeing the end-of-message byte
    #[error("Overflow error: {message}")]
    Overflow { message: String },

    /// Response checksum does not match the bytes it covers
    #[error("Checksum mismatch: expected {expected:#04X}, received {received:#04X}")]
    ChecksumMismatch { expected: u8, received: u8 },

    /// Controller answered with an error frame
    #[error("Controller error {code:02}: {message}")]
    Controller { code: u8, message: &'static str },

    /// Controller answered a write with a non-zero acceptance code
    #[error("Command not accepted by controller (code {code:02})")]
    CommandRejected { code: u8 },

    /// Model exists in the command table but cannot be driven
    #[error("Unsupported model: {model}")]
    UnsupportedModel { model: String },

    /// Command index outside the command table
    #[error("Unknown command index: {index}")]
    UnknownCommand { index: usize },

    /// Command does not fit the requested direction or value
    #[error("Invalid command: {message}")]
    InvalidCommand { message: String },

    /// Missing or incorrect start marker, filter byte or field layout
    #[error("Framing error: {message}")]
    Framing { message: String },

    /// Field contents could not be interpreted
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Address or port connection state error
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Port or manager misconfiguration
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl LoveError {
    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an overflow error
    pub fn overflow<S: Into<String>>(message: S) -> Self {
        Self::Overflow {
            message: message.into(),
        }
    }

    /// Create a controller error from its numeric code
    pub fn controller(code: u8) -> Self {
        Self::Controller {
            code,
            message: crate::constants::error_message(code),
        }
    }

    /// Create an unsupported model error
    pub fn unsupported_model<S: Into<String>>(model: S) -> Self {
        Self::UnsupportedModel {
            model: model.into(),
        }
    }

    /// Create an invalid command error
    pub fn invalid_command<S: Into<String>>(message: S) -> Self {
        Self::InvalidCommand {
            message: message.into(),
        }
    }

    /// Create a framing error
    pub fn framing<S: Into<String>>(message: S) -> Self {
        Self::Framing {
            message: message.into(),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data<S: Into<String>>(message: S) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Only timeouts restart the write/read pair
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Coarse status used by diagnostic reports
    pub fn status(&self) -> LinkStatus {
        match self {
            Self::Timeout { .. } => LinkStatus::Timeout,
            Self::Overflow { .. } => LinkStatus::Overflow,
            _ => LinkStatus::Error,
        }
    }
}

impl From<std::io::Error> for LoveError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => Self::timeout("I/O", 0),
            _ => Self::transport(err.to_string()),
        }
    }
}

/// Completion status of the last transaction on a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStatus {
    #[default]
    Ok,
    Timeout,
    Overflow,
    Error,
}

impl LinkStatus {
    /// Three-letter tag printed in reports
    pub fn tag(&self) -> &'static str {
        match self {
            LinkStatus::Ok => "OK",
            LinkStatus::Timeout => "TMO",
            LinkStatus::Overflow => "OVR",
            LinkStatus::Error => "ERR",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
