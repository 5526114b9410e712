//! # Port Configuration
//!
//! Per-port transaction parameters. Defaults match the Love controller
//! turnaround requirements:
//!
//! - **Timeout**: 1000 ms per write or read
//! - **Retries**: 3 attempts on timeout
//! - **Inter-command delay**: 40 ms before every write
//!
//! The terminator and ACK modes describe what the transport does with the
//! end-of-message bytes. They are fixed per deployment.

use std::time::Duration;

use crate::constants::{DEFAULT_INTER_COMMAND_DELAY_MS, DEFAULT_RETRIES, DEFAULT_TIMEOUT_MS};
use crate::error::{LoveError, LoveResult};
use crate::frame::{AckMode, TerminatorMode};

/// Per-port Lovelink settings.
///
/// # Example
///
/// ```rust
/// use lovelink::{AckMode, PortConfig};
///
/// let config = PortConfig::new()
///     .with_timeout_ms(500)
///     .with_ack(AckMode::Stripped);
///
/// assert_eq!(config.retries, 3);
/// assert_eq!(config.timeout_ms, 500);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    /// Per-operation timeout (milliseconds).
    pub timeout_ms: u64,
    /// Attempts per transaction.
    pub retries: u32,
    /// Delay before every write (milliseconds).
    pub inter_command_delay_ms: u64,
    /// Whether the codec or the transport terminates requests.
    pub terminator: TerminatorMode,
    /// Whether responses still end in ACK when they reach the codec.
    pub ack: AckMode,
    /// Log every frame at info level.
    pub packet_logging: bool,
}

impl PortConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deployment where the serial driver owns both terminators.
    ///
    /// ETX is appended by the transport on write and the ACK is consumed
    /// as the input end-of-message byte.
    pub fn serial_default() -> Self {
        Self::default()
            .with_terminator(TerminatorMode::SuppliedByTransport)
            .with_ack(AckMode::Stripped)
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_inter_command_delay_ms(mut self, delay_ms: u64) -> Self {
        self.inter_command_delay_ms = delay_ms;
        self
    }

    pub fn with_terminator(mut self, terminator: TerminatorMode) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn with_ack(mut self, ack: AckMode) -> Self {
        self.ack = ack;
        self
    }

    pub fn with_packet_logging(mut self, enabled: bool) -> Self {
        self.packet_logging = enabled;
        self
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[inline]
    pub fn inter_command_delay(&self) -> Duration {
        Duration::from_millis(self.inter_command_delay_ms)
    }

    /// Reject settings that would make every transaction fail.
    pub fn validate(&self) -> LoveResult<()> {
        if self.retries == 0 {
            return Err(LoveError::configuration("retries must be at least 1"));
        }
        if self.timeout_ms == 0 {
            return Err(LoveError::configuration("timeout must be non-zero"));
        }
        Ok(())
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retries: DEFAULT_RETRIES,
            inter_command_delay_ms: DEFAULT_INTER_COMMAND_DELAY_MS,
            terminator: TerminatorMode::Appended,
            ack: AckMode::Preserved,
            packet_logging: false,
        }
    }
}
