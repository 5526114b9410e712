//! # Lovelink - Love Controller Protocol Library
//!
//! Framing and transaction layer for the Lovelink ASCII protocol spoken by
//! Love 16A and 1600 series temperature controllers over RS-485 or RS-232.
//!
//! ## Features
//!
//! - **Frame codec**: request encoding, response validation and checksum
//! - **Model tables**: per-model address codes and decimal-point handling
//! - **Transaction engine**: inter-command delay, retry on timeout
//! - **Shared ports**: one lock per bus, many controllers per port
//! - **Sessions**: bindings with cached state and a diagnostic report
//! - **Serial transport**: `tokio-serial` backed (feature `serial`)
//! - **Simulator**: in-memory bus for tests and demos
//!
//! ## Supported Models
//!
//! | Model | Family | Supported |
//! |-------|--------|-----------|
//! | 16A   | 16A    | ✅ |
//! | 32A   | 16A    | ❌ |
//! | 1600  | 1600   | ✅ |
//! | 2600  | 16A    | ❌ |
//! | 8600  | 16A    | ❌ |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lovelink::sim::{SimController, SimulatedBus};
//! use lovelink::{ControllerModel, LoveClient, LoveResult, PortConfig};
//!
//! #[tokio::main]
//! async fn main() -> LoveResult<()> {
//!     let bus = SimulatedBus::new();
//!     bus.add_controller(1, SimController::new(ControllerModel::M1600).with_process_value(21.5));
//!
//!     let client = LoveClient::new("L0", bus, PortConfig::default())?;
//!     let pv = client.get_value(1, ControllerModel::M1600).await?;
//!     println!("process value: {}", pv);
//!
//!     client.put_setpoint1(1, ControllerModel::M1600, 42.5).await?;
//!     Ok(())
//! }
//! ```

// ============================================================================
// Protocol
// ============================================================================

/// Error types and result handling
pub mod error;

/// Control bytes, field widths and defaults
pub mod constants;

/// Modulo-256 frame checksum
pub mod checksum;

/// ASCII hex and decimal field helpers
pub mod field;

/// Controller models and the command tables
pub mod model;

/// Value scaling and response payload decoding
pub mod convert;

/// Request encoding and response validation
pub mod frame;

// ============================================================================
// Transactions
// ============================================================================

/// Byte transport abstraction and serial implementation
pub mod transport;

/// Per-port configuration
pub mod config;

/// Retry loop around one write/read exchange
pub mod engine;

/// Shared port with address table and lock
pub mod port;

/// Per-binding state and transaction flow
pub mod session;

/// Port and session registry with diagnostic report
pub mod registry;

/// One-shot client API
pub mod client;

/// In-memory controller bus
pub mod sim;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime (users can use lovelink::tokio) ===
pub use tokio;

// === Error handling ===
pub use error::{LinkStatus, LoveError, LoveResult};

// === Protocol ===
pub use checksum::checksum;
pub use convert::{decode_reading, encode_value, Reading, StatusWord};
pub use frame::{decode_response, encode_request, AckMode, Frame, TerminatorMode};
pub use model::{resolve_command, Command, ControllerModel, Direction, RecordKind};

// === Transport ===
pub use transport::{EomReason, LoveTransport, ReadOutcome, TransportStats};

#[cfg(feature = "serial")]
pub use transport::{SerialSettings, SerialTransport};

// === Transactions ===
pub use config::PortConfig;
pub use engine::{execute, Delay, NoDelay, RetryPolicy, TokioDelay};
pub use port::{LovePort, PortGuard};
pub use session::Session;

// === High level API ===
pub use client::LoveClient;
pub use registry::{LinkManager, SessionHandle};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!(
        "Lovelink v{} - Love controller protocol library",
        VERSION
    )
}
