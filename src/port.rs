//! Shared serial port
//!
//! A [`LovePort`] owns one transport behind an async mutex. Every exchange
//! on the wire happens through a [`PortGuard`], so a write and its read (and
//! any retries) can never interleave with another caller's frames. Locking
//! is per port: all controller addresses on the bus share the same lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::MutexGuard;
use tracing::{debug, info, warn};

use crate::config::PortConfig;
use crate::constants::{ACK, ETX, MAX_ADDRESS, MAX_DECIMAL_POINTS, MIN_ADDRESS};
use crate::engine::{execute, Delay, RetryPolicy, TokioDelay};
use crate::error::{LoveError, LoveResult};
use crate::frame::TerminatorMode;
use crate::transport::{log_packet, LoveTransport, TransportStats};

/// Per-address state for addresses 0..=255; address 0 is never connectable
struct AddressTable {
    connected: [bool; MAX_ADDRESS as usize + 1],
    /// Configured decimal points; `None` means query or read them from status
    fixed_decimal_points: [Option<u8>; MAX_ADDRESS as usize + 1],
}

impl AddressTable {
    fn new() -> Self {
        Self {
            connected: [false; MAX_ADDRESS as usize + 1],
            fixed_decimal_points: [None; MAX_ADDRESS as usize + 1],
        }
    }
}

fn check_address(address: u8) -> LoveResult<()> {
    if address < MIN_ADDRESS {
        return Err(LoveError::connection(format!(
            "illegal controller address {}",
            address
        )));
    }
    Ok(())
}

/// One physical Lovelink bus
pub struct LovePort<T: LoveTransport, D: Delay = TokioDelay> {
    name: String,
    config: PortConfig,
    policy: RetryPolicy,
    delay: D,
    link: tokio::sync::Mutex<T>,
    addresses: Mutex<AddressTable>,
    connected: AtomicBool,
}

impl<T: LoveTransport> LovePort<T, TokioDelay> {
    /// Create a port using the tokio timer for inter-command delays
    pub fn new(name: &str, transport: T, config: PortConfig) -> LoveResult<Self> {
        Self::with_delay(name, transport, config, TokioDelay)
    }
}

impl<T: LoveTransport, D: Delay> LovePort<T, D> {
    /// Create a port with a custom delay source
    pub fn with_delay(name: &str, mut transport: T, config: PortConfig, delay: D) -> LoveResult<Self> {
        config.validate()?;

        transport.set_input_eos(Some(ACK));
        match config.terminator {
            TerminatorMode::SuppliedByTransport => transport.set_output_eos(Some(ETX)),
            TerminatorMode::Appended => transport.set_output_eos(None),
        }

        info!(
            "Lovelink port {} created (timeout {}ms, {} attempts, {:?}/{:?})",
            name, config.timeout_ms, config.retries, config.terminator, config.ack
        );

        Ok(Self {
            name: name.to_string(),
            config,
            policy: RetryPolicy::from_config(&config),
            delay,
            link: tokio::sync::Mutex::new(transport),
            addresses: Mutex::new(AddressTable::new()),
            connected: AtomicBool::new(true),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    fn table(&self) -> std::sync::MutexGuard<'_, AddressTable> {
        self.addresses.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Address connections
    // ========================================================================

    /// Connect a controller address; fails if it is already connected
    pub fn connect(&self, address: u8) -> LoveResult<()> {
        check_address(address)?;
        let mut table = self.table();
        if table.connected[address as usize] {
            return Err(LoveError::connection(format!(
                "{}: address 0x{:02X} already connected",
                self.name, address
            )));
        }
        table.connected[address as usize] = true;
        debug!("{}: address 0x{:02X} connected", self.name, address);
        Ok(())
    }

    /// Connect `address` unless it already is
    pub fn ensure_connected(&self, address: u8) -> LoveResult<()> {
        check_address(address)?;
        self.table().connected[address as usize] = true;
        Ok(())
    }

    /// Disconnect a controller address; fails if it is not connected
    pub fn disconnect(&self, address: u8) -> LoveResult<()> {
        check_address(address)?;
        let mut table = self.table();
        if !table.connected[address as usize] {
            return Err(LoveError::connection(format!(
                "{}: address 0x{:02X} not connected",
                self.name, address
            )));
        }
        table.connected[address as usize] = false;
        debug!("{}: address 0x{:02X} disconnected", self.name, address);
        Ok(())
    }

    /// Whether transactions to `address` are currently possible
    pub fn is_address_connected(&self, address: u8) -> bool {
        self.is_connected() && self.table().connected[address as usize]
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Fix the decimal points used for `address`, or clear them with `None`
    ///
    /// Transactions to a fixed-format address never fetch decimal points
    /// from the controller and never update their cached count.
    pub fn set_fixed_decimal_points(&self, address: u8, decimal_points: Option<u8>) -> LoveResult<()> {
        check_address(address)?;
        if let Some(dp) = decimal_points {
            if dp > MAX_DECIMAL_POINTS {
                return Err(LoveError::configuration(format!(
                    "{}: {} decimal points for 0x{:02X}, at most {} allowed",
                    self.name, dp, address, MAX_DECIMAL_POINTS
                )));
            }
        }
        self.table().fixed_decimal_points[address as usize] = decimal_points;
        debug!(
            "{}: address 0x{:02X} decimal points {:?}",
            self.name, address, decimal_points
        );
        Ok(())
    }

    pub fn fixed_decimal_points(&self, address: u8) -> Option<u8> {
        self.table().fixed_decimal_points[address as usize]
    }

    /// Transport reported the link as lost
    ///
    /// All addresses become unreachable until [`reconnect`](Self::reconnect).
    pub fn connection_lost(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            warn!("{}: connection lost, all addresses disconnected", self.name);
        }
    }

    /// Transport reported the link as restored
    pub fn reconnect(&self) {
        if !self.connected.swap(true, Ordering::AcqRel) {
            info!("{}: connection restored", self.name);
        }
    }

    // ========================================================================
    // Wire access
    // ========================================================================

    /// Take the port lock
    ///
    /// The returned guard serializes everything done through it against
    /// every other caller on this port.
    pub async fn lock(&self) -> PortGuard<'_, T, D> {
        PortGuard {
            port: self,
            link: self.link.lock().await,
        }
    }

    /// Single exchange under the port lock
    pub async fn exchange(&self, address: u8, request: &[u8]) -> LoveResult<Bytes> {
        self.lock().await.exchange(address, request).await
    }

    /// Discard pending input on the transport
    pub async fn flush(&self) -> LoveResult<()> {
        self.link.lock().await.flush().await
    }

    pub async fn stats(&self) -> TransportStats {
        self.link.lock().await.get_stats()
    }

    pub async fn close(&self) -> LoveResult<()> {
        self.connection_lost();
        self.link.lock().await.close().await
    }
}

/// Exclusive access to a port's transport
pub struct PortGuard<'a, T: LoveTransport, D: Delay> {
    port: &'a LovePort<T, D>,
    link: MutexGuard<'a, T>,
}

impl<T: LoveTransport, D: Delay> PortGuard<'_, T, D> {
    pub fn config(&self) -> &PortConfig {
        &self.port.config
    }

    pub fn port_name(&self) -> &str {
        &self.port.name
    }

    /// See [`LovePort::set_fixed_decimal_points`]
    pub fn fixed_decimal_points(&self, address: u8) -> Option<u8> {
        self.port.fixed_decimal_points(address)
    }

    /// Write `request` and read the response, retrying on timeout
    pub async fn exchange(&mut self, address: u8, request: &[u8]) -> LoveResult<Bytes> {
        if !self.port.is_address_connected(address) {
            return Err(LoveError::connection(format!(
                "{}: address 0x{:02X} not connected",
                self.port.name, address
            )));
        }

        if self.port.config.packet_logging {
            log_packet(&self.port.name, "send", request, Some(address));
        }

        let response = execute(&mut *self.link, &self.port.delay, &self.port.policy, request).await?;

        if self.port.config.packet_logging {
            log_packet(&self.port.name, "recv", &response, Some(address));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{ScriptedTransport, Step};
    use crate::engine::NoDelay;
    use crate::transport::{EomReason, ReadOutcome};

    fn port(steps: Vec<Step>) -> (LovePort<ScriptedTransport, NoDelay>, ScriptedTransport) {
        let transport = ScriptedTransport::with_steps(steps);
        let port =
            LovePort::with_delay("L0", transport.clone(), PortConfig::default(), NoDelay).unwrap();
        (port, transport)
    }

    #[test]
    fn test_connect_rules() {
        let (port, _) = port(vec![]);
        assert!(port.connect(0).is_err());
        port.connect(1).unwrap();
        assert!(port.connect(1).is_err());
        assert!(port.is_address_connected(1));
        port.disconnect(1).unwrap();
        assert!(port.disconnect(1).is_err());
        assert!(!port.is_address_connected(1));
        port.connect(255).unwrap();
        port.ensure_connected(255).unwrap();
        assert!(port.is_address_connected(255));
    }

    #[test]
    fn test_connection_lost_blocks_addresses() {
        let (port, _) = port(vec![]);
        port.connect(7).unwrap();
        port.connection_lost();
        assert!(!port.is_connected());
        assert!(!port.is_address_connected(7));
        port.reconnect();
        assert!(port.is_address_connected(7));
    }

    #[test]
    fn test_fixed_decimal_points_validated() {
        let (port, _) = port(vec![]);
        assert_eq!(port.fixed_decimal_points(3), None);
        port.set_fixed_decimal_points(3, Some(2)).unwrap();
        assert_eq!(port.fixed_decimal_points(3), Some(2));
        assert_eq!(port.fixed_decimal_points(4), None);

        assert!(matches!(
            port.set_fixed_decimal_points(3, Some(4)),
            Err(LoveError::Configuration { .. })
        ));
        assert_eq!(port.fixed_decimal_points(3), Some(2));
        assert!(port.set_fixed_decimal_points(0, Some(1)).is_err());

        port.set_fixed_decimal_points(3, None).unwrap();
        assert_eq!(port.fixed_decimal_points(3), None);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let transport = ScriptedTransport::default();
        let config = PortConfig::default().with_retries(0);
        assert!(LovePort::with_delay("L0", transport, config, NoDelay).is_err());
    }

    #[tokio::test]
    async fn test_exchange_requires_connected_address() {
        let ok = Step::Respond(ReadOutcome::new(b"\x02L0100".to_vec(), EomReason::Eos));
        let (port, transport) = port(vec![ok]);

        let err = port.exchange(1, b"req").await.unwrap_err();
        assert!(matches!(err, LoveError::Connection { .. }));
        assert_eq!(transport.write_count(), 0);

        port.connect(1).unwrap();
        let data = port.exchange(1, b"req").await.unwrap();
        assert_eq!(&data[..], b"\x02L0100");
    }
}
