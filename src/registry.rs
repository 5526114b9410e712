//! Link manager and session registry
//!
//! [`LinkManager`] owns the named ports and an append-only list of every
//! session ever bound, for diagnostics. Each [`bind`](LinkManager::bind)
//! allocates a new session; there is no lookup-by-key reuse.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::info;

use crate::convert::Reading;
use crate::engine::{Delay, TokioDelay};
use crate::error::{LoveError, LoveResult};
use crate::model::{Command, ControllerModel, Direction};
use crate::port::LovePort;
use crate::session::Session;
use crate::transport::LoveTransport;

#[derive(Debug, Default)]
struct Counters {
    reads: AtomicU64,
    writes: AtomicU64,
}

type SharedSession = Arc<Mutex<Session>>;

fn lock_session(session: &SharedSession) -> std::sync::MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide owner of Lovelink ports and sessions
pub struct LinkManager<T: LoveTransport, D: Delay = TokioDelay> {
    ports: RwLock<HashMap<String, Arc<LovePort<T, D>>>>,
    sessions: Mutex<Vec<SharedSession>>,
    counters: Arc<Counters>,
}

impl<T: LoveTransport, D: Delay> Default for LinkManager<T, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: LoveTransport, D: Delay> LinkManager<T, D> {
    pub fn new() -> Self {
        Self {
            ports: RwLock::new(HashMap::new()),
            sessions: Mutex::new(Vec::new()),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Register a port under its name
    pub fn add_port(&self, port: LovePort<T, D>) -> LoveResult<Arc<LovePort<T, D>>> {
        let mut ports = self.ports.write().unwrap_or_else(PoisonError::into_inner);
        let name = port.name().to_string();
        if ports.contains_key(&name) {
            return Err(LoveError::configuration(format!(
                "port {} already registered",
                name
            )));
        }
        let port = Arc::new(port);
        ports.insert(name.clone(), Arc::clone(&port));
        info!("Registered Lovelink port {}", name);
        Ok(port)
    }

    pub fn port(&self, name: &str) -> Option<Arc<LovePort<T, D>>> {
        self.ports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Bind a caller to (port, address, command, model)
    ///
    /// The address is connected on the port if it is not already.
    pub fn bind(
        &self,
        port: &str,
        address: u8,
        command: Command,
        model: ControllerModel,
        direction: Direction,
        name: &str,
    ) -> LoveResult<SessionHandle<T, D>> {
        let link = self
            .port(port)
            .ok_or_else(|| LoveError::configuration(format!("unknown port {}", port)))?;

        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let session = Session::new(sessions.len(), port, address, command, model, direction, name)?;
        link.ensure_connected(address)?;

        let shared = Arc::new(Mutex::new(session));
        sessions.push(Arc::clone(&shared));
        info!(
            "Bound {} to {} 0x{:02X} {} ({})",
            name, port, address, command, model
        );

        Ok(SessionHandle {
            session: shared,
            port: link,
            counters: Arc::clone(&self.counters),
        })
    }

    /// Configure a fixed decimal-point count for one controller address
    ///
    /// `None` restores the model's own acquisition. Applies to every
    /// session on that address, current and future.
    pub fn configure_decimal_points(
        &self,
        port: &str,
        address: u8,
        decimal_points: Option<u8>,
    ) -> LoveResult<()> {
        let link = self
            .port(port)
            .ok_or_else(|| LoveError::configuration(format!("unknown port {}", port)))?;
        link.set_fixed_decimal_points(address, decimal_points)
    }

    /// [`bind`](Self::bind) with command and model given by name
    pub fn bind_by_name(
        &self,
        port: &str,
        address: u8,
        command: &str,
        model: &str,
        direction: Direction,
        name: &str,
    ) -> LoveResult<SessionHandle<T, D>> {
        let command: Command = command.parse()?;
        let model: ControllerModel = model.parse()?;
        self.bind(port, address, command, model, direction, name)
    }

    pub fn read_count(&self) -> u64 {
        self.counters.reads.load(Ordering::Relaxed)
    }

    pub fn write_count(&self) -> u64 {
        self.counters.writes.load(Ordering::Relaxed)
    }

    pub fn instance_count(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Copies of every session in bind order
    pub fn sessions(&self) -> Vec<Session> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| lock_session(s).clone())
            .collect()
    }

    /// Diagnostic dump
    ///
    /// Level 0 prints the counters; level 1 adds one line per session;
    /// level 2 adds decimal points, last value and last error.
    pub fn report(&self, verbosity: u32) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Love Controller Configuration");
        let _ = writeln!(out, "\tInterest level                  - {}", verbosity);
        let _ = writeln!(out, "\tRecord read count               - {}", self.read_count());
        let _ = writeln!(out, "\tRecord write count              - {}", self.write_count());
        let _ = writeln!(out, "\tRecord instance count           - {}", self.instance_count());

        if verbosity == 0 {
            return out;
        }

        for session in self.sessions() {
            let _ = writeln!(out, "\t{}", session);
            if verbosity >= 2 {
                let last = session
                    .last_value
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let _ = write!(
                    out,
                    "\t    dp={} value={} at={}",
                    session.decimal_points,
                    last,
                    session
                        .last_transaction
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string())
                );
                if let Some(err) = &session.last_error {
                    let _ = write!(out, " error=\"{}\"", err);
                }
                out.push('\n');
            }
        }
        out
    }
}

/// Working copy of a session, written back when dropped
///
/// Runs on completion and on cancellation alike, so a dropped transaction
/// never leaves its session busy.
struct WriteBack<'a> {
    shared: &'a SharedSession,
    counters: &'a Counters,
    started_at: u64,
    state: Session,
}

impl Drop for WriteBack<'_> {
    fn drop(&mut self) {
        // nothing to count if cancelled while waiting for the port
        if self.state.count > self.started_at {
            let counter = match self.state.direction {
                Direction::Read => &self.counters.reads,
                Direction::Write => &self.counters.writes,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }

        self.state.busy = false;
        *lock_session(self.shared) = self.state.clone();
    }
}

/// A caller's handle on its session
///
/// Transactions through one handle are sequential by construction
/// (`&mut self`); different handles on the same port serialize on the
/// port lock.
pub struct SessionHandle<T: LoveTransport, D: Delay = TokioDelay> {
    session: SharedSession,
    port: Arc<LovePort<T, D>>,
    counters: Arc<Counters>,
}

impl<T: LoveTransport, D: Delay> SessionHandle<T, D> {
    /// Run one transaction
    ///
    /// `value` is required for analog write commands and ignored otherwise.
    pub async fn transact(&mut self, value: Option<f64>) -> LoveResult<Reading> {
        let state = {
            let mut shared = lock_session(&self.session);
            shared.busy = true;
            shared.clone()
        };
        let mut pending = WriteBack {
            shared: &self.session,
            counters: &self.counters,
            started_at: state.count,
            state,
        };

        let mut guard = self.port.lock().await;
        let result = pending.state.transact(&mut guard, value).await;
        drop(guard);
        result
    }

    /// Copy of the current session state
    pub fn snapshot(&self) -> Session {
        lock_session(&self.session).clone()
    }

    pub fn port(&self) -> &Arc<LovePort<T, D>> {
        &self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortConfig;
    use crate::engine::tests::{ScriptedTransport, Step};
    use crate::engine::NoDelay;
    use crate::error::LinkStatus;
    use crate::frame::tests::response;
    use crate::frame::AckMode;
    use crate::sim::{SimController, SimulatedBus};
    use crate::transport::{EomReason, ReadOutcome};
    use std::time::Duration;

    fn reply(payload: &[u8]) -> Step {
        Step::Respond(ReadOutcome::new(
            response(payload, AckMode::Preserved),
            EomReason::Eos,
        ))
    }

    fn manager(steps: Vec<Step>) -> (LinkManager<ScriptedTransport, NoDelay>, ScriptedTransport) {
        let transport = ScriptedTransport::with_steps(steps);
        let port =
            LovePort::with_delay("L0", transport.clone(), PortConfig::default(), NoDelay).unwrap();
        let manager = LinkManager::new();
        manager.add_port(port).unwrap();
        (manager, transport)
    }

    #[test]
    fn test_bind_validation() {
        let (manager, _) = manager(vec![]);
        assert!(matches!(
            manager.bind("L9", 1, Command::GetValue, ControllerModel::M1600, Direction::Read, "x"),
            Err(LoveError::Configuration { .. })
        ));
        assert!(matches!(
            manager.bind("L0", 1, Command::GetValue, ControllerModel::M32A, Direction::Read, "x"),
            Err(LoveError::UnsupportedModel { .. })
        ));
        assert!(matches!(
            manager.bind("L0", 1, Command::PutSp1, ControllerModel::M16A, Direction::Read, "x"),
            Err(LoveError::InvalidCommand { .. })
        ));
        assert!(matches!(
            manager.bind("L0", 0, Command::GetValue, ControllerModel::M16A, Direction::Read, "x"),
            Err(LoveError::Connection { .. })
        ));
        assert_eq!(manager.instance_count(), 0);
    }

    #[test]
    fn test_bind_is_append_only() {
        let (manager, _) = manager(vec![]);
        let a = manager
            .bind("L0", 1, Command::GetValue, ControllerModel::M16A, Direction::Read, "A")
            .unwrap();
        let b = manager
            .bind("L0", 1, Command::GetValue, ControllerModel::M16A, Direction::Read, "B")
            .unwrap();
        assert_eq!(a.snapshot().index, 0);
        assert_eq!(b.snapshot().index, 1);
        assert_eq!(manager.instance_count(), 2);
    }

    #[test]
    fn test_duplicate_port_rejected() {
        let (manager, transport) = manager(vec![]);
        let again = LovePort::with_delay("L0", transport, PortConfig::default(), NoDelay).unwrap();
        assert!(manager.add_port(again).is_err());
    }

    #[tokio::test]
    async fn test_transact_updates_session_and_counters() {
        // 16A getValue: dp from status bits, no acquisition step
        let (manager, transport) = manager(vec![reply(b"0100201234")]);
        let mut handle = manager
            .bind_by_name("L0", 1, "getValue", "16A", Direction::Read, "TEMP:PV")
            .unwrap();

        let reading = handle.transact(None).await.unwrap();
        assert_eq!(reading, Reading::Analog(12.34));
        assert_eq!(transport.write_count(), 1);

        let state = handle.snapshot();
        assert_eq!(state.decimal_points, 2);
        assert_eq!(state.count, 1);
        assert_eq!(state.reads, 1);
        assert_eq!(state.last_status, LinkStatus::Ok);
        assert!(!state.busy);
        assert!(state.last_transaction.is_some());
        assert_eq!(manager.read_count(), 1);
        assert_eq!(manager.write_count(), 0);
    }

    #[tokio::test]
    async fn test_write_acquires_decimal_points_first() {
        let (manager, transport) = manager(vec![reply(b"0102"), reply(b"0100")]);
        let mut handle = manager
            .bind("L0", 1, Command::PutSp1, ControllerModel::M16A, Direction::Write, "SP")
            .unwrap();

        let reading = handle.transact(Some(-1.5)).await.unwrap();
        assert_eq!(reading, Reading::Accepted);

        let writes = transport.writes.lock().unwrap().clone();
        assert_eq!(writes.len(), 2);
        assert!(writes[0].starts_with(b"\x02L01031A"));
        assert!(writes[1].starts_with(b"\x02L0102000150FF"));
        assert_eq!(manager.write_count(), 1);
    }

    #[tokio::test]
    async fn test_decimal_point_failure_is_transaction_failure() {
        let (manager, transport) = manager(vec![Step::ReadError]);
        let mut handle = manager
            .bind("L0", 1, Command::GetSp1, ControllerModel::M1600, Direction::Read, "SP1")
            .unwrap();

        assert!(handle.transact(None).await.is_err());
        assert_eq!(transport.write_count(), 1);
        let state = handle.snapshot();
        assert_eq!(state.last_status, LinkStatus::Error);
        assert_eq!(state.decimal_points, 1);
    }

    #[tokio::test]
    async fn test_missing_write_value_rejected() {
        let (manager, transport) = manager(vec![]);
        let mut handle = manager
            .bind("L0", 1, Command::PutAlHi, ControllerModel::M16A, Direction::Write, "AH")
            .unwrap();
        assert!(matches!(
            handle.transact(None).await,
            Err(LoveError::InvalidCommand { .. })
        ));
        assert_eq!(transport.write_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_status_recorded() {
        let (manager, _) = manager(vec![Step::ReadTimeout; 3]);
        let mut handle = manager
            .bind("L0", 2, Command::GetValue, ControllerModel::M16A, Direction::Read, "PV")
            .unwrap();
        assert!(matches!(
            handle.transact(None).await,
            Err(LoveError::Timeout { .. })
        ));
        assert_eq!(handle.snapshot().last_status, LinkStatus::Timeout);
    }

    #[tokio::test]
    async fn test_report_levels() {
        let (manager, _) = manager(vec![reply(b"0100201234")]);
        let mut handle = manager
            .bind("L0", 1, Command::GetValue, ControllerModel::M16A, Direction::Read, "TEMP:PV")
            .unwrap();
        handle.transact(None).await.unwrap();

        let brief = manager.report(0);
        assert!(brief.contains("Record read count               - 1"));
        assert!(brief.contains("Record instance count           - 1"));
        assert!(!brief.contains("TEMP:PV"));

        let full = manager.report(1);
        assert!(full.contains("0x01 16A  getValue"));
        assert!(full.contains("\"L0\" \"TEMP:PV\""));

        let verbose = manager.report(2);
        assert!(verbose.contains("dp=2 value=12.34"));
    }
    #[tokio::test]
    async fn test_fixed_decimal_points_skip_acquisition() {
        let (manager, transport) = manager(vec![reply(b"01000101234")]);
        manager.configure_decimal_points("L0", 1, Some(2)).unwrap();
        let mut handle = manager
            .bind("L0", 1, Command::GetValue, ControllerModel::M1600, Direction::Read, "PV")
            .unwrap();

        assert_eq!(handle.transact(None).await.unwrap(), Reading::Analog(-12.34));

        // no getDecPt frame on the wire
        let writes = transport.writes.lock().unwrap().clone();
        assert_eq!(writes.len(), 1);
        assert!(writes[0].starts_with(b"\x02L0100"));
        assert!(!writes.iter().any(|w| w.starts_with(b"\x02L010324")));
        assert_eq!(handle.snapshot().decimal_points, 2);
    }

    #[tokio::test]
    async fn test_fixed_decimal_points_are_never_overwritten() {
        let (manager, transport) = manager(vec![reply(b"0100"), reply(b"0100201234")]);
        manager.configure_decimal_points("L0", 1, Some(1)).unwrap();
        let mut sp = manager
            .bind("L0", 1, Command::PutSp1, ControllerModel::M16A, Direction::Write, "SP")
            .unwrap();
        let mut pv = manager
            .bind("L0", 1, Command::GetValue, ControllerModel::M16A, Direction::Read, "PV")
            .unwrap();

        assert_eq!(sp.transact(Some(-1.5)).await.unwrap(), Reading::Accepted);
        let writes = transport.writes.lock().unwrap().clone();
        assert_eq!(writes.len(), 1);
        assert!(writes[0].starts_with(b"\x02L0102000015FF"));

        // status bits report 2 decimal points, the configured count stays
        assert_eq!(pv.transact(None).await.unwrap(), Reading::Analog(12.34));
        assert_eq!(pv.snapshot().decimal_points, 1);
    }

    #[test]
    fn test_configure_decimal_points_validation() {
        let (manager, _) = manager(vec![]);
        assert!(matches!(
            manager.configure_decimal_points("L9", 1, Some(1)),
            Err(LoveError::Configuration { .. })
        ));
        assert!(matches!(
            manager.configure_decimal_points("L0", 1, Some(4)),
            Err(LoveError::Configuration { .. })
        ));
        manager.configure_decimal_points("L0", 1, Some(0)).unwrap();
        manager.configure_decimal_points("L0", 1, None).unwrap();
    }

    fn slow_manager() -> LinkManager<SimulatedBus, NoDelay> {
        let bus = SimulatedBus::new().with_byte_delay(Duration::from_millis(50));
        bus.add_controller(1, SimController::new(ControllerModel::M16A));
        let manager = LinkManager::new();
        manager
            .add_port(LovePort::with_delay("L0", bus, PortConfig::default(), NoDelay).unwrap())
            .unwrap();
        manager
    }

    #[tokio::test]
    async fn test_cancelled_transaction_releases_session() {
        let manager = slow_manager();
        let mut handle = manager
            .bind("L0", 1, Command::GetValue, ControllerModel::M16A, Direction::Read, "PV")
            .unwrap();

        let outcome = tokio::time::timeout(Duration::from_millis(10), handle.transact(None)).await;
        assert!(outcome.is_err());

        let state = handle.snapshot();
        assert!(!state.busy);
        assert_eq!(state.count, 1);
        assert_eq!(manager.read_count(), 1);
        assert!(manager.report(1).contains("N 000001"));

        // port lock released with the dropped future
        let guard = handle.port().lock().await;
        assert_eq!(guard.port_name(), "L0");
    }

    #[tokio::test]
    async fn test_cancelled_while_waiting_for_port_is_not_counted() {
        let manager = slow_manager();
        let mut handle = manager
            .bind("L0", 1, Command::GetValue, ControllerModel::M16A, Direction::Read, "PV")
            .unwrap();

        let port = Arc::clone(handle.port());
        let held = port.lock().await;
        let outcome = tokio::time::timeout(Duration::from_millis(10), handle.transact(None)).await;
        assert!(outcome.is_err());
        drop(held);

        let state = handle.snapshot();
        assert!(!state.busy);
        assert_eq!(state.count, 0);
        assert_eq!(manager.read_count(), 0);
    }
}
