//! # Lovelink Client
//!
//! One-shot access to controllers on a single port, without registering
//! sessions. Every call builds a throwaway [`Session`], so decimal points
//! are acquired from the controller whenever the model requires it.
//!
//! ## Example
//!
//! ```rust,no_run
//! # #[cfg(feature = "serial")]
//! # async fn example() -> lovelink::LoveResult<()> {
//! use lovelink::{ControllerModel, LoveClient, PortConfig, SerialSettings, SerialTransport};
//!
//! let transport = SerialTransport::open(SerialSettings::new("/dev/ttyUSB0", 9600))?;
//! let client = LoveClient::new("L0", transport, PortConfig::serial_default())?;
//!
//! let pv = client.get_value(1, ControllerModel::M1600).await?;
//! client.put_setpoint1(1, ControllerModel::M1600, 42.5).await?;
//! println!("process value: {}", pv);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::config::PortConfig;
use crate::convert::Reading;
use crate::engine::{Delay, TokioDelay};
use crate::error::{LoveError, LoveResult};
use crate::model::{Command, ControllerModel, Direction};
use crate::port::LovePort;
use crate::session::Session;
use crate::transport::{LoveTransport, TransportStats};

/// Unregistered access to one port
pub struct LoveClient<T: LoveTransport, D: Delay = TokioDelay> {
    port: Arc<LovePort<T, D>>,
}

impl<T: LoveTransport> LoveClient<T, TokioDelay> {
    /// Create a client owning a new port
    pub fn new(name: &str, transport: T, config: PortConfig) -> LoveResult<Self> {
        Ok(Self::from_port(Arc::new(LovePort::new(name, transport, config)?)))
    }
}

impl<T: LoveTransport, D: Delay> LoveClient<T, D> {
    /// Share an existing port, e.g. one registered with a
    /// [`LinkManager`](crate::LinkManager)
    pub fn from_port(port: Arc<LovePort<T, D>>) -> Self {
        Self { port }
    }

    pub fn port(&self) -> &Arc<LovePort<T, D>> {
        &self.port
    }

    async fn run(
        &self,
        address: u8,
        model: ControllerModel,
        command: Command,
        value: Option<f64>,
    ) -> LoveResult<Reading> {
        let mut session = Session::new(
            0,
            self.port.name(),
            address,
            command,
            model,
            command.direction(),
            "",
        )?;
        self.port.ensure_connected(address)?;
        let mut guard = self.port.lock().await;
        session.transact(&mut guard, value).await
    }

    /// Run a read command
    pub async fn read(
        &self,
        address: u8,
        model: ControllerModel,
        command: Command,
    ) -> LoveResult<Reading> {
        if command.direction() != Direction::Read {
            return Err(LoveError::invalid_command(format!(
                "{} is not a read command",
                command
            )));
        }
        self.run(address, model, command, None).await
    }

    /// Run a write command; `value` is required for setpoint and alarm writes
    pub async fn write(
        &self,
        address: u8,
        model: ControllerModel,
        command: Command,
        value: Option<f64>,
    ) -> LoveResult<()> {
        if command.direction() != Direction::Write {
            return Err(LoveError::invalid_command(format!(
                "{} is not a write command",
                command
            )));
        }
        self.run(address, model, command, value).await.map(|_| ())
    }

    async fn read_analog(&self, address: u8, model: ControllerModel, command: Command) -> LoveResult<f64> {
        let reading = self.read(address, model, command).await?;
        reading.as_f64().ok_or_else(|| {
            LoveError::invalid_data(format!("{} returned {:?}", command, reading))
        })
    }

    async fn read_binary(&self, address: u8, model: ControllerModel, command: Command) -> LoveResult<bool> {
        let reading = self.read(address, model, command).await?;
        reading.as_bool().ok_or_else(|| {
            LoveError::invalid_data(format!("{} returned {:?}", command, reading))
        })
    }

    async fn read_discrete(&self, address: u8, model: ControllerModel, command: Command) -> LoveResult<u32> {
        match self.read(address, model, command).await? {
            Reading::Discrete(v) => Ok(v),
            other => Err(LoveError::invalid_data(format!(
                "{} returned {:?}",
                command, other
            ))),
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Process value
    pub async fn get_value(&self, address: u8, model: ControllerModel) -> LoveResult<f64> {
        self.read_analog(address, model, Command::GetValue).await
    }

    pub async fn get_setpoint1(&self, address: u8, model: ControllerModel) -> LoveResult<f64> {
        self.read_analog(address, model, Command::GetSp1).await
    }

    pub async fn get_setpoint2(&self, address: u8, model: ControllerModel) -> LoveResult<f64> {
        self.read_analog(address, model, Command::GetSp2).await
    }

    pub async fn get_alarm_low(&self, address: u8, model: ControllerModel) -> LoveResult<f64> {
        self.read_analog(address, model, Command::GetAlLo).await
    }

    pub async fn get_alarm_high(&self, address: u8, model: ControllerModel) -> LoveResult<f64> {
        self.read_analog(address, model, Command::GetAlHi).await
    }

    pub async fn get_peak(&self, address: u8, model: ControllerModel) -> LoveResult<f64> {
        self.read_analog(address, model, Command::GetPeak).await
    }

    pub async fn get_valley(&self, address: u8, model: ControllerModel) -> LoveResult<f64> {
        self.read_analog(address, model, Command::GetValley).await
    }

    /// Alarm bit of the status word
    pub async fn get_alarm_status(&self, address: u8, model: ControllerModel) -> LoveResult<bool> {
        self.read_binary(address, model, Command::GetAlStatus).await
    }

    /// True when the controller accepts remote commands
    pub async fn get_comm_status(&self, address: u8, model: ControllerModel) -> LoveResult<bool> {
        self.read_binary(address, model, Command::GetCommStatus).await
    }

    pub async fn get_alarm_mode(&self, address: u8, model: ControllerModel) -> LoveResult<u32> {
        self.read_discrete(address, model, Command::GetAlMode).await
    }

    pub async fn get_input_type(&self, address: u8, model: ControllerModel) -> LoveResult<u32> {
        self.read_discrete(address, model, Command::GetInpType).await
    }

    pub async fn get_decimal_points(&self, address: u8, model: ControllerModel) -> LoveResult<u8> {
        match self.read(address, model, Command::GetDecPt).await? {
            Reading::DecimalPoints(dp) => Ok(dp),
            other => Err(LoveError::invalid_data(format!(
                "getDecPt returned {:?}",
                other
            ))),
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    pub async fn put_setpoint1(&self, address: u8, model: ControllerModel, value: f64) -> LoveResult<()> {
        self.write(address, model, Command::PutSp1, Some(value)).await
    }

    pub async fn put_setpoint2(&self, address: u8, model: ControllerModel, value: f64) -> LoveResult<()> {
        self.write(address, model, Command::PutSp2, Some(value)).await
    }

    pub async fn put_alarm_low(&self, address: u8, model: ControllerModel, value: f64) -> LoveResult<()> {
        self.write(address, model, Command::PutAlLo, Some(value)).await
    }

    pub async fn put_alarm_high(&self, address: u8, model: ControllerModel, value: f64) -> LoveResult<()> {
        self.write(address, model, Command::PutAlHi, Some(value)).await
    }

    pub async fn reset_peak(&self, address: u8, model: ControllerModel) -> LoveResult<()> {
        self.write(address, model, Command::ResetPeak, None).await
    }

    pub async fn reset_valley(&self, address: u8, model: ControllerModel) -> LoveResult<()> {
        self.write(address, model, Command::ResetValley, None).await
    }

    pub async fn set_remote(&self, address: u8, model: ControllerModel) -> LoveResult<()> {
        self.write(address, model, Command::SetRemote, None).await
    }

    pub async fn set_local(&self, address: u8, model: ControllerModel) -> LoveResult<()> {
        self.write(address, model, Command::SetLocal, None).await
    }

    pub async fn flush(&self) -> LoveResult<()> {
        self.port.flush().await
    }

    pub async fn get_stats(&self) -> TransportStats {
        self.port.stats().await
    }

    pub async fn close(&self) -> LoveResult<()> {
        self.port.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{ScriptedTransport, Step};
    use crate::engine::NoDelay;
    use crate::frame::tests::response;
    use crate::frame::AckMode;
    use crate::transport::{EomReason, ReadOutcome};

    fn reply(payload: &[u8], ack: AckMode) -> Step {
        Step::Respond(ReadOutcome::new(response(payload, ack), EomReason::Eos))
    }

    fn client(steps: Vec<Step>, config: PortConfig) -> (LoveClient<ScriptedTransport, NoDelay>, ScriptedTransport) {
        let transport = ScriptedTransport::with_steps(steps);
        let port = LovePort::with_delay("L0", transport.clone(), config, NoDelay).unwrap();
        (LoveClient::from_port(Arc::new(port)), transport)
    }

    #[tokio::test]
    async fn test_get_value_1600_acquires_decimal_points() {
        let (client, transport) = client(
            vec![
                reply(b"0102", AckMode::Preserved),
                reply(b"01000101234", AckMode::Preserved),
            ],
            PortConfig::default(),
        );

        let value = client.get_value(1, ControllerModel::M1600).await.unwrap();
        assert!((value + 12.34).abs() < 1e-9);

        let writes = transport.writes.lock().unwrap().clone();
        assert_eq!(writes.len(), 2);
        assert!(writes[0].starts_with(b"\x02L010324"));
        assert!(writes[1].starts_with(b"\x02L0100"));
        assert_eq!(*writes[1].last().unwrap(), crate::constants::ETX);
    }

    #[tokio::test]
    async fn test_serial_deployment_modes() {
        let (client, transport) = client(
            vec![reply(b"0101", AckMode::Stripped)],
            PortConfig::serial_default(),
        );

        assert!(client.get_comm_status(1, ControllerModel::M16A).await.unwrap());
        let writes = transport.writes.lock().unwrap().clone();
        // ETX left to the transport
        assert_ne!(*writes[0].last().unwrap(), crate::constants::ETX);
    }

    #[tokio::test]
    async fn test_controller_error_surfaces() {
        let err_frame = Step::Respond(ReadOutcome::new(b"\x02L01N03\x06".to_vec(), EomReason::Eos));
        let (client, _) = client(vec![err_frame], PortConfig::default());

        let err = client.get_alarm_status(1, ControllerModel::M16A).await.unwrap_err();
        assert_eq!(err, LoveError::controller(3));
    }

    #[tokio::test]
    async fn test_direction_checked() {
        let (client, transport) = client(vec![], PortConfig::default());
        assert!(client
            .read(1, ControllerModel::M16A, Command::SetRemote)
            .await
            .is_err());
        assert!(client
            .write(1, ControllerModel::M16A, Command::GetValue, None)
            .await
            .is_err());
        assert_eq!(transport.write_count(), 0);
    }

    #[tokio::test]
    async fn test_reset_peak_rejected_by_controller() {
        let (client, _) = client(
            vec![
                reply(b"0101", AckMode::Preserved),
                reply(b"0103", AckMode::Preserved),
            ],
            PortConfig::default(),
        );
        let err = client.reset_peak(1, ControllerModel::M16A).await.unwrap_err();
        assert_eq!(err, LoveError::CommandRejected { code: 3 });
    }

    #[tokio::test]
    async fn test_discrete_reads() {
        let (client, _) = client(
            vec![
                reply(b"0102", AckMode::Preserved),
                reply(b"0107", AckMode::Preserved),
            ],
            PortConfig::default(),
        );
        // 1600 acquires decimal points before the input type read
        assert_eq!(client.get_input_type(1, ControllerModel::M1600).await.unwrap(), 7);
    }
}
