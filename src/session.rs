//! Per-binding session state and the transaction flow
//!
//! A [`Session`] is one caller's (port, address, command, model) binding.
//! It caches the decimal points, remembers the last result and status, and
//! counts transactions. [`Session::transact`] runs the full flow under a
//! held port lock:
//!
//! 1. acquire decimal points when the model requires it, unless the
//!    address has a fixed count configured on the port
//! 2. encode the request
//! 3. exchange it with retry
//! 4. validate and strip the response
//! 5. decode the payload into a [`Reading`]

use std::fmt;

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::constants::DEFAULT_DECIMAL_POINTS;
use crate::convert::{decode_reading, Reading};
use crate::engine::Delay;
use crate::error::{LinkStatus, LoveError, LoveResult};
use crate::frame::{decode_response, encode_request};
use crate::model::{resolve_command, Command, ControllerModel, Direction, RecordKind};
use crate::port::PortGuard;
use crate::transport::LoveTransport;

/// State of one binding
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub index: usize,
    pub port: String,
    pub address: u8,
    pub command: Command,
    pub model: ControllerModel,
    pub direction: Direction,
    /// Caller's name for the binding (record or PV name)
    pub name: String,
    /// Address code resolved at bind time
    pub code: &'static str,
    pub decimal_points: u8,
    pub last_value: Option<Reading>,
    pub last_status: LinkStatus,
    pub last_error: Option<LoveError>,
    pub busy: bool,
    pub reads: u64,
    pub writes: u64,
    pub count: u64,
    pub last_transaction: Option<DateTime<Utc>>,
}

impl Session {
    /// Validate a binding and build its initial state
    ///
    /// Fails with [`LoveError::UnsupportedModel`] for models that cannot be
    /// driven and [`LoveError::InvalidCommand`] when `command` does not
    /// match `direction`.
    pub fn new(
        index: usize,
        port: &str,
        address: u8,
        command: Command,
        model: ControllerModel,
        direction: Direction,
        name: &str,
    ) -> LoveResult<Self> {
        let code = resolve_command(model, command)?;
        if command.direction() != direction {
            return Err(LoveError::invalid_command(format!(
                "{} is a {} command, cannot bind it for {}",
                command,
                command.direction(),
                direction
            )));
        }

        Ok(Self {
            index,
            port: port.to_string(),
            address,
            command,
            model,
            direction,
            name: name.to_string(),
            code,
            decimal_points: DEFAULT_DECIMAL_POINTS,
            last_value: None,
            last_status: LinkStatus::Ok,
            last_error: None,
            busy: false,
            reads: 0,
            writes: 0,
            count: 0,
            last_transaction: None,
        })
    }

    /// Record type tag used in reports
    pub fn record_tag(&self) -> &'static str {
        match (self.command.record_kind(), self.direction) {
            (RecordKind::Analog, Direction::Read) => "ai",
            (RecordKind::Analog, Direction::Write) => "ao",
            (RecordKind::Binary, Direction::Read) => "bi",
            (RecordKind::Binary, Direction::Write) => "bo",
            (RecordKind::MultiBit, _) => "mbbi",
        }
    }

    /// Run one transaction and record its outcome
    pub async fn transact<T, D>(
        &mut self,
        guard: &mut PortGuard<'_, T, D>,
        value: Option<f64>,
    ) -> LoveResult<Reading>
    where
        T: LoveTransport,
        D: Delay,
    {
        self.count += 1;
        let result = self.run(guard, value).await;

        match self.direction {
            Direction::Read => self.reads += 1,
            Direction::Write => self.writes += 1,
        }
        self.last_transaction = Some(Utc::now());

        match &result {
            Ok(reading) => {
                self.last_value = Some(*reading);
                self.last_status = LinkStatus::Ok;
                self.last_error = None;
            }
            Err(e) => {
                self.last_status = e.status();
                self.last_error = Some(e.clone());
            }
        }
        result
    }

    async fn run<T, D>(
        &mut self,
        guard: &mut PortGuard<'_, T, D>,
        value: Option<f64>,
    ) -> LoveResult<Reading>
    where
        T: LoveTransport,
        D: Delay,
    {
        let value = if self.command.carries_value() {
            Some(value.ok_or_else(|| {
                LoveError::invalid_command(format!("{} requires a value", self.command))
            })?)
        } else {
            None
        };

        if let Some(dp) = guard.fixed_decimal_points(self.address) {
            self.decimal_points = dp;
        } else if self.model.needs_decimal_points(self.command) {
            self.acquire_decimal_points(guard).await.map_err(|e| {
                error!(
                    "{}: failure to acquire decimal points for 0x{:02X}: {}",
                    guard.port_name(),
                    self.address,
                    e
                );
                e
            })?;
        }

        let reading = self
            .exchange(guard, self.command, self.code, value)
            .await?;
        debug!(
            "{} 0x{:02X} {} -> {}",
            guard.port_name(),
            self.address,
            self.command,
            reading
        );
        Ok(reading)
    }

    async fn acquire_decimal_points<T, D>(&mut self, guard: &mut PortGuard<'_, T, D>) -> LoveResult<()>
    where
        T: LoveTransport,
        D: Delay,
    {
        let code = resolve_command(self.model, Command::GetDecPt)?;
        self.exchange(guard, Command::GetDecPt, code, None).await?;
        Ok(())
    }

    /// One encode/exchange/decode round; updates the decimal-point cache
    /// unless the address is fixed-format
    async fn exchange<T, D>(
        &mut self,
        guard: &mut PortGuard<'_, T, D>,
        command: Command,
        code: &'static str,
        value: Option<f64>,
    ) -> LoveResult<Reading>
    where
        T: LoveTransport,
        D: Delay,
    {
        let config = *guard.config();
        let request = encode_request(
            self.address,
            code,
            value,
            self.decimal_points,
            config.terminator,
        )?;
        let raw = guard.exchange(self.address, request.as_slice()).await?;
        let payload = decode_response(&raw, config.ack)?;
        let decoded = decode_reading(self.model, command, payload, self.decimal_points)?;
        if let Some(dp) = decoded.decimal_points {
            if guard.fixed_decimal_points(self.address).is_none() {
                self.decimal_points = dp;
            }
        }
        Ok(decoded.reading)
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02} 0x{:02X} {:<4} {:<13} {:<4} {:<3} {} {:06} \"{}\" \"{}\"",
            self.index,
            self.address,
            self.model.name(),
            self.command.name(),
            self.record_tag(),
            self.last_status.tag(),
            if self.busy { "Y" } else { "N" },
            self.count,
            self.port,
            self.name
        )
    }
}
