//! In-memory Lovelink bus
//!
//! [`SimulatedBus`] answers requests the way real controllers do, so the
//! full stack can run without hardware. Every byte written or read is
//! appended to a shared wire log, and requests are written one byte at a
//! time with a yield in between, which makes unsynchronized writers
//! visibly interleave.
//!
//! Faults can be queued to exercise retry and error paths.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::trace;

use crate::checksum::checksum;
use crate::constants::{status_16a, ACK, ERROR_INDICATOR, ETX, FILTER, STX};
use crate::convert::scale_factor;
use crate::error::{LoveError, LoveResult};
use crate::field::{ascii_hex_to_byte, byte_to_ascii_hex, parse_decimal};
use crate::frame::AckMode;
use crate::model::{Command, ControllerModel, ModelFamily};
use crate::transport::{EomReason, LoveTransport, ReadOutcome, TransportStats};

/// Fault injected into the next exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    WriteTimeout,
    ReadTimeout,
    /// Response checksum off by one
    CorruptChecksum,
    /// Controller answers with an error frame
    ErrorCode(u8),
    /// Write commands answered with a non-zero result
    Reject(u8),
}

/// One simulated controller
#[derive(Debug, Clone, PartialEq)]
pub struct SimController {
    pub model: ControllerModel,
    pub decimal_points: u8,
    pub process_value: f64,
    pub setpoint1: f64,
    pub setpoint2: f64,
    pub alarm_low: f64,
    pub alarm_high: f64,
    pub peak: f64,
    pub valley: f64,
    pub alarm: bool,
    pub remote: bool,
    pub alarm_mode: u8,
    pub input_type: u8,
}

impl SimController {
    pub fn new(model: ControllerModel) -> Self {
        Self {
            model,
            decimal_points: 1,
            process_value: 0.0,
            setpoint1: 0.0,
            setpoint2: 0.0,
            alarm_low: 0.0,
            alarm_high: 0.0,
            peak: 0.0,
            valley: 0.0,
            alarm: false,
            remote: true,
            alarm_mode: 0,
            input_type: 0,
        }
    }

    pub fn with_decimal_points(mut self, dp: u8) -> Self {
        self.decimal_points = dp;
        self
    }

    pub fn with_process_value(mut self, value: f64) -> Self {
        self.process_value = value;
        self.peak = self.peak.max(value);
        self.valley = self.valley.min(value);
        self
    }

    fn magnitude(&self, value: f64) -> String {
        let raw = (value.abs() * scale_factor(self.decimal_points)).round() as u32;
        format!("{:04}", raw.min(9999))
    }

    fn status_word(&self, value: f64) -> u16 {
        let mut word = 0u16;
        if value < 0.0 {
            word |= status_16a::SIGN;
        }
        if self.alarm {
            word |= status_16a::ALARM;
        }
        if self.remote {
            word |= status_16a::COMM;
        }
        if self.model.family() == ModelFamily::Series16A {
            word |= (u16::from(self.decimal_points) << status_16a::DECIMAL_POINTS_SHIFT)
                & status_16a::DECIMAL_POINTS;
        }
        word
    }

    fn signed(&self, value: f64) -> String {
        match self.model.family() {
            ModelFamily::Series1600 => {
                format!("{:02}{}", u8::from(value < 0.0), self.magnitude(value))
            }
            ModelFamily::Series16A => {
                let info = ((self.decimal_points & 0x3) << 4) | u8::from(value < 0.0);
                format!("{:02X}{}", info, self.magnitude(value))
            }
        }
    }

    /// Data field answering `command`, or an error code
    fn respond(&mut self, command: Command, data: &[u8], reject: Option<u8>) -> Result<String, u8> {
        let write_result = |code: Option<u8>| format!("{:02}", code.unwrap_or(0));

        let out = match command {
            Command::GetValue | Command::GetAlStatus => format!(
                "{:04X}{}",
                self.status_word(self.process_value),
                self.magnitude(self.process_value)
            ),
            Command::GetSp1 => self.signed(self.setpoint1),
            Command::GetSp2 => self.signed(self.setpoint2),
            Command::GetAlLo => self.signed(self.alarm_low),
            Command::GetAlHi => self.signed(self.alarm_high),
            Command::GetPeak => self.signed(self.peak),
            Command::GetValley => self.signed(self.valley),
            Command::GetCommStatus => format!("{:02}", u8::from(self.remote)),
            Command::GetAlMode => format!("{:02X}", self.alarm_mode),
            Command::GetInpType => format!("{:02X}", self.input_type),
            Command::GetDecPt => format!("{:02}", self.decimal_points),
            Command::PutSp1 | Command::PutSp2 | Command::PutAlLo | Command::PutAlHi => {
                if reject.is_none() {
                    let value = self.parse_write(data)?;
                    match command {
                        Command::PutSp1 => self.setpoint1 = value,
                        Command::PutSp2 => self.setpoint2 = value,
                        Command::PutAlLo => self.alarm_low = value,
                        _ => self.alarm_high = value,
                    }
                }
                write_result(reject)
            }
            Command::ResetPeak => {
                if reject.is_none() {
                    self.peak = self.process_value;
                }
                write_result(reject)
            }
            Command::ResetValley => {
                if reject.is_none() {
                    self.valley = self.process_value;
                }
                write_result(reject)
            }
            Command::SetRemote | Command::SetLocal => {
                if reject.is_none() {
                    self.remote = command == Command::SetRemote;
                }
                write_result(reject)
            }
        };
        Ok(out)
    }

    fn parse_write(&self, data: &[u8]) -> Result<f64, u8> {
        // data field error
        const DATA_ERROR: u8 = 5;
        if data.len() != 6 {
            return Err(DATA_ERROR);
        }
        let magnitude = parse_decimal(&data[..4]).map_err(|_| DATA_ERROR)?;
        let sign = ascii_hex_to_byte(&data[4..]).map_err(|_| DATA_ERROR)?;
        let value = f64::from(magnitude) / scale_factor(self.decimal_points);
        Ok(if sign == 0xFF { -value } else { value })
    }
}

#[derive(Default)]
struct BusState {
    controllers: HashMap<u8, SimController>,
    faults: VecDeque<Fault>,
    pending: VecDeque<Vec<u8>>,
    wire: Vec<u8>,
    requests: Vec<Vec<u8>>,
}

/// Simulated multi-drop bus implementing [`LoveTransport`]
#[derive(Clone)]
pub struct SimulatedBus {
    state: Arc<Mutex<BusState>>,
    ack: AckMode,
    input_eos: Option<u8>,
    output_eos: Option<u8>,
    byte_delay: Option<Duration>,
    stats: Arc<Mutex<TransportStats>>,
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBus {
    /// Bus whose responses keep their trailing ACK
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState::default())),
            ack: AckMode::Preserved,
            input_eos: None,
            output_eos: None,
            byte_delay: None,
            stats: Arc::new(Mutex::new(TransportStats::default())),
        }
    }

    /// Choose whether the ACK reaches the reader
    pub fn with_ack_mode(mut self, ack: AckMode) -> Self {
        self.ack = ack;
        self
    }

    /// Sleep between written bytes instead of only yielding
    pub fn with_byte_delay(mut self, delay: Duration) -> Self {
        self.byte_delay = Some(delay);
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats_mut(&self) -> std::sync::MutexGuard<'_, TransportStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_controller(&self, address: u8, controller: SimController) {
        self.state().controllers.insert(address, controller);
    }

    pub fn controller(&self, address: u8) -> Option<SimController> {
        self.state().controllers.get(&address).cloned()
    }

    pub fn update_controller<F: FnOnce(&mut SimController)>(&self, address: u8, f: F) {
        if let Some(c) = self.state().controllers.get_mut(&address) {
            f(c);
        }
    }

    pub fn inject(&self, fault: Fault) {
        self.state().faults.push_back(fault);
    }

    /// Every byte that crossed the bus, in order
    pub fn wire_log(&self) -> Vec<u8> {
        self.state().wire.clone()
    }

    /// Complete request frames as written
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.state().requests.clone()
    }

    fn take_fault(&self, wanted: impl Fn(&Fault) -> bool) -> Option<Fault> {
        let mut state = self.state();
        let pos = state.faults.iter().position(wanted)?;
        state.faults.remove(pos)
    }

    fn build_response(&self, request: &[u8]) -> Option<Vec<u8>> {
        // STX 'L' addr(2) code+data cs(2) [ETX]
        let mut frame = request;
        if frame.last() == Some(&ETX) {
            frame = &frame[..frame.len() - 1];
        }
        if frame.len() < 6 || frame[0] != STX || frame[1] != FILTER {
            return None;
        }
        let address = ascii_hex_to_byte(&frame[2..4]).ok()?;

        let mut state = self.state();
        let controller = state.controllers.get_mut(&address)?;

        let body = &frame[1..frame.len() - 2];
        let checksum_ok = ascii_hex_to_byte(&frame[frame.len() - 2..])
            .map(|cs| cs == checksum(body))
            .unwrap_or(false);

        let command_part = &frame[4..frame.len() - 2];
        let codes = controller.model.codes();
        // longest matching code wins
        let matched = Command::ALL
            .iter()
            .copied()
            .filter(|c| command_part.starts_with(codes[c.index()].as_bytes()))
            .max_by_key(|c| codes[c.index()].len());

        let reject = state_fault_reject(&mut state.faults);
        let error_fault = state_fault_error(&mut state.faults);
        let corrupt = state_fault_corrupt(&mut state.faults);
        let controller = state.controllers.get_mut(&address)?;

        let result = match (checksum_ok, matched, error_fault) {
            (_, _, Some(code)) => Err(code),
            (false, _, _) => Err(2),
            (true, None, _) => Err(1),
            (true, Some(cmd), _) => {
                let data = &command_part[codes[cmd.index()].len()..];
                controller.respond(cmd, data, reject)
            }
        };

        let mut out = vec![STX, FILTER];
        out.extend_from_slice(&byte_to_ascii_hex(address));
        match result {
            Ok(data) => {
                out.extend_from_slice(data.as_bytes());
                let mut cs = checksum(&out[1..]);
                if corrupt {
                    cs = cs.wrapping_add(1);
                }
                out.extend_from_slice(&byte_to_ascii_hex(cs));
            }
            Err(code) => {
                out.push(ERROR_INDICATOR);
                out.extend_from_slice(format!("{:02}", code).as_bytes());
            }
        }
        out.push(ACK);
        Some(out)
    }
}

fn state_fault_reject(faults: &mut VecDeque<Fault>) -> Option<u8> {
    let pos = faults.iter().position(|f| matches!(f, Fault::Reject(_)))?;
    match faults.remove(pos) {
        Some(Fault::Reject(code)) => Some(code),
        _ => None,
    }
}

fn state_fault_error(faults: &mut VecDeque<Fault>) -> Option<u8> {
    let pos = faults.iter().position(|f| matches!(f, Fault::ErrorCode(_)))?;
    match faults.remove(pos) {
        Some(Fault::ErrorCode(code)) => Some(code),
        _ => None,
    }
}

fn state_fault_corrupt(faults: &mut VecDeque<Fault>) -> bool {
    match faults.iter().position(|f| *f == Fault::CorruptChecksum) {
        Some(pos) => faults.remove(pos).is_some(),
        None => false,
    }
}

impl LoveTransport for SimulatedBus {
    async fn write(&mut self, data: &[u8], timeout: Duration) -> LoveResult<usize> {
        let mut frame = data.to_vec();
        if let Some(eos) = self.output_eos {
            frame.push(eos);
        }

        for &b in &frame {
            self.state().wire.push(b);
            match self.byte_delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => tokio::task::yield_now().await,
            }
        }

        if self.take_fault(|f| *f == Fault::WriteTimeout).is_some() {
            self.stats_mut().timeouts += 1;
            return Err(LoveError::timeout("simulated write", timeout.as_millis() as u64));
        }

        trace!("sim bus request {:?}", frame);
        self.state().requests.push(frame.clone());
        let response = self.build_response(&frame);
        if let Some(response) = response {
            self.state().pending.push_back(response);
        }

        let mut stats = self.stats_mut();
        stats.requests_sent += 1;
        stats.bytes_sent += frame.len() as u64;
        Ok(data.len())
    }

    async fn read(&mut self, max: usize, timeout: Duration) -> LoveResult<ReadOutcome> {
        let response = self.state().pending.pop_front();

        if self.take_fault(|f| *f == Fault::ReadTimeout).is_some() {
            self.stats_mut().timeouts += 1;
            return Err(LoveError::timeout("simulated read", timeout.as_millis() as u64));
        }

        let Some(mut response) = response else {
            // nobody at that address
            self.stats_mut().timeouts += 1;
            return Err(LoveError::timeout("simulated read", timeout.as_millis() as u64));
        };

        self.state().wire.extend_from_slice(&response);

        if response.len() > max {
            response.truncate(max);
            return Ok(ReadOutcome::new(response, EomReason::Count));
        }
        if self.ack == AckMode::Stripped {
            response.pop();
        }

        let mut stats = self.stats_mut();
        stats.responses_received += 1;
        stats.bytes_received += response.len() as u64;
        Ok(ReadOutcome::new(response, EomReason::Eos))
    }

    async fn flush(&mut self) -> LoveResult<()> {
        self.state().pending.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn close(&mut self) -> LoveResult<()> {
        Ok(())
    }

    fn get_stats(&self) -> TransportStats {
        self.stats_mut().clone()
    }

    fn input_eos(&self) -> Option<u8> {
        self.input_eos
    }

    fn output_eos(&self) -> Option<u8> {
        self.output_eos
    }

    fn set_input_eos(&mut self, eos: Option<u8>) {
        self.input_eos = eos;
    }

    fn set_output_eos(&mut self, eos: Option<u8>) {
        self.output_eos = eos;
    }
}
