//! Byte transport abstraction
//!
//! The transaction engine drives any [`LoveTransport`]: a byte-oriented
//! write/read/flush service with configurable end-of-message (EOS) bytes.
//! [`SerialTransport`] (feature `serial`) implements it over `tokio-serial`.

use std::time::Duration;

use bytes::Bytes;
use tracing::info;

use crate::error::LoveResult;
use crate::frame::format_frame;

/// Why a read stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EomReason {
    /// Input end-of-message byte seen
    Eos,
    /// Requested byte count reached
    Count,
    /// Transport ran out of data
    End,
}

/// Bytes returned by one read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    pub data: Bytes,
    pub eom: EomReason,
}

impl ReadOutcome {
    pub fn new(data: impl Into<Bytes>, eom: EomReason) -> Self {
        Self {
            data: data.into(),
            eom,
        }
    }
}

/// Transport layer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Byte transport consumed by the transaction engine
///
/// Timeouts must be reported as [`LoveError::Timeout`](crate::LoveError::Timeout)
/// so the engine can retry them; every other error aborts the transaction.
pub trait LoveTransport: Send + Sync {
    /// Write `data`, appending the output EOS byte when one is configured
    fn write(
        &mut self,
        data: &[u8],
        timeout: Duration,
    ) -> impl std::future::Future<Output = LoveResult<usize>> + Send;

    /// Read up to `max` bytes
    fn read(
        &mut self,
        max: usize,
        timeout: Duration,
    ) -> impl std::future::Future<Output = LoveResult<ReadOutcome>> + Send;

    /// Discard pending input
    fn flush(&mut self) -> impl std::future::Future<Output = LoveResult<()>> + Send;

    fn is_connected(&self) -> bool;

    fn close(&mut self) -> impl std::future::Future<Output = LoveResult<()>> + Send;

    fn get_stats(&self) -> TransportStats;

    fn input_eos(&self) -> Option<u8>;

    fn output_eos(&self) -> Option<u8>;

    fn set_input_eos(&mut self, eos: Option<u8>);

    fn set_output_eos(&mut self, eos: Option<u8>);
}

/// Log a frame at info level
pub(crate) fn log_packet(port: &str, direction: &str, data: &[u8], address: Option<u8>) {
    let text = format_frame(data);
    match address {
        Some(addr) => info!("[LOVELINK-{}] {} addr:0x{:02X} {}", port, direction, addr, text),
        None => info!("[LOVELINK-{}] {} {}", port, direction, text),
    }
}

#[cfg(feature = "serial")]
pub use serial::{SerialSettings, SerialTransport};

#[cfg(feature = "serial")]
mod serial {
    use std::time::Duration;

    use bytes::BytesMut;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::timeout;
    use tracing::debug;

    use super::{EomReason, LoveTransport, ReadOutcome, TransportStats};
    use crate::constants::ACK;
    use crate::error::{LoveError, LoveResult};

    /// Serial line settings
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SerialSettings {
        pub path: String,
        pub baud_rate: u32,
        pub data_bits: tokio_serial::DataBits,
        pub stop_bits: tokio_serial::StopBits,
        pub parity: tokio_serial::Parity,
    }

    impl SerialSettings {
        /// 8 data bits, no parity, 1 stop bit
        pub fn new(path: &str, baud_rate: u32) -> Self {
            Self {
                path: path.to_string(),
                baud_rate,
                data_bits: tokio_serial::DataBits::Eight,
                stop_bits: tokio_serial::StopBits::One,
                parity: tokio_serial::Parity::None,
            }
        }

        pub fn with_data_bits(mut self, data_bits: tokio_serial::DataBits) -> Self {
            self.data_bits = data_bits;
            self
        }

        pub fn with_stop_bits(mut self, stop_bits: tokio_serial::StopBits) -> Self {
            self.stop_bits = stop_bits;
            self
        }

        pub fn with_parity(mut self, parity: tokio_serial::Parity) -> Self {
            self.parity = parity;
            self
        }
    }

    /// Lovelink over a serial port
    pub struct SerialTransport {
        port: Option<tokio_serial::SerialStream>,
        settings: SerialSettings,
        input_eos: Option<u8>,
        output_eos: Option<u8>,
        strip_input_eos: bool,
        stats: TransportStats,
    }

    impl SerialTransport {
        /// Open the port with ACK as input EOS, stripped from reads
        pub fn open(settings: SerialSettings) -> LoveResult<Self> {
            let mut transport = Self {
                port: None,
                settings,
                input_eos: Some(ACK),
                output_eos: None,
                strip_input_eos: true,
                stats: TransportStats::default(),
            };
            transport.connect()?;
            Ok(transport)
        }

        /// Keep the input EOS byte at the end of returned data
        pub fn with_preserved_input_eos(mut self) -> Self {
            self.strip_input_eos = false;
            self
        }

        pub fn settings(&self) -> &SerialSettings {
            &self.settings
        }

        fn connect(&mut self) -> LoveResult<()> {
            let builder = tokio_serial::new(&self.settings.path, self.settings.baud_rate)
                .data_bits(self.settings.data_bits)
                .stop_bits(self.settings.stop_bits)
                .parity(self.settings.parity);

            let port = tokio_serial::SerialStream::open(&builder).map_err(|e| {
                LoveError::connection(format!(
                    "Failed to open serial port {}: {}",
                    self.settings.path, e
                ))
            })?;

            debug!(
                "Opened {} at {} baud",
                self.settings.path, self.settings.baud_rate
            );
            self.port = Some(port);
            Ok(())
        }

        fn port_mut(&mut self) -> LoveResult<&mut tokio_serial::SerialStream> {
            self.port
                .as_mut()
                .ok_or_else(|| LoveError::connection("Serial port not connected"))
        }
    }

    impl LoveTransport for SerialTransport {
        async fn write(&mut self, data: &[u8], limit: Duration) -> LoveResult<usize> {
            let mut out = BytesMut::with_capacity(data.len() + 1);
            out.extend_from_slice(data);
            if let Some(eos) = self.output_eos {
                out.extend_from_slice(&[eos]);
            }

            let port = self.port_mut()?;
            let result = timeout(limit, async {
                port.write_all(&out).await?;
                port.flush().await
            })
            .await;

            match result {
                Ok(Ok(())) => {
                    self.stats.requests_sent += 1;
                    self.stats.bytes_sent += out.len() as u64;
                    Ok(data.len())
                }
                Ok(Err(e)) => {
                    self.stats.errors += 1;
                    Err(LoveError::transport(format!("Serial write error: {}", e)))
                }
                Err(_) => {
                    self.stats.timeouts += 1;
                    Err(LoveError::timeout("serial write", limit.as_millis() as u64))
                }
            }
        }

        async fn read(&mut self, max: usize, limit: Duration) -> LoveResult<ReadOutcome> {
            let eos = self.input_eos;
            let strip = self.strip_input_eos;
            let port = self.port_mut()?;

            let mut buf = BytesMut::with_capacity(max);
            let mut byte = [0u8; 1];
            let mut reason = EomReason::Count;

            let result = timeout(limit, async {
                while buf.len() < max {
                    if port.read(&mut byte).await? == 0 {
                        reason = EomReason::End;
                        break;
                    }
                    if Some(byte[0]) == eos {
                        if !strip {
                            buf.extend_from_slice(&byte);
                        }
                        reason = EomReason::Eos;
                        break;
                    }
                    buf.extend_from_slice(&byte);
                }
                Ok::<(), std::io::Error>(())
            })
            .await;

            match result {
                Ok(Ok(())) => {
                    self.stats.responses_received += 1;
                    self.stats.bytes_received += buf.len() as u64;
                    Ok(ReadOutcome::new(buf.freeze(), reason))
                }
                Ok(Err(e)) => {
                    self.stats.errors += 1;
                    Err(LoveError::transport(format!("Serial read error: {}", e)))
                }
                Err(_) => {
                    self.stats.timeouts += 1;
                    Err(LoveError::timeout("serial read", limit.as_millis() as u64))
                }
            }
        }

        async fn flush(&mut self) -> LoveResult<()> {
            use tokio_serial::SerialPort;

            let port = self.port_mut()?;
            port.clear(tokio_serial::ClearBuffer::Input)
                .map_err(|e| LoveError::transport(format!("Serial flush error: {}", e)))
        }

        fn is_connected(&self) -> bool {
            self.port.is_some()
        }

        async fn close(&mut self) -> LoveResult<()> {
            self.port = None;
            Ok(())
        }

        fn get_stats(&self) -> TransportStats {
            self.stats.clone()
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
}
