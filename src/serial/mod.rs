//! # Serial Communication Module
//!
//! Reads newline-terminated text from the GPS node's serial port.
//!
//! This module handles:
//! - Opening the serial port once at startup (8N1, no flow control)
//! - Polling for incoming bytes at a fixed interval
//! - Splitting the byte stream into lines and decoding them as UTF-8
//! - Skipping lines that are not valid UTF-8

pub mod port_trait;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::config::SerialConfig;
use crate::error::{GpsRelayError, Result};
use port_trait::{SerialPortIO, Sleeper, TokioSerialPort, TokioSleeper};

/// Line terminator sent by the GPS node
const LINE_TERMINATOR: u8 = b'\n';

/// Bytes requested from the port per read
const READ_CHUNK_SIZE: usize = 256;

/// A lazy sequence of text lines
///
/// Lines come back trimmed. `Ok(None)` means the underlying stream ended,
/// which a live serial port never does.
#[async_trait]
pub trait LineSource: Send {
    async fn next_line(&mut self) -> Result<Option<String>>;
}

/// GPS node serial port handle
///
/// Opened once at startup; turn it into a [`SerialLineReader`] with
/// [`GpsSerial::into_lines`].
pub struct GpsSerial {
    port: TokioSerialPort,
    device_path: String,
    poll_interval: Duration,
}

impl std::fmt::Debug for GpsSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpsSerial")
            .field("device_path", &self.device_path)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl GpsSerial {
    /// Open the configured serial port
    ///
    /// # Errors
    ///
    /// Returns [`GpsRelayError::Serial`] if the device cannot be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use gps_relay::config::SerialConfig;
    /// use gps_relay::serial::GpsSerial;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let serial = GpsSerial::open(&SerialConfig::default())?;
    ///     println!("Listening on {}", serial.device_path());
    ///     Ok(())
    /// }
    /// ```
    pub fn open(config: &SerialConfig) -> Result<Self> {
        debug!("Opening serial port {} at {} baud", config.port, config.baud_rate);

        let port = Self::open_port(&config.port, config.baud_rate)?;
        info!("Opened GPS serial port at {} ({} baud)", config.port, config.baud_rate);

        Ok(Self {
            port: TokioSerialPort::new(port),
            device_path: config.port.clone(),
            poll_interval: config.poll_interval(),
        })
    }

    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| GpsRelayError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Consume the handle and start reading lines
    pub fn into_lines(self) -> SerialLineReader<TokioSerialPort, TokioSleeper> {
        SerialLineReader::new(self.port, TokioSleeper, self.poll_interval)
    }
}

/// Splits a serial byte stream into UTF-8 lines
///
/// Availability checks are spaced `poll_interval` apart; the first one is
/// immediate. Once bytes are available the reader keeps reading until it has
/// a full line. Bytes after the terminator stay buffered for the next call.
pub struct SerialLineReader<P, S> {
    port: P,
    sleeper: S,
    poll_interval: Duration,
    buffer: BytesMut,
    polled: bool,
    eof: bool,
}

impl<P: SerialPortIO, S: Sleeper> SerialLineReader<P, S> {
    pub fn new(port: P, sleeper: S, poll_interval: Duration) -> Self {
        Self {
            port,
            sleeper,
            poll_interval,
            buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
            polled: false,
            eof: false,
        }
    }

    /// Block until buffered or incoming bytes exist
    async fn wait_for_data(&mut self) -> Result<()> {
        loop {
            if self.polled {
                self.sleeper.sleep(self.poll_interval).await;
            }
            self.polled = true;

            if !self.buffer.is_empty() || self.eof {
                return Ok(());
            }

            let waiting = self
                .port
                .bytes_to_read()
                .map_err(|e| GpsRelayError::Serial(format!("Failed to poll serial port: {}", e)))?;
            if waiting > 0 {
                return Ok(());
            }
        }
    }

    async fn fill_buffer(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let n = self
            .port
            .read(&mut chunk)
            .await
            .map_err(|e| GpsRelayError::Serial(format!("Failed to read serial port: {}", e)))?;

        if n == 0 {
            debug!("Serial stream reached end of file");
            self.eof = true;
        } else {
            self.buffer.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }

    /// Next raw line including its terminator, or the trailing bytes at end of stream
    async fn next_raw_line(&mut self) -> Result<Option<Bytes>> {
        if self.eof && self.buffer.is_empty() {
            return Ok(None);
        }

        self.wait_for_data().await?;

        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == LINE_TERMINATOR) {
                return Ok(Some(self.buffer.split_to(pos + 1).freeze()));
            }

            if self.eof {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.buffer.split().freeze()));
            }

            self.fill_buffer().await?;
        }
    }
}

#[async_trait]
impl<P: SerialPortIO, S: Sleeper> LineSource for SerialLineReader<P, S> {
    async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            let Some(raw) = self.next_raw_line().await? else {
                return Ok(None);
            };

            match std::str::from_utf8(&raw) {
                Ok(text) => return Ok(Some(text.trim().to_string())),
                Err(e) => {
                    warn!("Skipping line that is not valid UTF-8 ({} bytes): {}", raw.len(), e);
                }
            }
        }
    }
}
