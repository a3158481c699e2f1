//! Trait abstractions for serial port reads and poll delays to enable testing

use async_trait::async_trait;
use std::io;
use std::time::Duration;

/// Trait for serial port I/O operations
#[async_trait]
pub trait SerialPortIO: Send {
    /// Number of bytes waiting in the receive buffer
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Read available bytes into `buf`, returning how many were read (0 at end of stream)
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Trait for the delay between two availability checks
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Wrapper around tokio_serial::SerialStream that implements SerialPortIO
pub struct TokioSerialPort {
    port: tokio_serial::SerialStream,
}

impl TokioSerialPort {
    pub fn new(port: tokio_serial::SerialStream) -> Self {
        Self { port }
    }
}

#[async_trait]
impl SerialPortIO for TokioSerialPort {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        use tokio_serial::SerialPort;
        self.port.bytes_to_read().map_err(io::Error::from)
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use tokio::io::AsyncReadExt;
        device_read(self.port.read(buf).await)
    }
}

/// A tty never ends on its own; a 0-byte read means the device went away
fn device_read(result: io::Result<usize>) -> io::Result<usize> {
    match result {
        Ok(0) => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "serial device closed",
        )),
        other => other,
    }
}

/// Sleeper backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
