//! Serial port transport

use std::io;
use std::time::Duration;

use retry::{delay::Exponential, retry};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use super::SisTransport;
use crate::config::SerialConfig;

/// A serial line to a device, 8N1 without flow control.
///
/// Reads time out after the configured poll interval so that the client's
/// background thread can notice shutdown.
///
/// ```no_run
/// use std::time::Duration;
/// use transport::config::SerialConfig;
/// use transport::io::SerialTransport;
///
/// let config = SerialConfig {
///     path: "/dev/ttyUSB0".to_string(),
///     baud_rate: 9600,
/// };
/// let transport = SerialTransport::open(&config, Duration::from_millis(50))?;
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open the port, retrying with exponential backoff (200ms, 400ms, 800ms,
    /// 1600ms, 3200ms). USB adapters take a moment to appear after plugging in.
    pub fn open(config: &SerialConfig, read_timeout: Duration) -> io::Result<Self> {
        let port = retry(Exponential::from_millis(200).take(5), || {
            tracing::debug!(path = %config.path, baud_rate = config.baud_rate, "opening serial port");
            serialport::new(&config.path, config.baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(read_timeout)
                .open()
                .inspect_err(|e| tracing::debug!(error = %e, "error opening serial port"))
        })
        .map_err(|e| io::Error::from(e.error))?;

        tracing::info!(path = %config.path, "serial port open");
        Ok(Self { port })
    }

    /// Wrap a port that has already been opened and configured.
    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl SisTransport for SerialTransport {
    type Reader = Box<dyn SerialPort>;
    type Writer = Box<dyn SerialPort>;

    fn split(self) -> io::Result<(Self::Reader, Self::Writer)> {
        let reader = self.port.try_clone()?;
        Ok((reader, self.port))
    }
}
