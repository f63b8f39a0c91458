//! Serial line transport.
//!
//! The reader protocol runs over a raw 8N1 serial line. Depending on the
//! cabinet wiring the line is either the reader's own RS232 port or the
//! ring-bus pair, so baud rate, parity and flow control are all
//! configurable. Reads are bounded by a timeout so the owning loop can
//! notice shutdown; a timeout surfaces as `Ok(0)`, never as an error.

use std::io::{self, Read, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, StopBits};
use tracing::{debug, info};

use magcard_core::{Error, Result};

use crate::BytePort;

/// Default read timeout window in milliseconds.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 200;

/// Serial line parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Device path, e.g. `/dev/ttyUSB0`.
    pub path: String,

    /// Line speed in baud.
    pub baud_rate: u32,

    /// Use even parity instead of none.
    pub even_parity: bool,

    /// Use RTS/CTS hardware flow control.
    pub flow_control: bool,

    /// Read timeout window in milliseconds.
    pub read_timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            path: "/dev/ttyUSB0".to_string(),
            baud_rate: 2_000_000,
            even_parity: false,
            flow_control: false,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

/// An open serial line implementing [`BytePort`].
pub struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialLink {
    /// Open and configure the line: 8 data bits, 1 stop bit, parity and
    /// flow control per the settings.
    ///
    /// # Errors
    /// Fails when the device cannot be opened or configured. Open failure
    /// is fatal at startup; there is nothing to emulate without a line to
    /// the board.
    pub fn open(settings: &SerialSettings) -> Result<Self> {
        let parity = if settings.even_parity {
            Parity::Even
        } else {
            Parity::None
        };
        let flow = if settings.flow_control {
            FlowControl::Hardware
        } else {
            FlowControl::None
        };

        let port = serialport::new(settings.path.as_str(), settings.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(parity)
            .flow_control(flow)
            .timeout(Duration::from_millis(settings.read_timeout_ms))
            .open()
            .map_err(|e| Error::Transport(format!("{}: {}", settings.path, e)))?;

        info!(
            path = %settings.path,
            baud = settings.baud_rate,
            parity = ?parity,
            flow = ?flow,
            "serial line open"
        );

        Ok(SerialLink { port })
    }
}

impl BytePort for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.port.write_all(buf)?;
        debug!(len = buf.len(), "wrote bytes to serial line");
        Ok(())
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("port", &self.port.name())
            .finish()
    }
}
