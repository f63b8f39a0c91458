//! Daemon configuration.
//!
//! Defaults match the most common cabinet wiring (ring-bus relay, shutter
//! unit); a JSON file overrides the defaults, the `MAGCARD_SERIAL`
//! environment variable overrides the serial device, and CLI flags
//! override everything.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use magcard_core::{Error, Result, constants::DEFAULT_CONTROL_PORT};
use magcard_reader::ReaderOptions;
use magcard_relay::queue::DEFAULT_QUEUE_CAPACITY;
use magcard_transport::SerialSettings;

/// Environment variable overriding the serial device path.
pub const SERIAL_ENV_VAR: &str = "MAGCARD_SERIAL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Serial line to the game board (or to the ring bus).
    pub serial: SerialSettings,

    /// Emulate the ring-bus conversion board between the line and the
    /// packet engine. Off means the board talks straight RS232.
    pub relay_mode: bool,

    /// Reader behaviour switches.
    pub reader: ReaderOptions,

    /// Card image backing the reader until the control plane picks one.
    pub card_path: PathBuf,

    /// Control-plane bind address.
    pub control_addr: SocketAddr,

    /// Capacity of each relay queue, in bytes.
    pub queue_capacity: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            serial: SerialSettings::default(),
            relay_mode: true,
            reader: ReaderOptions::default(),
            card_path: PathBuf::from("card.bin"),
            control_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_CONTROL_PORT)),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl DaemonConfig {
    /// Parse a configuration document.
    ///
    /// # Errors
    /// `Error::Config` describing the parse failure.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from an optional file and apply the environment override.
    ///
    /// # Errors
    /// Fails when the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let json = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("{}: {}", path.display(), e))
                })?;
                Self::from_json(&json)?
            }
            None => Self::default(),
        };

        if let Ok(serial_path) = std::env::var(SERIAL_ENV_VAR) {
            config.serial.path = serial_path;
        }

        Ok(config)
    }
}
