//! Control-plane TCP server.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use magcard_core::constants::{
    CONTROL_CARD_EJECTED, CONTROL_CARD_INSERTED, CONTROL_EJECT_CARD, CONTROL_FAILURE,
    CONTROL_GET_STATUS, CONTROL_INSERT_CARD, CONTROL_OK, DEFAULT_CONTROL_PORT,
};
use magcard_reader::SharedReader;

use crate::ControlError;

/// Configuration for the control listener.
#[derive(Debug, Clone)]
pub struct ControlServerConfig {
    /// Address to bind the listener to.
    pub bind_addr: SocketAddr,
}

impl Default for ControlServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_CONTROL_PORT)),
        }
    }
}

/// Sequential control-plane listener.
///
/// Connections are served strictly one at a time: each carries exactly one
/// request, gets its response and is closed. The shared reader lock is
/// held only for the state mutation itself, so a request can never
/// interleave with a command dispatch half way through.
pub struct ControlServer {
    listener: TcpListener,
    reader: SharedReader,
}

impl ControlServer {
    /// Bind the listener.
    ///
    /// # Errors
    /// Returns [`ControlError::BindFailed`] when the address is taken or
    /// not bindable.
    pub async fn bind(config: ControlServerConfig, reader: SharedReader) -> Result<Self, ControlError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|_| ControlError::BindFailed(config.bind_addr))?;

        info!(addr = %config.bind_addr, "control plane listening");

        Ok(Self { listener, reader })
    }

    /// The bound address. Lets tests bind port 0 and discover the port.
    pub fn local_addr(&self) -> Result<SocketAddr, ControlError> {
        self.listener.local_addr().map_err(Into::into)
    }

    /// Accept and serve connections until the task is cancelled.
    ///
    /// Per-connection failures are logged and the next connection is
    /// served; only a listener-level error ends the loop.
    pub async fn run(self) -> Result<(), ControlError> {
        loop {
            let (mut stream, addr) = self.listener.accept().await?;
            debug!(%addr, "control connection");
            serve_connection(&mut stream, &self.reader).await;
        }
    }
}

/// Serve exactly one request on `stream`.
///
/// Every failure path answers with the failure byte when the socket still
/// allows it; none of them propagates.
async fn serve_connection(stream: &mut TcpStream, reader: &SharedReader) {
    let mut opcode = [0u8; 1];
    if stream.read_exact(&mut opcode).await.is_err() {
        debug!("connection closed before an opcode arrived");
        return;
    }

    let response = match opcode[0] {
        CONTROL_GET_STATUS => {
            let inserted = lock(reader).card_inserted();
            debug!(inserted, "control: get status");
            let body = if inserted {
                CONTROL_CARD_INSERTED
            } else {
                CONTROL_CARD_EJECTED
            };
            vec![CONTROL_OK, body]
        }

        CONTROL_INSERT_CARD => match read_insert_path(stream).await {
            Ok(path) => {
                let outcome = lock(reader).insert_card(path);
                match outcome {
                    Ok(()) => vec![CONTROL_OK],
                    Err(e) => {
                        warn!(error = %e, "control: insert failed");
                        vec![CONTROL_FAILURE]
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "control: malformed insert request");
                vec![CONTROL_FAILURE]
            }
        },

        CONTROL_EJECT_CARD => {
            debug!("control: eject");
            lock(reader).remove_card();
            vec![CONTROL_OK]
        }

        code => {
            warn!(opcode = code, "control: unknown opcode");
            vec![CONTROL_FAILURE]
        }
    };

    if let Err(e) = stream.write_all(&response).await {
        warn!(error = %e, "control response write failed");
    }
}

/// Read the InsertCard body: one length byte, then that many path bytes.
/// The length byte bounds the read, so an oversized path cannot arrive.
async fn read_insert_path(stream: &mut TcpStream) -> io::Result<PathBuf> {
    let mut len = [0u8; 1];
    stream.read_exact(&mut len).await?;

    let mut raw = vec![0u8; usize::from(len[0])];
    stream.read_exact(&mut raw).await?;

    let path = String::from_utf8(raw)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "card path is not UTF-8"))?;
    Ok(PathBuf::from(path))
}

fn lock(reader: &SharedReader) -> std::sync::MutexGuard<'_, magcard_reader::CardReader> {
    reader.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_the_standard_port() {
        let config = ControlServerConfig::default();
        assert_eq!(config.bind_addr.port(), DEFAULT_CONTROL_PORT);
    }
}
