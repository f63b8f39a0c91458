//! Control-plane client used by the operator tooling.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use magcard_core::constants::{
    CONTROL_CARD_EJECTED, CONTROL_CARD_INSERTED, CONTROL_EJECT_CARD, CONTROL_FAILURE,
    CONTROL_GET_STATUS, CONTROL_INSERT_CARD, CONTROL_OK,
};

use crate::ControlError;

/// Client for the emulator's control plane.
///
/// The wire contract is one request per connection, so every call opens a
/// fresh connection to the daemon.
#[derive(Debug, Clone)]
pub struct ControlClient {
    addr: SocketAddr,
}

impl ControlClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Whether a card is currently inserted.
    ///
    /// # Errors
    /// [`ControlError::Rejected`] when the daemon reports failure and
    /// [`ControlError::BadResponse`] for bytes outside the protocol.
    pub async fn status(&self) -> Result<bool, ControlError> {
        let body = self.roundtrip(&[CONTROL_GET_STATUS], 1).await?;
        match body[0] {
            CONTROL_CARD_INSERTED => Ok(true),
            CONTROL_CARD_EJECTED => Ok(false),
            byte => Err(ControlError::BadResponse(byte)),
        }
    }

    /// Insert the card stored at `path` (daemon-side path).
    ///
    /// # Errors
    /// [`ControlError::PathTooLong`] when the path does not fit the
    /// length-prefixed wire field; otherwise as for [`status`](Self::status).
    pub async fn insert(&self, path: &str) -> Result<(), ControlError> {
        let bytes = path.as_bytes();
        let len = u8::try_from(bytes.len()).map_err(|_| ControlError::PathTooLong)?;

        let mut request = Vec::with_capacity(2 + bytes.len());
        request.push(CONTROL_INSERT_CARD);
        request.push(len);
        request.extend_from_slice(bytes);

        self.roundtrip(&request, 0).await?;
        Ok(())
    }

    /// Eject whatever card is inserted.
    pub async fn eject(&self) -> Result<(), ControlError> {
        self.roundtrip(&[CONTROL_EJECT_CARD], 0).await?;
        Ok(())
    }

    /// One request/response exchange on a fresh connection.
    async fn roundtrip(&self, request: &[u8], body_len: usize) -> Result<Vec<u8>, ControlError> {
        let mut stream = TcpStream::connect(self.addr).await?;
        stream.write_all(request).await?;
        debug!(addr = %self.addr, opcode = request[0], "control request sent");

        let mut result = [0u8; 1];
        stream.read_exact(&mut result).await?;
        match result[0] {
            CONTROL_OK => {}
            CONTROL_FAILURE => return Err(ControlError::Rejected),
            byte => return Err(ControlError::BadResponse(byte)),
        }

        let mut body = vec![0u8; body_len];
        if body_len > 0 {
            stream.read_exact(&mut body).await?;
        }
        Ok(body)
    }
}
