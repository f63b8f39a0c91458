//! Control plane for the emulated reader.
//!
//! A real cabinet gets cards inserted by players; the emulator gets them
//! from operator tooling over a small TCP protocol. A request is one opcode
//! byte plus an opcode-specific body, a response is one result byte plus an
//! optional body:
//!
//! | Opcode | Request body | Response body |
//! |--------|--------------|---------------|
//! | `1` GetStatus | none | `1` inserted / `0` ejected |
//! | `2` InsertCard | length byte + path bytes | none |
//! | `3` EjectCard | none | none |
//!
//! The server handles one connection at a time, one request per
//! connection, concurrently with the serial traffic. Malformed requests
//! get the failure byte back and never take the server down.

pub mod client;
pub mod server;

pub use client::ControlClient;
pub use server::{ControlServer, ControlServerConfig};

use std::net::SocketAddr;

use thiserror::Error;

/// Errors from the control-plane client and server.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The listener could not be bound.
    #[error("failed to bind control listener to {0}")]
    BindFailed(SocketAddr),

    /// The emulator answered with the failure byte.
    #[error("control request rejected by the emulator")]
    Rejected,

    /// The emulator answered with a byte outside the protocol.
    #[error("unexpected control response byte {0:#04x}")]
    BadResponse(u8),

    /// A card path above the 255-byte length limit.
    #[error("card path longer than 255 bytes")]
    PathTooLong,

    /// Low-level socket error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
