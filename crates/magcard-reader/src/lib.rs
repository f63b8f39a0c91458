//! Card-reader state machine.
//!
//! This crate owns the emulated unit's state: card position, cover and
//! dispenser flags, the two status codes and the three track buffers. The
//! packet-dispatch loop and the control plane both mutate one
//! [`CardReader`] instance, shared behind a single mutex so a track
//! operation and a concurrent virtual insert or eject can never interleave
//! into an inconsistent position/track pairing.

pub mod reader;

pub use reader::{CardReader, ReaderOptions};

use std::sync::{Arc, Mutex};

/// The one reader instance, shared by every execution context.
pub type SharedReader = Arc<Mutex<CardReader>>;

/// Wrap a reader for sharing across the dispatch loop and control plane.
pub fn shared(reader: CardReader) -> SharedReader {
    Arc::new(Mutex::new(reader))
}
