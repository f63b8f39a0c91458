//! The packet-dispatch loop.
//!
//! Reads bytes from the board (directly, or through the ring-bus relay
//! queues), feeds them to the protocol decoder and drives the reader state
//! machine: polls get the framed status reply, commands get dispatched and
//! acknowledged with a single ACK byte. An unknown command byte stops the
//! whole service; everything else the line can throw at the loop is logged
//! and survived.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info, trace, warn};

use magcard_core::{Result, constants::ACK};
use magcard_protocol::{Inbound, Packet, PacketParser, encode_frame};
use magcard_reader::SharedReader;
use magcard_transport::BytePort;

/// Read chunk size. Comfortably above the largest frame.
const READ_CHUNK: usize = 256;

/// Drives one [`BytePort`] against the shared reader state machine.
pub struct PacketEngine<P: BytePort> {
    port: P,
    parser: PacketParser,
    reader: SharedReader,
    running: Arc<AtomicBool>,
}

impl<P: BytePort> PacketEngine<P> {
    pub fn new(port: P, reader: SharedReader, running: Arc<AtomicBool>) -> Self {
        Self {
            port,
            parser: PacketParser::new(),
            reader,
            running,
        }
    }

    /// Run until shutdown or a fatal protocol error.
    pub fn run(mut self) -> Result<()> {
        info!("packet engine running");
        while self.running.load(Ordering::Relaxed) {
            if let Err(e) = self.service() {
                error!(error = %e, "packet engine fatal, stopping service");
                self.running.store(false, Ordering::Relaxed);
                return Err(e);
            }
        }
        info!("packet engine stopped");
        Ok(())
    }

    /// One read window plus whatever complete items it produced.
    ///
    /// # Errors
    /// Only a fatal protocol error (unknown command) propagates. Transport
    /// hiccups and corrupt frames are logged and the loop goes on.
    pub fn service(&mut self) -> Result<()> {
        let mut buf = [0u8; READ_CHUNK];
        match self.port.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => self.parser.feed(&buf[..n]),
            Err(e) => {
                warn!(error = %e, "transport read failed");
                return Ok(());
            }
        }

        loop {
            match self.parser.next_inbound() {
                Ok(None) => break,
                Ok(Some(Inbound::Poll)) => self.handle_poll(),
                Ok(Some(Inbound::Stray(byte))) => {
                    trace!(byte, "transport sync byte passed through");
                }
                Ok(Some(Inbound::Packet(packet))) => self.handle_packet(&packet)?,
                Err(e) => warn!(error = %e, "discarded corrupt frame"),
            }
        }

        Ok(())
    }

    fn handle_poll(&mut self) {
        let reply = self.lock_reader().poll_reply();
        trace!(len = reply.len(), "poll reply");

        match encode_frame(&reply) {
            Ok(frame) => {
                if let Err(e) = self.port.write_all(&frame) {
                    warn!(error = %e, "poll reply write failed");
                }
            }
            Err(e) => warn!(error = %e, "poll reply did not fit a frame"),
        }
    }

    fn handle_packet(&mut self, packet: &Packet) -> Result<()> {
        if packet.is_empty() {
            trace!("empty packet ignored");
            return Ok(());
        }

        let outcome = self.lock_reader().dispatch(packet)?;
        if let Some(command) = outcome {
            debug!(%command, "command dispatched");
            if let Err(e) = self.port.write_all(&[ACK]) {
                warn!(error = %e, "acknowledgement write failed");
            }
        }
        Ok(())
    }

    fn lock_reader(&self) -> std::sync::MutexGuard<'_, magcard_reader::CardReader> {
        self.reader.lock().unwrap_or_else(|e| e.into_inner())
    }
}
