//! The conversion-board service loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info, warn};

use magcard_core::{
    Error, Result,
    constants::{RELAY_DATA, RELAY_PENDING, RELAY_POLL_DATA, RELAY_POLL_STATUS},
};
use magcard_transport::BytePort;

use crate::queue::RelayQueues;

/// Emulates the board relaying between the ring bus and the reader.
///
/// Every ring transaction is exactly two bytes from the host, dispatched
/// on the first:
///
/// - `0x01 <data>`: the host pushes a byte toward the reader. The board
///   echoes both bytes as the acknowledgement and queues `data` inbound.
///   A full inbound queue stops the board.
/// - `0x80 <ignored>`: non-destructive output poll; the reply flags
///   whether reader output is pending.
/// - `0x81 <ignored>`: destructive output poll; the reply carries the next
///   queued byte, or zero when there is none.
///
/// Any other lead byte means the board has lost ring framing, which is
/// fatal. Either fatal clears the shared run flag, so the packet engine
/// stops instead of stalling against dead queues.
pub struct RelayBoard<P: BytePort> {
    port: P,
    queues: RelayQueues,
    running: Arc<AtomicBool>,
}

impl<P: BytePort> RelayBoard<P> {
    pub fn new(port: P, queues: RelayQueues, running: Arc<AtomicBool>) -> Self {
        Self {
            port,
            queues,
            running,
        }
    }

    /// Service the ring until shutdown or a fatal protocol error.
    pub fn run(mut self) -> Result<()> {
        info!("relay board running");
        while self.running.load(Ordering::Relaxed) {
            if let Err(e) = self.step() {
                error!(error = %e, "relay board fatal, stopping service");
                self.running.store(false, Ordering::Relaxed);
                return Err(e);
            }
        }
        info!("relay board stopped");
        Ok(())
    }

    /// Service at most one 2-byte transaction.
    ///
    /// Returns `Ok(false)` when the ring was idle for the read window.
    ///
    /// # Errors
    /// `Error::QueueOverflow` when the inbound queue is full and
    /// `Error::RelayDesync` for an unrecognised lead byte. Both are fatal
    /// to the board.
    pub fn step(&mut self) -> Result<bool> {
        let Some(frame) = self.read_transaction()? else {
            return Ok(false);
        };

        match frame[0] {
            RELAY_DATA => {
                // Echo is the ring-level acknowledgement.
                self.reply(&frame);
                self.queues.push_inbound(frame[1])?;
            }
            RELAY_POLL_STATUS => {
                let flag = if self.queues.outbound_pending() {
                    RELAY_PENDING
                } else {
                    0x00
                };
                self.reply(&[RELAY_POLL_STATUS, flag]);
            }
            RELAY_POLL_DATA => {
                let byte = self.queues.pop_outbound().unwrap_or(0x00);
                self.reply(&[RELAY_POLL_DATA, byte]);
            }
            code => {
                return Err(Error::RelayDesync { code });
            }
        }

        Ok(true)
    }

    /// Collect exactly two bytes, riding out read timeouts and transport
    /// hiccups. Gives up and returns `None` once shutdown is requested.
    fn read_transaction(&mut self) -> Result<Option<[u8; 2]>> {
        let mut frame = [0u8; 2];
        let mut have = 0;

        while have < 2 {
            let n = match self.port.read(&mut frame[have..]) {
                Ok(n) => n,
                Err(e) => {
                    warn!(error = %e, "ring read failed");
                    return Ok(None);
                }
            };
            have += n;
            if n == 0 {
                if have == 0 || !self.running.load(Ordering::Relaxed) {
                    return Ok(None);
                }
                // Half a transaction is in flight; keep waiting for the
                // second byte.
                debug!("waiting for second ring byte");
            }
        }

        Ok(Some(frame))
    }

    fn reply(&mut self, bytes: &[u8]) {
        if let Err(e) = self.port.write_all(bytes) {
            warn!(error = %e, "ring reply failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use magcard_transport::MockPort;

    fn board_with(
        script: &[u8],
        capacity: usize,
    ) -> (RelayBoard<MockPort>, RelayQueues, Arc<AtomicBool>) {
        let mut port = MockPort::new();
        port.push(script);
        let queues = RelayQueues::new(capacity);
        let running = Arc::new(AtomicBool::new(true));
        (
            RelayBoard::new(port, queues.clone(), running.clone()),
            queues,
            running,
        )
    }

    #[test]
    fn data_byte_is_echoed_and_queued() {
        let (mut board, queues, _running) = board_with(&[0x01, 0x42], 16);

        assert!(board.step().unwrap());
        assert_eq!(board.port.written(), &[0x01, 0x42]);

        let mut buf = [0u8; 4];
        assert_eq!(queues.read_inbound(&mut buf), 1);
        assert_eq!(buf[0], 0x42);
    }

    #[test]
    fn status_poll_reports_pending_output() {
        let (mut board, queues, _running) = board_with(&[0x80, 0x00, 0x80, 0x00], 16);

        assert!(board.step().unwrap());
        assert_eq!(board.port.take_written(), vec![0x80, 0x00]);

        queues.write_outbound(&[0x99]).unwrap();
        assert!(board.step().unwrap());
        assert_eq!(board.port.take_written(), vec![0x80, RELAY_PENDING]);
    }

    #[test]
    fn data_poll_drains_one_byte_per_transaction() {
        let (mut board, queues, _running) = board_with(&[0x81, 0x00, 0x81, 0x00, 0x81, 0x00], 16);
        queues.write_outbound(&[0xAA, 0xBB]).unwrap();

        board.step().unwrap();
        board.step().unwrap();
        board.step().unwrap();
        assert_eq!(
            board.port.written(),
            &[0x81, 0xAA, 0x81, 0xBB, 0x81, 0x00]
        );
        assert!(!queues.outbound_pending());
    }

    #[test]
    fn split_transaction_reassembles() {
        let (mut board, queues, _running) = board_with(&[0x01], 16);

        // Second byte arrives on a later read.
        board.port.push(&[0x55]);
        assert!(board.step().unwrap());

        let mut buf = [0u8; 1];
        assert_eq!(queues.read_inbound(&mut buf), 1);
        assert_eq!(buf[0], 0x55);
    }

    #[test]
    fn idle_ring_is_not_an_error() {
        let (mut board, _queues, _running) = board_with(&[], 16);
        assert!(!board.step().unwrap());
    }

    #[test]
    fn unknown_lead_byte_is_fatal() {
        let (mut board, _queues, running) = board_with(&[0x7F, 0x00], 16);

        let err = board.step().unwrap_err();
        assert!(matches!(err, Error::RelayDesync { code: 0x7F }));

        // run() would clear the flag; step() leaves that to the caller.
        assert!(running.load(Ordering::Relaxed));
    }

    #[test]
    fn inbound_overflow_is_fatal() {
        let (mut board, _queues, _running) = board_with(&[0x01, 0x11, 0x01, 0x22], 1);

        assert!(board.step().unwrap());
        assert!(matches!(
            board.step(),
            Err(Error::QueueOverflow { capacity: 1 })
        ));
    }

    #[test]
    fn run_clears_the_shared_flag_on_fatal() {
        let (board, _queues, running) = board_with(&[0x7F, 0x00], 16);

        assert!(board.run().is_err());
        assert!(!running.load(Ordering::Relaxed));
    }
}
