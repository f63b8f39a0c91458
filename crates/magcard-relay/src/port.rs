//! Queue-backed byte port for the packet engine.

use std::time::Duration;

use magcard_core::Result;
use magcard_transport::BytePort;

use crate::queue::RelayQueues;

/// How long a read sleeps when no relayed bytes are queued.
pub const DEFAULT_IDLE_WAIT: Duration = Duration::from_millis(20);

/// Presents the relay queue pair as an ordinary duplex byte channel.
///
/// Reads drain whatever the relay board has pushed inbound; an empty queue
/// behaves like a read timeout (a short sleep, then `Ok(0)`), so the
/// packet engine's retry loop works unchanged over the ring. Writes go to
/// the outbound queue for the board to hand to the ring.
#[derive(Debug)]
pub struct QueuePort {
    queues: RelayQueues,
    idle_wait: Duration,
}

impl QueuePort {
    pub fn new(queues: RelayQueues) -> Self {
        Self::with_idle_wait(queues, DEFAULT_IDLE_WAIT)
    }

    pub fn with_idle_wait(queues: RelayQueues, idle_wait: Duration) -> Self {
        Self { queues, idle_wait }
    }
}

impl BytePort for QueuePort {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.queues.read_inbound(buf);
        if n == 0 && !self.idle_wait.is_zero() {
            std::thread::sleep(self.idle_wait);
        }
        Ok(n)
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.queues.write_outbound(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant_port(queues: RelayQueues) -> QueuePort {
        QueuePort::with_idle_wait(queues, Duration::ZERO)
    }

    #[test]
    fn reads_drain_the_inbound_queue() {
        let queues = RelayQueues::new(8);
        queues.push_inbound(0x10).unwrap();
        queues.push_inbound(0x20).unwrap();

        let mut port = instant_port(queues);
        let mut buf = [0u8; 8];
        assert_eq!(port.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[0x10, 0x20]);
        assert_eq!(port.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn writes_land_on_the_outbound_queue() {
        let queues = RelayQueues::new(8);
        let mut port = instant_port(queues.clone());

        port.write_all(&[0x06]).unwrap();
        assert_eq!(queues.pop_outbound(), Some(0x06));
    }

    #[test]
    fn write_overflow_surfaces() {
        let queues = RelayQueues::new(1);
        let mut port = instant_port(queues);

        assert!(port.write_all(&[1, 2]).is_err());
    }
}
