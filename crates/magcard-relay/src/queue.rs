//! Byte queues between the relay board and the packet engine.

use std::sync::{Arc, Mutex, MutexGuard};

use magcard_core::{Error, Result};

/// Default capacity of each relay queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Fixed-capacity circular byte buffer.
///
/// `head` is the next write slot and `tail` the next read slot, both
/// wrapping modulo the capacity. An explicit element count disambiguates
/// empty from full, so all `capacity` slots are usable.
#[derive(Debug)]
pub struct RingQueue {
    buf: Box<[u8]>,
    head: usize,
    tail: usize,
    len: usize,
}

impl RingQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    /// Append one byte.
    ///
    /// # Errors
    /// `Error::QueueOverflow` when the queue is full. The relay treats an
    /// inbound overflow as fatal: the packet engine has stopped draining
    /// and the ring would only keep piling bytes on.
    pub fn push(&mut self, byte: u8) -> Result<()> {
        if self.len == self.buf.len() {
            return Err(Error::QueueOverflow {
                capacity: self.buf.len(),
            });
        }
        self.buf[self.head] = byte;
        self.head = (self.head + 1) % self.buf.len();
        self.len += 1;
        Ok(())
    }

    /// Remove and return the oldest byte.
    pub fn pop(&mut self) -> Option<u8> {
        if self.len == 0 {
            return None;
        }
        let byte = self.buf[self.tail];
        self.tail = (self.tail + 1) % self.buf.len();
        self.len -= 1;
        Some(byte)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.buf.len()
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

/// The inbound/outbound queue pair shared by the relay board and the
/// packet engine.
///
/// Inbound carries board-to-reader bytes (written only by the relay, read
/// only by the engine); outbound carries reader-to-board bytes (written
/// only by the engine, read only by the relay). The methods are split
/// along those roles.
#[derive(Debug, Clone)]
pub struct RelayQueues {
    inbound: Arc<Mutex<RingQueue>>,
    outbound: Arc<Mutex<RingQueue>>,
}

impl RelayQueues {
    pub fn new(capacity: usize) -> Self {
        Self {
            inbound: Arc::new(Mutex::new(RingQueue::with_capacity(capacity))),
            outbound: Arc::new(Mutex::new(RingQueue::with_capacity(capacity))),
        }
    }

    fn lock(queue: &Arc<Mutex<RingQueue>>) -> MutexGuard<'_, RingQueue> {
        queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    // Relay-board side.

    /// Push one byte toward the packet engine.
    pub fn push_inbound(&self, byte: u8) -> Result<()> {
        Self::lock(&self.inbound).push(byte)
    }

    /// Whether the packet engine has queued output for the ring.
    pub fn outbound_pending(&self) -> bool {
        !Self::lock(&self.outbound).is_empty()
    }

    /// Take the next byte of engine output, if any.
    pub fn pop_outbound(&self) -> Option<u8> {
        Self::lock(&self.outbound).pop()
    }

    // Packet-engine side.

    /// Drain queued inbound bytes into `buf`, returning the count.
    pub fn read_inbound(&self, buf: &mut [u8]) -> usize {
        let mut queue = Self::lock(&self.inbound);
        let mut n = 0;
        while n < buf.len() {
            match queue.pop() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    /// Queue engine output for the ring.
    ///
    /// # Errors
    /// `Error::QueueOverflow` when the outbound queue cannot take the
    /// whole buffer. Bytes already queued stay queued.
    pub fn write_outbound(&self, bytes: &[u8]) -> Result<()> {
        let mut queue = Self::lock(&self.outbound);
        for &byte in bytes {
            queue.push(byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_to_full_capacity() {
        let mut queue = RingQueue::with_capacity(4);

        // One below capacity.
        for i in 0..3 {
            queue.push(i).unwrap();
        }
        assert!(!queue.is_full());
        assert_eq!(queue.len(), 3);

        // The last slot is usable too.
        queue.push(3).unwrap();
        assert!(queue.is_full());
        assert_eq!(queue.len(), 4);

        assert!(matches!(
            queue.push(4),
            Err(Error::QueueOverflow { capacity: 4 })
        ));
    }

    #[test]
    fn pops_in_fifo_order_across_wraparound() {
        let mut queue = RingQueue::with_capacity(3);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        assert_eq!(queue.pop(), Some(1));

        queue.push(3).unwrap();
        queue.push(4).unwrap();
        assert!(queue.is_full());

        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), Some(4));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn drained_queue_accepts_again() {
        let mut queue = RingQueue::with_capacity(2);
        for round in 0..5 {
            queue.push(round).unwrap();
            queue.push(round + 100).unwrap();
            assert_eq!(queue.pop(), Some(round));
            assert_eq!(queue.pop(), Some(round + 100));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn relay_queues_roles() {
        let queues = RelayQueues::new(8);

        queues.push_inbound(0x42).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(queues.read_inbound(&mut buf), 1);
        assert_eq!(buf[0], 0x42);
        assert_eq!(queues.read_inbound(&mut buf), 0);

        assert!(!queues.outbound_pending());
        queues.write_outbound(&[0xAA, 0xBB]).unwrap();
        assert!(queues.outbound_pending());
        assert_eq!(queues.pop_outbound(), Some(0xAA));
        assert_eq!(queues.pop_outbound(), Some(0xBB));
        assert_eq!(queues.pop_outbound(), None);
    }
}
