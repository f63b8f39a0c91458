//! Scripted byte port for tests.

use std::collections::VecDeque;

use magcard_core::Result;

use crate::BytePort;

/// A [`BytePort`] fed from scripted chunks.
///
/// Each read delivers bytes from a single scripted chunk, so the chunk
/// boundaries a test sets up become the partial reads the code under test
/// sees. Once the script is exhausted every read times out (`Ok(0)`).
/// Everything written is captured for assertions.
#[derive(Debug, Default)]
pub struct MockPort {
    incoming: VecDeque<Vec<u8>>,
    written: Vec<u8>,
}

impl MockPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one chunk for a future read.
    pub fn push(&mut self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.incoming.push_back(bytes.to_vec());
        }
    }

    /// Everything the code under test has written so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Take the captured output, clearing it.
    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.written)
    }

    /// Bytes still queued for reading.
    pub fn pending(&self) -> usize {
        self.incoming.iter().map(Vec::len).sum()
    }
}

impl BytePort for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(chunk) = self.incoming.front_mut() else {
            return Ok(0);
        };

        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n == chunk.len() {
            self.incoming.pop_front();
        } else {
            chunk.drain(..n);
        }
        Ok(n)
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.written.extend_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_drain_then_time_out() {
        let mut port = MockPort::new();
        port.push(&[1, 2, 3]);

        let mut buf = [0u8; 2];
        assert_eq!(port.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(port.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 3);
        assert_eq!(port.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn writes_are_captured() {
        let mut port = MockPort::new();
        port.write_all(&[0xAA]).unwrap();
        port.write_all(&[0xBB, 0xCC]).unwrap();
        assert_eq!(port.written(), &[0xAA, 0xBB, 0xCC]);
        assert_eq!(port.take_written(), vec![0xAA, 0xBB, 0xCC]);
        assert!(port.written().is_empty());
    }
}
