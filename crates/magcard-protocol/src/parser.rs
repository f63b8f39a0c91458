//! Incremental decoder for the reader wire protocol.
//!
//! The serial line delivers bytes in arbitrary chunks: a read may return a
//! partial frame, several frames, a lone poll byte or nothing at all before
//! the timeout. [`PacketParser`] accumulates whatever arrives and walks a
//! four-phase state machine over it:
//!
//! ```text
//! SeekStart --STX--> Length --> Payload --> Trailer --> Checksum
//!     |                                                    |
//!     |  ENQ  -> Inbound::Poll                             | match -> Inbound::Packet
//!     |  other-> Inbound::Stray                            | differ -> checksum error
//!     ^----------------------------------------------------'
//! ```
//!
//! A lone `ENQ` in the start phase is the board polling for the previous
//! command's result. Any other unframed byte is a transport-level
//! synchronisation signal and is surfaced as [`Inbound::Stray`] rather than
//! treated as an error. A checksum mismatch discards the attempt and the
//! scanner resumes at the next lead byte; there is no byte-level
//! resynchronisation beyond that.
//!
//! # Usage
//!
//! ```
//! use magcard_protocol::{encode_frame, Inbound, PacketParser};
//!
//! let mut parser = PacketParser::new();
//! parser.feed(&encode_frame(&[0x10, 0, 0, 0]).unwrap());
//!
//! match parser.next_inbound() {
//!     Ok(Some(Inbound::Packet(packet))) => assert_eq!(packet.command_byte(), Some(0x10)),
//!     other => panic!("expected a packet, got {:?}", other),
//! }
//! ```

use bytes::{Buf, BytesMut};
use magcard_core::{
    Error, Result,
    constants::{ENQ, STX},
};

use crate::packet::Packet;

/// Staging buffer cap. Frames top out at 257 bytes; anything beyond this is
/// line garbage and resets the scanner.
const MAX_BUFFER_SIZE: usize = 4 * 1024;

/// Initial staging capacity, sized for a full Write frame.
const INITIAL_BUFFER_CAPACITY: usize = 512;

/// Decoder phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Scanning for STX, ENQ or a stray lead byte.
    SeekStart,

    /// Next byte is the length field (payload count plus 2).
    Length,

    /// Collecting `length - 2` payload bytes.
    Payload,

    /// Next byte sits where ETX belongs; it is folded into the checksum.
    Trailer,

    /// Next byte must equal the running checksum.
    Checksum,
}

/// One decoded item from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A lone ENQ byte: the board wants the status reply.
    Poll,

    /// An unframed, non-ENQ byte passed through for the caller to log.
    Stray(u8),

    /// A complete, checksum-verified packet.
    Packet(Packet),
}

/// Stateful incremental decoder.
///
/// Feed bytes as they arrive with [`feed()`](PacketParser::feed), then drain
/// decoded items with [`next_inbound()`](PacketParser::next_inbound) until it
/// returns `Ok(None)`. Decode state survives across calls, so partial frames
/// split over any number of reads assemble correctly.
#[derive(Debug)]
pub struct PacketParser {
    /// Unconsumed bytes from the transport.
    buf: BytesMut,

    /// Current decode phase.
    phase: Phase,

    /// Payload bytes still to collect in [`Phase::Payload`].
    remaining: usize,

    /// Payload collected so far for the frame in progress.
    payload: Vec<u8>,

    /// Running XOR over length, payload and trailer bytes.
    checksum: u8,
}

impl PacketParser {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            phase: Phase::SeekStart,
            remaining: 0,
            payload: Vec::new(),
            checksum: 0,
        }
    }

    /// Append bytes read from the transport.
    ///
    /// If the staging buffer overruns [`MAX_BUFFER_SIZE`] without producing
    /// a frame, everything is discarded and the scanner restarts. Legitimate
    /// traffic never comes close to the cap.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > MAX_BUFFER_SIZE {
            self.reset();
        }
    }

    /// Decode the next item from buffered bytes.
    ///
    /// Returns `Ok(None)` when more data is needed.
    ///
    /// # Errors
    /// - `Error::ChecksumMismatch` when a frame fails verification. The
    ///   frame is discarded; scanning resumes with the bytes that follow.
    /// - `Error::InvalidFrameLength` for a length byte below 2, which no
    ///   valid frame can carry.
    pub fn next_inbound(&mut self) -> Result<Option<Inbound>> {
        while self.buf.has_remaining() {
            let byte = self.buf.get_u8();

            match self.phase {
                Phase::SeekStart => {
                    if byte == ENQ {
                        return Ok(Some(Inbound::Poll));
                    }
                    if byte == STX {
                        self.phase = Phase::Length;
                    } else {
                        return Ok(Some(Inbound::Stray(byte)));
                    }
                }
                Phase::Length => {
                    if byte < 2 {
                        self.phase = Phase::SeekStart;
                        return Err(Error::InvalidFrameLength { value: byte });
                    }
                    self.checksum = byte;
                    self.remaining = usize::from(byte) - 2;
                    self.payload.clear();
                    self.phase = if self.remaining > 0 {
                        Phase::Payload
                    } else {
                        Phase::Trailer
                    };
                }
                Phase::Payload => {
                    self.payload.push(byte);
                    self.checksum ^= byte;
                    if self.payload.len() == self.remaining {
                        self.phase = Phase::Trailer;
                    }
                }
                Phase::Trailer => {
                    // The byte at the ETX slot is folded into the checksum
                    // without a value check; corruption here fails the
                    // comparison one byte later.
                    self.checksum ^= byte;
                    self.phase = Phase::Checksum;
                }
                Phase::Checksum => {
                    self.phase = Phase::SeekStart;
                    if byte != self.checksum {
                        return Err(Error::ChecksumMismatch {
                            expected: self.checksum,
                            actual: byte,
                        });
                    }
                    let payload = std::mem::take(&mut self.payload);
                    return Ok(Some(Inbound::Packet(Packet::new(payload))));
                }
            }
        }

        Ok(None)
    }

    /// Current decode phase, for diagnostics.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Discard all buffered bytes and frame state.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.payload.clear();
        self.remaining = 0;
        self.checksum = 0;
        self.phase = Phase::SeekStart;
    }
}

impl Default for PacketParser {
    fn default() -> Self {
        Self::new()
    }
}
