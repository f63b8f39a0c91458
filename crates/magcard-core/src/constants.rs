//! Wire-level constants for the magnetic-card reader protocol.
//!
//! The arcade board talks to the reader unit over a framed byte protocol:
//!
//! ```text
//! <STX> <length> <payload bytes...> <ETX> <checksum>
//! ```
//!
//! Where:
//! - `<STX>` - start of text marker (0x02)
//! - `<length>` - payload byte count plus 2
//! - `<ETX>` - end of text marker (0x03)
//! - `<checksum>` - running XOR of the length byte, every payload byte and ETX
//!
//! Outside of framed packets the board sends two bare bytes: `ENQ` to poll
//! the result of the previous command, and receives `ACK` after every
//! dispatched command. All values here are fixed by the reader firmware and
//! must not change.

// ============================================================================
// Frame symbols
// ============================================================================

/// Start of text marker opening every framed packet.
pub const STX: u8 = 0x02;

/// End of text marker, folded into the checksum before the checksum byte.
pub const ETX: u8 = 0x03;

/// Standalone poll byte. Never framed; a lone ENQ asks the reader to send
/// the status reply for the previously dispatched command.
pub const ENQ: u8 = 0x05;

/// Single-byte acknowledgement sent after every dispatched command.
pub const ACK: u8 = 0x06;

// ============================================================================
// Frame geometry
// ============================================================================

/// Bytes a frame adds around its payload (STX, length, ETX, checksum).
pub const FRAME_OVERHEAD: usize = 4;

/// Largest payload a frame can carry.
///
/// The length byte holds `payload + 2`, so the payload is capped at 253.
pub const MAX_PAYLOAD_LEN: usize = 253;

/// Offset of the first parameter byte inside a command payload.
///
/// Payload byte 0 is the command; bytes 1 through 3 are reserved header
/// bytes the board always sends before the parameters.
pub const PARAM_OFFSET: usize = 4;

/// Offset of the data block inside a Write payload (after three parameters).
pub const DATA_OFFSET: usize = 7;

// ============================================================================
// Track geometry
// ============================================================================

/// Bytes per magnetic track.
pub const TRACK_LEN: usize = 69;

/// Tracks on a card.
pub const TRACK_COUNT: usize = 3;

/// Size of a persisted card image (all three tracks, flat).
pub const CARD_IMAGE_LEN: usize = TRACK_LEN * TRACK_COUNT;

// ============================================================================
// Ring-bus relay micro-protocol
// ============================================================================

/// Lead byte carrying one data byte toward the reader. The relay echoes
/// both bytes back as the acknowledgement.
pub const RELAY_DATA: u8 = 0x01;

/// Lead byte asking whether the reader has output pending (non-destructive).
pub const RELAY_POLL_STATUS: u8 = 0x80;

/// Lead byte fetching one byte of reader output (destructive).
pub const RELAY_POLL_DATA: u8 = 0x81;

/// Flag returned after [`RELAY_POLL_STATUS`] when output is pending.
pub const RELAY_PENDING: u8 = 0x40;

// ============================================================================
// Control plane
// ============================================================================

/// Control opcode: query whether a card is inserted.
pub const CONTROL_GET_STATUS: u8 = 1;

/// Control opcode: insert a card backed by a file path.
pub const CONTROL_INSERT_CARD: u8 = 2;

/// Control opcode: eject the current card.
pub const CONTROL_EJECT_CARD: u8 = 3;

/// Control result byte for success.
pub const CONTROL_OK: u8 = 0;

/// Control result byte for failure.
pub const CONTROL_FAILURE: u8 = 255;

/// Status body byte: a card is inserted.
pub const CONTROL_CARD_INSERTED: u8 = 1;

/// Status body byte: no card is inserted.
pub const CONTROL_CARD_EJECTED: u8 = 0;

/// Default TCP port for the control plane.
pub const DEFAULT_CONTROL_PORT: u16 = 2000;
