//! Frame encoder for the reader wire protocol.
//!
//! A frame wraps a payload as `STX, length, payload..., ETX, checksum`,
//! where `length` is the payload byte count plus 2 and `checksum` is the
//! running XOR of the length byte, every payload byte and the ETX byte.
//! Total size on the wire is `payload + 4` bytes.

use bytes::{BufMut, Bytes, BytesMut};
use magcard_core::{
    Error, Result,
    constants::{ETX, FRAME_OVERHEAD, MAX_PAYLOAD_LEN, STX},
};

/// Encode a payload into a complete wire frame.
///
/// # Errors
/// Returns `Error::PayloadTooLarge` for payloads above 253 bytes, the
/// largest count the length byte can carry.
///
/// # Examples
/// ```
/// use magcard_protocol::encode_frame;
///
/// let frame = encode_frame(&[0x10, 0x00]).unwrap();
/// assert_eq!(&frame[..], &[0x02, 0x04, 0x10, 0x00, 0x03, 0x04 ^ 0x10 ^ 0x03]);
/// ```
pub fn encode_frame(payload: &[u8]) -> Result<Bytes> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(Error::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let length = (payload.len() + 2) as u8;

    let mut buf = BytesMut::with_capacity(payload.len() + FRAME_OVERHEAD);
    buf.put_u8(STX);
    buf.put_u8(length);

    let mut checksum = length;
    for &byte in payload {
        buf.put_u8(byte);
        checksum ^= byte;
    }

    buf.put_u8(ETX);
    checksum ^= ETX;
    buf.put_u8(checksum);

    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout() {
        let frame = encode_frame(&[0xAB]).unwrap();
        assert_eq!(frame.len(), 5);
        assert_eq!(frame[0], STX);
        assert_eq!(frame[1], 3); // payload + 2
        assert_eq!(frame[2], 0xAB);
        assert_eq!(frame[3], ETX);
        assert_eq!(frame[4], 3 ^ 0xAB ^ ETX);
    }

    #[test]
    fn empty_payload_frames() {
        let frame = encode_frame(&[]).unwrap();
        assert_eq!(&frame[..], &[STX, 2, ETX, 2 ^ ETX]);
    }

    #[test]
    fn largest_payload_frames() {
        let payload = vec![0x55u8; MAX_PAYLOAD_LEN];
        let frame = encode_frame(&payload).unwrap();
        assert_eq!(frame.len(), MAX_PAYLOAD_LEN + FRAME_OVERHEAD);
        assert_eq!(frame[1], 0xFF);
    }

    #[test]
    fn oversized_payload_rejected() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        assert!(matches!(
            encode_frame(&payload),
            Err(Error::PayloadTooLarge { .. })
        ));
    }
}
