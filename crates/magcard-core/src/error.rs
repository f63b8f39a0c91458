use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Framing errors
    #[error("payload of {len} bytes exceeds the {max}-byte frame limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("frame length byte {value:#04x} is below the 2-byte minimum")]
    InvalidFrameLength { value: u8 },

    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    // Protocol errors
    #[error("unknown command byte {code:#04x}")]
    UnknownCommand { code: u8 },

    #[error("unknown track selector {code:#04x}")]
    InvalidTrackSelector { code: u8 },

    #[error("write data too short: need {expected} bytes, got {actual}")]
    WriteDataTooShort { expected: usize, actual: usize },

    // Card image errors
    #[error("card image must be {expected} bytes, got {actual}")]
    InvalidCardImage { expected: usize, actual: usize },

    // Ring-bus errors
    #[error("ring queue full ({capacity} bytes)")]
    QueueOverflow { capacity: usize },

    #[error("unexpected ring-bus lead byte {code:#04x}")]
    RelayDesync { code: u8 },

    // Transport errors
    #[error("transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
