use thiserror::Error;

/// Failures on the S21 link.
///
/// Apart from `InvalidInput` and `CommandBusy` (returned to the caller before
/// anything is written) none of these are fatal: the current query or command
/// is abandoned and the next poll cycle retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum S21Error {
    #[error("timeout waiting for ACK")]
    AckTimeout,

    #[error("timeout while reading frame")]
    FrameTimeout,

    #[error("NAK from unit")]
    Nak,

    #[error("unexpected byte {0:#04x}")]
    UnexpectedByte(u8),

    #[error("checksum mismatch (frame: {actual:#04x}, calculated: {expected:#04x})")]
    ChecksumMismatch {
        expected: u8,
        actual: u8
    },

    #[error("unknown response {0}")]
    UnknownHeader(String),

    #[error("malformed response {0}")]
    MalformedPayload(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("a command is already in progress")]
    CommandBusy,
}

pub type Result<T> = std::result::Result<T, S21Error>;
