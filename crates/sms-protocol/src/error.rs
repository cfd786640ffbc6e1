//! Error types for frame and PDU handling

use thiserror::Error;

/// Errors that can occur while encoding or decoding a peer frame
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes than a complete header
    #[error("truncated frame: need {needed} more bytes for the header")]
    Truncated { needed: usize },

    /// Read size does not match the length declared in the header
    #[error("frame length mismatch: header declares {expected} bytes, read {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Unknown protocol tag in the header
    #[error("unknown protocol tag: {0}")]
    UnknownProtocol(i32),

    /// Address does not fit in the header field
    #[error("address too long: {len} bytes (max {max})")]
    AddressTooLong { len: usize, max: usize },

    /// Address contains a NUL byte
    #[error("invalid address field")]
    InvalidAddress,

    /// Payload does not fit in a single frame
    #[error("payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },
}

impl FrameError {
    /// Whether this error means the declared size disagreed with the bytes read
    pub fn is_size_violation(&self) -> bool {
        matches!(
            self,
            FrameError::Truncated { .. } | FrameError::LengthMismatch { .. }
        )
    }
}

/// Errors reported by a PDU codec
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PduError {
    /// PDU ended before a complete message was read
    #[error("incomplete PDU: need {needed} more bytes")]
    Incomplete { needed: usize },

    /// Unknown message type indicator
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// Unknown data coding indicator
    #[error("unknown data coding: 0x{0:02X}")]
    UnknownCoding(u8),

    /// Address is not usable in a PDU
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// User data exceeds what the PDU can carry
    #[error("user data too long: {len} bytes (max {max})")]
    DataTooLong { len: usize, max: usize },

    /// Trailing bytes after a complete PDU
    #[error("unexpected trailing bytes: {0}")]
    TrailingBytes(usize),
}
