//! Peer frame encoding and decoding
//!
//! Frames are exchanged between simulator instances over a TCP stream. Each
//! frame is a fixed 44-byte header followed by exactly `payload_len` bytes:
//!
//! ```text
//! +------------------+------------------+-----------+-------------+---------+
//! | origin [18]      | destination [18] | tag (i32) | len (u32)   | payload |
//! | NUL padded       | NUL padded       | LE        | LE          | len     |
//! +------------------+------------------+-----------+-------------+---------+
//! ```
//!
//! A single read from a peer must yield exactly one complete frame, so
//! [`Frame::decode`] rejects any buffer whose size differs from the size the
//! header declares instead of buffering or truncating.

use std::borrow::Cow;

use tracing::debug;

use crate::error::FrameError;
use crate::Protocol;

/// Size of each NUL-padded address field
pub const ADDR_MAX: usize = 18;

/// Size of the fixed frame header
pub const HEADER_SIZE: usize = ADDR_MAX * 2 + 4 + 4;

/// Largest frame a peer may send in one read
pub const MAX_FRAME_SIZE: usize = 1024;

/// Largest payload accepted in a single frame
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_SIZE - HEADER_SIZE - 1;

/// Decoded frame header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Sender's subscriber number
    pub origin: String,
    /// Destination number (empty for broadcast submissions)
    pub destination: String,
    /// Messaging protocol of the payload
    pub protocol: Protocol,
    /// Declared payload length in bytes
    pub payload_len: u32,
}

impl FrameHeader {
    /// Parse a header from the start of `data`
    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < HEADER_SIZE {
            return Err(FrameError::Truncated {
                needed: HEADER_SIZE - data.len(),
            });
        }

        let origin = read_address(&data[..ADDR_MAX]);
        let destination = read_address(&data[ADDR_MAX..ADDR_MAX * 2]);

        let tag_offset = ADDR_MAX * 2;
        let tag = i32::from_le_bytes([
            data[tag_offset],
            data[tag_offset + 1],
            data[tag_offset + 2],
            data[tag_offset + 3],
        ]);
        let len_offset = tag_offset + 4;
        let payload_len = u32::from_le_bytes([
            data[len_offset],
            data[len_offset + 1],
            data[len_offset + 2],
            data[len_offset + 3],
        ]);

        let protocol = Protocol::from_tag(tag).ok_or(FrameError::UnknownProtocol(tag))?;

        Ok(Self {
            origin,
            destination,
            protocol,
            payload_len,
        })
    }

    /// Total frame size this header declares
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_len as usize
    }
}

/// A complete peer frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    origin: String,
    destination: String,
    protocol: Protocol,
    payload: Vec<u8>,
}

impl Frame {
    /// Build a frame, validating that every field fits the wire layout
    pub fn new(
        origin: impl Into<String>,
        destination: impl Into<String>,
        protocol: Protocol,
        payload: Vec<u8>,
    ) -> Result<Self, FrameError> {
        let origin = origin.into();
        let destination = destination.into();
        check_address(&origin)?;
        check_address(&destination)?;
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }

        Ok(Self {
            origin,
            destination,
            protocol,
            payload,
        })
    }

    /// Decode exactly one frame from the bytes of a single read
    ///
    /// The buffer must be exactly `HEADER_SIZE + payload_len` bytes long.
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        let header = FrameHeader::parse(data)?;

        let expected = header.frame_len();
        if expected != data.len() {
            return Err(FrameError::LengthMismatch {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            origin: header.origin,
            destination: header.destination,
            protocol: header.protocol,
            payload: data[HEADER_SIZE..].to_vec(),
        })
    }

    /// Encode this frame to its wire format
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        write_address(&mut out, &self.origin);
        write_address(&mut out, &self.destination);
        out.extend_from_slice(&self.protocol.tag().to_le_bytes());
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Size of the encoded frame
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Sender's subscriber number
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Destination number
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Messaging protocol of the payload
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Encoded PDU carried by this frame
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume the frame, returning its payload
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// Check that an address fits a header field with its NUL terminator
fn check_address(addr: &str) -> Result<(), FrameError> {
    // The field is NUL padded, so the last byte stays reserved
    if addr.len() >= ADDR_MAX {
        return Err(FrameError::AddressTooLong {
            len: addr.len(),
            max: ADDR_MAX - 1,
        });
    }
    if addr.bytes().any(|b| b == 0) {
        return Err(FrameError::InvalidAddress);
    }
    Ok(())
}

fn write_address(out: &mut Vec<u8>, addr: &str) {
    let mut field = [0u8; ADDR_MAX];
    field[..addr.len()].copy_from_slice(addr.as_bytes());
    out.extend_from_slice(&field);
}

/// Undecodable bytes become `?`, so the result never outgrows the field
fn read_address(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    match String::from_utf8_lossy(&field[..end]) {
        Cow::Borrowed(addr) => addr.to_string(),
        Cow::Owned(addr) => {
            debug!("Address field is not UTF-8: {:02X?}", &field[..end]);
            addr.replace(char::REPLACEMENT_CHARACTER, "?")
        }
    }
}
