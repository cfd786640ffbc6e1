//! SMS Simulator Protocol Library
//!
//! This crate provides the wire-level pieces shared by every simulated device
//! that exchanges short messages with its peers:
//!
//! - **Frame**: the fixed-header peer frame (origin, destination, protocol tag,
//!   payload length) followed by the encoded PDU
//! - **PDU codec**: the [`PduCodec`] seam used to encode and decode the message
//!   carried inside a frame, with a compact [`SimPduCodec`] implementation
//! - **Modem**: the narrow [`Modem`] view of the simulated radio that the
//!   switching engine consults (registration, radio technology, own number)
//!
//! # Example
//!
//! ```rust
//! use sms_protocol::{Frame, Protocol};
//!
//! let frame = Frame::new("+15550001", "", Protocol::Gsm, vec![0x01, 0x02]).unwrap();
//! let bytes = frame.encode();
//!
//! let decoded = Frame::decode(&bytes).unwrap();
//! assert_eq!(decoded.origin(), "+15550001");
//! assert_eq!(decoded.payload(), &[0x01, 0x02]);
//! ```

pub mod error;
pub mod frame;
pub mod modem;
pub mod pdu;

pub use error::{FrameError, PduError};
pub use frame::{Frame, FrameHeader, ADDR_MAX, HEADER_SIZE, MAX_FRAME_SIZE, MAX_PAYLOAD_LEN};
pub use modem::{Modem, RadioTechnology, RegistrationState};
pub use pdu::{DataCoding, MessageType, PduCodec, SimPduCodec, SmsPdu};

/// Identifies the messaging protocol family a PDU is encoded for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Protocol {
    /// 3GPP point-to-point SMS
    Gsm,
    /// 3GPP2 (CDMA) point-to-point SMS
    Cdma,
    /// 3GPP (GSM/WCDMA) cell broadcast
    GwCellBroadcast,
}

impl Protocol {
    /// Returns a human-readable name for the protocol
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Gsm => "GSM",
            Protocol::Cdma => "CDMA",
            Protocol::GwCellBroadcast => "GW Cell Broadcast",
        }
    }

    /// Tag written into the frame header
    pub fn tag(&self) -> i32 {
        match self {
            Protocol::Gsm => 1,
            Protocol::Cdma => 2,
            Protocol::GwCellBroadcast => 3,
        }
    }

    /// Resolve a frame header tag
    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            1 => Some(Protocol::Gsm),
            2 => Some(Protocol::Cdma),
            3 => Some(Protocol::GwCellBroadcast),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_tags_resolve() {
        for protocol in [Protocol::Gsm, Protocol::Cdma, Protocol::GwCellBroadcast] {
            assert_eq!(Protocol::from_tag(protocol.tag()), Some(protocol));
        }
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(Protocol::from_tag(0), None);
        assert_eq!(Protocol::from_tag(-1), None);
        assert_eq!(Protocol::from_tag(4), None);
    }
}
