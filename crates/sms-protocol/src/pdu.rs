//! Short message PDU model and codec seam
//!
//! The switching engine never interprets PDU bytes itself: it goes through a
//! [`PduCodec`] so that the bit-level encoding can be swapped out. The
//! [`SimPduCodec`] shipped here uses a compact length-prefixed layout that is
//! good enough for simulators talking to each other:
//!
//! ```text
//! [type] [coding] [flags] [addr_len] [addr ...] [data_len] [data ...]
//! ```

use tracing::trace;

use crate::error::PduError;
use crate::Protocol;

/// Longest address a PDU can carry
pub const MAX_ADDRESS_LEN: usize = 20;

/// Longest user data a single PDU can carry
pub const MAX_USER_DATA_LEN: usize = 160;

/// Direction/kind of a short message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageType {
    /// Network to device
    Deliver,
    /// Device to network
    Submit,
    /// Delivery report for an earlier submission
    StatusReport,
}

impl MessageType {
    fn to_byte(self) -> u8 {
        match self {
            MessageType::Deliver => 0x00,
            MessageType::Submit => 0x01,
            MessageType::StatusReport => 0x02,
        }
    }

    fn from_byte(b: u8) -> Result<Self, PduError> {
        match b {
            0x00 => Ok(MessageType::Deliver),
            0x01 => Ok(MessageType::Submit),
            0x02 => Ok(MessageType::StatusReport),
            other => Err(PduError::UnknownMessageType(other)),
        }
    }
}

/// Character set of the user data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataCoding {
    /// GSM 7-bit default alphabet (text)
    #[default]
    Gsm7,
    /// 8-bit binary data
    EightBit,
    /// UCS-2 text
    Ucs2,
}

impl DataCoding {
    /// Data coding scheme octet
    pub fn dcs(self) -> u8 {
        match self {
            DataCoding::Gsm7 => 0x00,
            DataCoding::EightBit => 0x04,
            DataCoding::Ucs2 => 0x08,
        }
    }

    /// Resolve a data coding scheme octet
    pub fn from_dcs(dcs: u8) -> Result<Self, PduError> {
        match dcs {
            0x00 => Ok(DataCoding::Gsm7),
            0x04 => Ok(DataCoding::EightBit),
            0x08 => Ok(DataCoding::Ucs2),
            other => Err(PduError::UnknownCoding(other)),
        }
    }
}

/// A decoded short message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsPdu {
    /// Message kind
    pub message_type: MessageType,
    /// Destination for a submit, originator for a deliver
    pub address: String,
    /// Character set of `data`
    pub coding: DataCoding,
    /// Whether a status report was requested
    pub status_report_requested: bool,
    /// User data
    pub data: Vec<u8>,
}

impl SmsPdu {
    /// A submission addressed to `destination`
    pub fn submit(destination: impl Into<String>, coding: DataCoding, data: Vec<u8>) -> Self {
        Self {
            message_type: MessageType::Submit,
            address: destination.into(),
            coding,
            status_report_requested: false,
            data,
        }
    }

    /// A text submission addressed to `destination`
    pub fn submit_text(destination: impl Into<String>, text: &str) -> Self {
        Self::submit(destination, DataCoding::Gsm7, text.as_bytes().to_vec())
    }

    /// A delivery from `originator`
    pub fn deliver(originator: impl Into<String>, coding: DataCoding, data: Vec<u8>) -> Self {
        Self {
            message_type: MessageType::Deliver,
            address: originator.into(),
            coding,
            status_report_requested: false,
            data,
        }
    }

    /// User data as text, if the coding is textual
    pub fn text(&self) -> Option<String> {
        match self.coding {
            DataCoding::Gsm7 => Some(String::from_utf8_lossy(&self.data).into_owned()),
            DataCoding::Ucs2 => {
                let units: Vec<u16> = self
                    .data
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                Some(String::from_utf16_lossy(&units))
            }
            DataCoding::EightBit => None,
        }
    }
}

/// Encodes and decodes short message PDUs
///
/// The switching engine consults this for loopback detection and for building
/// the delivery PDU it stores when a device messages itself.
pub trait PduCodec: Send {
    /// Encode a message for the given protocol
    fn encode(&self, protocol: Protocol, pdu: &SmsPdu) -> Result<Vec<u8>, PduError>;

    /// Decode a message received for the given protocol
    fn decode(&self, protocol: Protocol, data: &[u8]) -> Result<SmsPdu, PduError>;
}

/// Length-prefixed PDU layout used between simulators
#[derive(Debug, Clone, Copy, Default)]
pub struct SimPduCodec;

impl SimPduCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self
    }
}

const FLAG_STATUS_REPORT: u8 = 0x01;

impl PduCodec for SimPduCodec {
    fn encode(&self, protocol: Protocol, pdu: &SmsPdu) -> Result<Vec<u8>, PduError> {
        if pdu.address.len() > MAX_ADDRESS_LEN || !pdu.address.is_ascii() {
            return Err(PduError::InvalidAddress(pdu.address.clone()));
        }
        if pdu.data.len() > MAX_USER_DATA_LEN {
            return Err(PduError::DataTooLong {
                len: pdu.data.len(),
                max: MAX_USER_DATA_LEN,
            });
        }

        let flags = if pdu.status_report_requested {
            FLAG_STATUS_REPORT
        } else {
            0
        };

        let mut out = Vec::with_capacity(5 + pdu.address.len() + pdu.data.len());
        out.push(pdu.message_type.to_byte());
        out.push(pdu.coding.dcs());
        out.push(flags);
        out.push(pdu.address.len() as u8);
        out.extend_from_slice(pdu.address.as_bytes());
        out.push(pdu.data.len() as u8);
        out.extend_from_slice(&pdu.data);

        trace!("Encoded {} PDU: {:02X?}", protocol.name(), out);
        Ok(out)
    }

    fn decode(&self, protocol: Protocol, data: &[u8]) -> Result<SmsPdu, PduError> {
        trace!("Decoding {} PDU: {:02X?}", protocol.name(), data);

        let mut reader = Reader { data, pos: 0 };
        let message_type = MessageType::from_byte(reader.byte()?)?;
        let coding = DataCoding::from_dcs(reader.byte()?)?;
        let flags = reader.byte()?;

        let addr_len = reader.byte()? as usize;
        if addr_len > MAX_ADDRESS_LEN {
            return Err(PduError::InvalidAddress(format!("{} byte address", addr_len)));
        }
        let address = reader.take(addr_len)?;
        if !address.is_ascii() {
            return Err(PduError::InvalidAddress(
                String::from_utf8_lossy(address).into_owned(),
            ));
        }
        let address = String::from_utf8_lossy(address).into_owned();

        let data_len = reader.byte()? as usize;
        if data_len > MAX_USER_DATA_LEN {
            return Err(PduError::DataTooLong {
                len: data_len,
                max: MAX_USER_DATA_LEN,
            });
        }
        let user_data = reader.take(data_len)?.to_vec();

        if reader.remaining() > 0 {
            return Err(PduError::TrailingBytes(reader.remaining()));
        }

        Ok(SmsPdu {
            message_type,
            address,
            coding,
            status_report_requested: flags & FLAG_STATUS_REPORT != 0,
            data: user_data,
        })
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn byte(&mut self) -> Result<u8, PduError> {
        Ok(self.take(1)?[0])
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], PduError> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(PduError::Incomplete {
                needed: end - self.data.len(),
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}
