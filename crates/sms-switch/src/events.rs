//! Unified event stream for the switch
//!
//! Every peer lifecycle change, frame and storage outcome is published as a
//! [`SwitchEvent`]. Observers that want to watch traffic subscribe through
//! [`SwitchHandle::subscribe_events`](crate::SwitchHandle::subscribe_events).

use sms_protocol::Protocol;

use crate::peers::PeerHandle;
use crate::storage::StorageClass;

/// Notification that an inbound message was filed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewMessageIndication {
    /// Storage class the message was filed in
    pub class: StorageClass,
    /// Slot index within the class
    pub index: usize,
    /// Protocol of the stored PDU
    pub protocol: Protocol,
}

/// Notification that message storage is exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageFullIndication {
    /// Exhausted storage class, if known
    pub class: Option<StorageClass>,
}

/// Unified event enum for all switch activity
#[derive(Debug, Clone)]
pub enum SwitchEvent {
    // -------------------------------------------------------------------------
    // Peer lifecycle events
    // -------------------------------------------------------------------------
    /// A peer has connected
    PeerConnected {
        /// Handle for this peer
        handle: PeerHandle,
        /// Remote address or other label
        label: String,
    },

    /// A connection was refused because the peer table is full
    PeerRejected {
        /// Remote address or other label
        label: String,
    },

    /// A peer has disconnected
    PeerDisconnected {
        /// Handle of the disconnected peer
        handle: PeerHandle,
    },

    // -------------------------------------------------------------------------
    // Traffic events
    // -------------------------------------------------------------------------
    /// A complete frame was read from a peer
    FrameReceived {
        /// Source peer
        handle: PeerHandle,
        /// Origin address in the frame header
        origin: String,
        /// Destination address in the frame header
        destination: String,
        /// Protocol of the payload
        protocol: Protocol,
        /// Payload length in bytes
        len: usize,
    },

    /// A frame was broadcast to peers
    FrameSent {
        /// Peers the frame was queued for
        peers: usize,
        /// Frame length in bytes
        len: usize,
    },

    // -------------------------------------------------------------------------
    // Storage events
    // -------------------------------------------------------------------------
    /// An inbound message was stored
    MessageStored(NewMessageIndication),

    /// An inbound message was dropped without being stored
    InboundDropped {
        /// Why it was dropped
        reason: String,
    },

    /// Storage is full
    StorageFull(StorageFullIndication),

    // -------------------------------------------------------------------------
    // Errors
    // -------------------------------------------------------------------------
    /// A peer sent a malformed frame and was disconnected
    ProtocolViolation {
        /// Offending peer
        handle: PeerHandle,
        /// Description of the violation
        message: String,
    },

    /// An error occurred
    Error {
        /// Source of the error
        source: String,
        /// Error message
        message: String,
    },
}

impl SwitchEvent {
    /// Whether this is a traffic event
    pub fn is_traffic(&self) -> bool {
        matches!(
            self,
            SwitchEvent::FrameReceived { .. } | SwitchEvent::FrameSent { .. }
        )
    }

    /// Peer this event concerns, if any
    pub fn peer_handle(&self) -> Option<PeerHandle> {
        match self {
            SwitchEvent::PeerConnected { handle, .. }
            | SwitchEvent::PeerDisconnected { handle }
            | SwitchEvent::FrameReceived { handle, .. }
            | SwitchEvent::ProtocolViolation { handle, .. } => Some(*handle),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_traffic() {
        let sent = SwitchEvent::FrameSent { peers: 2, len: 50 };
        assert!(sent.is_traffic());

        let stored = SwitchEvent::MessageStored(NewMessageIndication {
            class: StorageClass::Sim,
            index: 0,
            protocol: Protocol::Gsm,
        });
        assert!(!stored.is_traffic());
    }

    #[test]
    fn test_peer_handle() {
        let handle = PeerHandle(7);
        let event = SwitchEvent::ProtocolViolation {
            handle,
            message: "short frame".into(),
        };
        assert_eq!(event.peer_handle(), Some(handle));
        assert_eq!(
            SwitchEvent::PeerRejected { label: "x".into() }.peer_handle(),
            None
        );
    }
}
