//! Message switching engine
//!
//! [`SmsSimulator`] is the context object holding every piece of mutable
//! switch state: message storage, the cell broadcast registry, the peer table
//! and the collaborators it consults. It is synchronous and does no I/O of its
//! own; the actor in [`crate::actor`] owns one instance and feeds it commands
//! from peer connection tasks and API clients one at a time.
//!
//! Events produced while handling a call are buffered and collected with
//! [`SmsSimulator::drain_events`].

use sms_protocol::{
    Frame, MessageType, Modem, PduCodec, Protocol, RadioTechnology, SmsPdu, ADDR_MAX,
    MAX_PAYLOAD_LEN,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cell_broadcast::{BroadcastRange, BroadcastService, CellBroadcastRegistry};
use crate::config::SwitchConfig;
use crate::error::SwitchError;
use crate::events::{NewMessageIndication, StorageFullIndication, SwitchEvent};
use crate::peers::{PeerHandle, PeerTable};
use crate::storage::{MessageLease, MessageStatus, MessageStorage, StorageClass, StoredMessage};

/// Handler invoked when an inbound message is stored
pub type NewMessageHandler = Box<dyn FnMut(&NewMessageIndication) + Send>;

/// Handler invoked when storage fills up
pub type StorageFullHandler = Box<dyn FnMut(&StorageFullIndication) + Send>;

/// What happened to the local copy of a sent message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loopback {
    /// The message was addressed to someone else
    NotAddressedToSelf,
    /// The message was addressed to this device and stored
    Stored(NewMessageIndication),
    /// The message was addressed to this device but the device went offline
    Dropped,
    /// The message was addressed to this device but storage was full
    StorageFull(StorageClass),
    /// The sent PDU could not be examined
    Skipped(String),
}

/// Outcome of a send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// Message reference (TP-MR) assigned to this send
    pub message_ref: u8,
    /// Peers the frame was queued for
    pub peers_reached: usize,
    /// Peers whose send failed
    pub peers_failed: usize,
    /// Local delivery outcome
    pub loopback: Loopback,
    /// Injected network error cause, if one was configured
    pub send_error_cause: Option<u16>,
}

impl SendReport {
    /// Overall result of the send
    ///
    /// An injected network error wins over a loopback that ran out of
    /// storage. Peer failures never fail a send.
    pub fn result(&self) -> Result<u8, SwitchError> {
        if let Some(cause) = self.send_error_cause {
            return Err(SwitchError::SendRejected { cause });
        }
        if let Loopback::StorageFull(class) = self.loopback {
            return Err(SwitchError::NoMemory { class });
        }
        Ok(self.message_ref)
    }
}

/// Result of handling one read from a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The peer closed its end and was removed
    PeerClosed,
    /// The frame was stored
    Stored(NewMessageIndication),
    /// The frame was dropped because the device is offline
    Dropped,
}

/// Storage class inbound messages land in for a radio technology
pub fn incoming_storage(technology: RadioTechnology) -> StorageClass {
    match technology {
        RadioTechnology::Cdma => StorageClass::Nv,
        _ => StorageClass::Sim,
    }
}

/// The message switching engine
pub struct SmsSimulator {
    config: SwitchConfig,
    storage: MessageStorage,
    cell_broadcast: CellBroadcastRegistry,
    peers: PeerTable,
    modem: Box<dyn Modem>,
    codec: Box<dyn PduCodec>,
    preferred_storage: StorageClass,
    smsc: String,
    next_message_ref: u8,
    send_error_cause: Option<u16>,
    new_message_handler: Option<NewMessageHandler>,
    storage_full_handler: Option<StorageFullHandler>,
    event_buffer: Vec<SwitchEvent>,
}

impl SmsSimulator {
    /// Create an engine with empty storage and no peers
    ///
    /// A configured SMSC that does not fit an address field is ignored.
    pub fn new(
        config: SwitchConfig,
        modem: impl Modem + 'static,
        codec: impl PduCodec + 'static,
    ) -> Self {
        let smsc = config.smsc.clone();
        let mut simulator = Self {
            storage: MessageStorage::new(config.slots_per_class),
            cell_broadcast: CellBroadcastRegistry::new(config.cell_broadcast_capacity),
            peers: PeerTable::new(config.max_connections),
            modem: Box::new(modem),
            codec: Box::new(codec),
            preferred_storage: StorageClass::default(),
            smsc: String::new(),
            next_message_ref: 0,
            send_error_cause: None,
            new_message_handler: None,
            storage_full_handler: None,
            event_buffer: Vec::new(),
            config,
        };

        if let Err(e) = simulator.set_smsc(smsc) {
            warn!("Ignoring configured SMSC: {}", e);
        }
        simulator
    }

    /// Get the configuration
    pub fn config(&self) -> &SwitchConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Outbound path
    // -------------------------------------------------------------------------

    /// Send a PDU to every connected peer, delivering it locally when it is
    /// addressed to this device
    ///
    /// Fails with [`SwitchError::NotPossible`] when the device is offline or
    /// has no subscriber number, and with [`SwitchError::OutOfRange`] when the
    /// payload does not fit a frame. Neither consumes a message reference.
    pub fn send(&mut self, protocol: Protocol, payload: Vec<u8>) -> Result<SendReport, SwitchError> {
        if !self.modem.is_registered() {
            warn!("Not sending message because we're offline");
            return Err(SwitchError::NotPossible("device is not registered".into()));
        }

        let local = self
            .modem
            .local_address()
            .filter(|addr| !addr.is_empty())
            .ok_or_else(|| SwitchError::NotPossible("subscriber number unavailable".into()))?;

        info!(
            "Sending PDU message (length={} protocol={})",
            payload.len(),
            protocol.name()
        );

        if payload.len() > MAX_PAYLOAD_LEN {
            warn!("PDU message is too big ({} bytes)", payload.len());
            return Err(SwitchError::OutOfRange {
                len: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }

        let frame = Frame::new(local.as_str(), "", protocol, payload).map_err(|e| {
            SwitchError::NotPossible(format!("invalid subscriber number {:?}: {}", local, e))
        })?;

        let bytes = frame.encode();
        let report = self.peers.broadcast(&bytes);
        self.event_buffer.push(SwitchEvent::FrameSent {
            peers: report.delivered.len(),
            len: bytes.len(),
        });

        let loopback = self.loopback(&local, &frame);

        let message_ref = self.next_message_ref;
        self.next_message_ref = self.next_message_ref.wrapping_add(1);

        if let Some(cause) = self.send_error_cause {
            info!("Send error cause {} injected for message {}", cause, message_ref);
        }

        Ok(SendReport {
            message_ref,
            peers_reached: report.delivered.len(),
            peers_failed: report.failed.len(),
            loopback,
            send_error_cause: self.send_error_cause,
        })
    }

    /// Deliver a sent frame to this device if it is addressed to it
    fn loopback(&mut self, local: &str, sent: &Frame) -> Loopback {
        let protocol = sent.protocol();
        let submit = match self.codec.decode(protocol, sent.payload()) {
            Ok(pdu) => pdu,
            Err(e) => {
                warn!("Unable to decode sent message: {}", e);
                return Loopback::Skipped(e.to_string());
            }
        };

        if submit.message_type != MessageType::Submit {
            warn!("Unexpected type of PDU message: {:?}", submit.message_type);
            return Loopback::Skipped(format!("unexpected {:?} PDU", submit.message_type));
        }

        if submit.address != local {
            debug!("Message not sent to self (={})", local);
            return Loopback::NotAddressedToSelf;
        }

        debug!(
            "Sending message to self: len[{}] da[{}] coding[{:?}] protocol[{}]",
            submit.data.len(),
            submit.address,
            submit.coding,
            protocol.name()
        );

        let deliver = SmsPdu::deliver(local, submit.coding, submit.data);
        let encoded = match self.codec.encode(protocol, &deliver) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Unable to encode message to self: {}", e);
                return Loopback::Skipped(e.to_string());
            }
        };

        let frame = match Frame::new(local, local, protocol, encoded) {
            Ok(frame) => frame,
            Err(e) => return Loopback::Skipped(e.to_string()),
        };

        match self.deliver(&frame) {
            Ok(Some(indication)) => Loopback::Stored(indication),
            Ok(None) => Loopback::Dropped,
            Err(SwitchError::NoMemory { class }) => Loopback::StorageFull(class),
            Err(e) => Loopback::Skipped(e.to_string()),
        }
    }

    // -------------------------------------------------------------------------
    // Inbound path
    // -------------------------------------------------------------------------

    /// File an inbound frame into storage
    ///
    /// Returns `Ok(None)` when the device is offline; the frame is dropped
    /// without a notification. A full storage class fails with
    /// [`SwitchError::NoMemory`] and raises the storage-full notification.
    pub fn deliver(&mut self, frame: &Frame) -> Result<Option<NewMessageIndication>, SwitchError> {
        if !self.modem.is_registered() {
            warn!("Not handling message because we're offline");
            self.event_buffer.push(SwitchEvent::InboundDropped {
                reason: "device is not registered".into(),
            });
            return Ok(None);
        }

        let class = incoming_storage(self.modem.radio_technology());
        let protocol = frame.protocol();

        let index = match self.storage.store(
            class,
            protocol,
            frame.payload().to_vec(),
            MessageStatus::Unread,
        ) {
            Ok(index) => index,
            Err(SwitchError::NoMemory { class }) => {
                warn!("No more spot available in {} storage to store this message", class);
                self.notify_storage_full(Some(class));
                return Err(SwitchError::NoMemory { class });
            }
            Err(e) => return Err(e),
        };

        let indication = NewMessageIndication {
            class,
            index,
            protocol,
        };
        info!(
            "Stored {} message from {} at {}[{}]",
            protocol.name(),
            frame.origin(),
            class,
            index
        );

        self.event_buffer.push(SwitchEvent::MessageStored(indication));
        if let Some(handler) = self.new_message_handler.as_mut() {
            handler(&indication);
        }

        Ok(Some(indication))
    }

    /// Handle the bytes of one read from a peer
    ///
    /// An empty read means the peer closed. A read that is not exactly one
    /// frame is a protocol violation: the offending peer is closed, every
    /// other peer is left alone, and the error is returned.
    pub fn on_peer_readable(
        &mut self,
        handle: PeerHandle,
        data: &[u8],
    ) -> Result<ReadOutcome, SwitchError> {
        if !self.peers.contains(handle) {
            return Err(SwitchError::NotFound);
        }

        if data.is_empty() {
            info!("Client has disconnected (handle {})", handle.0);
            self.close_peer(handle);
            return Ok(ReadOutcome::PeerClosed);
        }

        let frame = match Frame::decode(data) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    "Problem on reception from peer {} (size={}): {}",
                    handle.0,
                    data.len(),
                    e
                );
                self.event_buffer.push(SwitchEvent::ProtocolViolation {
                    handle,
                    message: e.to_string(),
                });
                self.close_peer(handle);
                return Err(SwitchError::ProtocolViolation(e));
            }
        };

        info!(
            "Received message from '{}', to '{}' (len={})",
            frame.origin(),
            frame.destination(),
            frame.payload().len()
        );
        self.event_buffer.push(SwitchEvent::FrameReceived {
            handle,
            origin: frame.origin().to_string(),
            destination: frame.destination().to_string(),
            protocol: frame.protocol(),
            len: frame.payload().len(),
        });

        Ok(match self.deliver(&frame)? {
            Some(indication) => ReadOutcome::Stored(indication),
            None => ReadOutcome::Dropped,
        })
    }

    // -------------------------------------------------------------------------
    // Peers
    // -------------------------------------------------------------------------

    /// Register a peer connection whose outbound frames go to `outbound`
    pub fn accept_peer(
        &mut self,
        label: String,
        outbound: mpsc::Sender<Vec<u8>>,
    ) -> Result<PeerHandle, SwitchError> {
        match self.peers.accept(label.clone(), outbound) {
            Ok(handle) => {
                self.event_buffer
                    .push(SwitchEvent::PeerConnected { handle, label });
                Ok(handle)
            }
            Err(e) => {
                warn!("Rejecting connection from {}: {}", label, e);
                self.event_buffer.push(SwitchEvent::PeerRejected { label });
                Err(e)
            }
        }
    }

    /// Close a peer connection; closing twice is a no-op
    pub fn close_peer(&mut self, handle: PeerHandle) {
        if self.peers.close(handle) {
            self.event_buffer
                .push(SwitchEvent::PeerDisconnected { handle });
        }
    }

    /// Connected peers
    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    // -------------------------------------------------------------------------
    // Storage API
    // -------------------------------------------------------------------------

    /// Number of messages in a class with the given status
    pub fn count_messages(&self, class: StorageClass, status: MessageStatus) -> usize {
        self.storage.count(class, status)
    }

    /// Indexes of the messages in a class with the given status
    pub fn list_messages(&self, class: StorageClass, status: MessageStatus) -> Vec<usize> {
        self.storage.indexes(class, status)
    }

    /// Read a stored message
    pub fn read_message(
        &self,
        class: StorageClass,
        index: usize,
    ) -> Result<StoredMessage, SwitchError> {
        self.storage.read(class, index).inspect_err(|_| {
            debug!("No message at storage[{}] index[{}]", class, index);
        })
    }

    /// Delete a stored message
    pub fn delete_message(&mut self, class: StorageClass, index: usize) -> Result<(), SwitchError> {
        self.storage.read(class, index)?;
        self.storage.free(class, index)
    }

    /// Delete every unleased message in every class
    pub fn delete_all_messages(&mut self) -> usize {
        let freed = self.storage.free_all();
        debug!("Deleted {} messages", freed);
        freed
    }

    /// Change a stored message's status
    pub fn set_message_status(
        &mut self,
        class: StorageClass,
        index: usize,
        status: MessageStatus,
    ) -> Result<(), SwitchError> {
        self.storage.set_status(class, index, status)
    }

    /// Read a message and take the lease on its slot
    pub fn acquire_message(
        &mut self,
        class: StorageClass,
        index: usize,
    ) -> Result<(StoredMessage, MessageLease), SwitchError> {
        let message = self.storage.read(class, index)?;
        let lease = self.storage.acquire(class, index)?;
        Ok((message, lease))
    }

    /// Give back a lease, freeing its slot
    pub fn release_message(&mut self, lease: MessageLease) -> Result<(), SwitchError> {
        self.storage.release(lease)
    }

    /// Hand a message to `f`, freeing its slot afterwards
    pub fn with_message<R>(
        &mut self,
        class: StorageClass,
        index: usize,
        f: impl FnOnce(&StoredMessage) -> R,
    ) -> Result<R, SwitchError> {
        self.storage.with_message(class, index, f)
    }

    /// Direct access to message storage
    pub fn storage(&self) -> &MessageStorage {
        &self.storage
    }

    /// Preferred storage class
    pub fn preferred_storage(&self) -> StorageClass {
        self.preferred_storage
    }

    /// Set the preferred storage class
    pub fn set_preferred_storage(&mut self, class: StorageClass) {
        debug!("Preferred storage set to {}", class);
        self.preferred_storage = class;
    }

    // -------------------------------------------------------------------------
    // Service centre and simulation hooks
    // -------------------------------------------------------------------------

    /// SMS service centre address
    pub fn smsc(&self) -> &str {
        &self.smsc
    }

    /// Set the SMS service centre address
    pub fn set_smsc(&mut self, smsc: impl Into<String>) -> Result<(), SwitchError> {
        let smsc = smsc.into();
        if smsc.len() >= ADDR_MAX {
            return Err(SwitchError::OutOfRange {
                len: smsc.len(),
                max: ADDR_MAX - 1,
            });
        }
        debug!("SMSC set to '{}'", smsc);
        self.smsc = smsc;
        Ok(())
    }

    /// Make every following send report a network error, or clear it
    pub fn set_send_error_cause(&mut self, cause: Option<u16>) {
        self.send_error_cause = cause;
    }

    /// Raise the storage-full notification
    pub fn report_storage_full(&mut self, class: Option<StorageClass>) {
        self.notify_storage_full(class);
    }

    fn notify_storage_full(&mut self, class: Option<StorageClass>) {
        let indication = StorageFullIndication { class };
        self.event_buffer.push(SwitchEvent::StorageFull(indication));
        if let Some(handler) = self.storage_full_handler.as_mut() {
            handler(&indication);
        }
    }

    // -------------------------------------------------------------------------
    // Notification handlers
    // -------------------------------------------------------------------------

    /// Install the new-message handler, replacing any previous one
    pub fn set_new_message_handler(&mut self, handler: NewMessageHandler) {
        self.new_message_handler = Some(handler);
    }

    /// Remove the new-message handler
    pub fn clear_new_message_handler(&mut self) {
        self.new_message_handler = None;
    }

    /// Install the storage-full handler, replacing any previous one
    pub fn set_storage_full_handler(&mut self, handler: StorageFullHandler) {
        self.storage_full_handler = Some(handler);
    }

    /// Remove the storage-full handler
    pub fn clear_storage_full_handler(&mut self) {
        self.storage_full_handler = None;
    }

    // -------------------------------------------------------------------------
    // Cell broadcast
    // -------------------------------------------------------------------------

    /// Cell broadcast registry
    pub fn cell_broadcast(&self) -> &CellBroadcastRegistry {
        &self.cell_broadcast
    }

    /// Add a 3GPP message identifier range
    pub fn add_range(&mut self, range: BroadcastRange) -> Result<(), SwitchError> {
        self.cell_broadcast.ranges_mut().add(range)
    }

    /// Remove the range covering `from_id..=to_id`
    pub fn remove_range(&mut self, from_id: u16, to_id: u16) -> Result<(), SwitchError> {
        self.cell_broadcast
            .ranges_mut()
            .remove((from_id, to_id))
            .map(|_| ())
    }

    /// Remove every range
    pub fn clear_ranges(&mut self) {
        self.cell_broadcast.ranges_mut().clear();
    }

    /// Add a CDMA broadcast service
    pub fn add_service(&mut self, service: BroadcastService) -> Result<(), SwitchError> {
        self.cell_broadcast.services_mut().add(service)
    }

    /// Remove the service with the given category and language
    pub fn remove_service(&mut self, category: u16, language: u16) -> Result<(), SwitchError> {
        self.cell_broadcast
            .services_mut()
            .remove((category, language))
            .map(|_| ())
    }

    /// Remove every service
    pub fn clear_services(&mut self) {
        self.cell_broadcast.services_mut().clear();
    }

    /// Start receiving cell broadcast for a protocol
    pub fn activate_cell_broadcast(&mut self, protocol: Protocol) {
        self.cell_broadcast.activate(protocol);
    }

    /// Stop receiving cell broadcast for a protocol
    pub fn deactivate_cell_broadcast(&mut self, protocol: Protocol) {
        self.cell_broadcast.deactivate(protocol);
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    /// Drain all pending events
    pub fn drain_events(&mut self) -> Vec<SwitchEvent> {
        std::mem::take(&mut self.event_buffer)
    }
}
