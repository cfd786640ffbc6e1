//! Switch Actor
//!
//! All switch state is owned by a single actor task. Peer connection tasks,
//! the listener and API clients never touch the [`SmsSimulator`] directly:
//! they send [`SwitchCommand`]s through a channel and, where an answer is
//! needed, wait on a oneshot reply. Outbound sends and inbound frames are
//! therefore handled one at a time, in the order they reach the actor.
//!
//! Events produced while handling a command are published on a broadcast
//! channel so that any number of observers can watch without slowing the
//! actor down.
//!
//! # Example
//!
//! ```rust,no_run
//! use sms_protocol::{Protocol, SimPduCodec, SmsPdu, PduCodec};
//! use sms_sim::VirtualModem;
//! use sms_switch::{spawn_switch, SmsSimulator, SwitchConfig};
//!
//! # async fn demo() -> Result<(), sms_switch::SwitchError> {
//! let modem = VirtualModem::new(Default::default());
//! let simulator = SmsSimulator::new(SwitchConfig::default(), modem.handle(), SimPduCodec::new());
//! let (switch, _task) = spawn_switch(simulator);
//!
//! let pdu = SimPduCodec::new()
//!     .encode(Protocol::Gsm, &SmsPdu::submit_text("+15550002", "hello"))
//!     .map_err(|e| sms_switch::SwitchError::NotPossible(e.to_string()))?;
//! let report = switch.send(Protocol::Gsm, pdu).await?;
//! println!("sent with reference {}", report.message_ref);
//! # Ok(())
//! # }
//! ```

use sms_protocol::Protocol;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cell_broadcast::{BroadcastRange, BroadcastService, CellBroadcastRegistry};
use crate::engine::{SendReport, SmsSimulator};
use crate::error::SwitchError;
use crate::events::{NewMessageIndication, StorageFullIndication, SwitchEvent};
use crate::peers::PeerHandle;
use crate::storage::{MessageLease, MessageStatus, StorageClass, StoredMessage};

/// Depth of the actor's command queue
const COMMAND_QUEUE_DEPTH: usize = 256;

/// Depth of the event broadcast channel
const EVENT_QUEUE_DEPTH: usize = 256;

/// Cell broadcast registry operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellBroadcastOp {
    /// Add a 3GPP message identifier range
    AddRange(BroadcastRange),
    /// Remove a 3GPP range by its bounds
    RemoveRange {
        /// First message identifier
        from_id: u16,
        /// Last message identifier
        to_id: u16,
    },
    /// Remove every 3GPP range
    ClearRanges,
    /// Add a CDMA service
    AddService(BroadcastService),
    /// Remove a CDMA service by category and language
    RemoveService {
        /// Service category
        category: u16,
        /// Language indicator
        language: u16,
    },
    /// Remove every CDMA service
    ClearServices,
    /// Start receiving cell broadcast for a protocol
    Activate(Protocol),
    /// Stop receiving cell broadcast for a protocol
    Deactivate(Protocol),
}

/// Commands sent to the switch actor
#[derive(Debug)]
pub enum SwitchCommand {
    /// Register a new peer connection
    RegisterPeer {
        /// Remote address or other label
        label: String,
        /// Queue the peer's connection task writes from
        outbound: mpsc::Sender<Vec<u8>>,
        /// Assigned handle, or None if the peer table is full
        response: oneshot::Sender<Option<PeerHandle>>,
    },

    /// Bytes of one read from a peer
    PeerData {
        /// Source peer
        handle: PeerHandle,
        /// Bytes read
        data: Vec<u8>,
    },

    /// A peer closed its end of the connection
    PeerClosed {
        /// Peer that closed
        handle: PeerHandle,
    },

    /// A peer's connection failed
    PeerError {
        /// Peer whose connection failed
        handle: PeerHandle,
        /// Error message
        message: String,
    },

    /// Send a PDU
    Send {
        /// Protocol of the PDU
        protocol: Protocol,
        /// Encoded PDU
        payload: Vec<u8>,
        /// Send outcome
        response: oneshot::Sender<Result<SendReport, SwitchError>>,
    },

    /// Count messages with a status
    CountMessages {
        /// Storage class to count in
        class: StorageClass,
        /// Status to count
        status: MessageStatus,
        /// Number of matching messages
        response: oneshot::Sender<usize>,
    },

    /// List the indexes of messages with a status
    ListMessages {
        /// Storage class to list
        class: StorageClass,
        /// Status to match
        status: MessageStatus,
        /// Matching indexes
        response: oneshot::Sender<Vec<usize>>,
    },

    /// Read a message
    ReadMessage {
        /// Storage class
        class: StorageClass,
        /// Slot index
        index: usize,
        /// The message
        response: oneshot::Sender<Result<StoredMessage, SwitchError>>,
    },

    /// Delete a message
    DeleteMessage {
        /// Storage class
        class: StorageClass,
        /// Slot index
        index: usize,
        /// Outcome
        response: oneshot::Sender<Result<(), SwitchError>>,
    },

    /// Delete every message
    DeleteAllMessages {
        /// Number of messages deleted
        response: oneshot::Sender<usize>,
    },

    /// Change a message's status
    SetMessageStatus {
        /// Storage class
        class: StorageClass,
        /// Slot index
        index: usize,
        /// New status
        status: MessageStatus,
        /// Outcome
        response: oneshot::Sender<Result<(), SwitchError>>,
    },

    /// Read a message and lease its slot
    AcquireMessage {
        /// Storage class
        class: StorageClass,
        /// Slot index
        index: usize,
        /// Queue the returned guard sends its release to
        release_tx: mpsc::Sender<SwitchCommand>,
        /// The message, leased until the guard is released or dropped
        response: oneshot::Sender<Result<MessageGuard, SwitchError>>,
    },

    /// Give back a lease, freeing its slot
    ReleaseMessage {
        /// Lease to give back
        lease: MessageLease,
        /// Outcome
        response: oneshot::Sender<Result<(), SwitchError>>,
    },

    /// Read a message and free its slot
    TakeMessage {
        /// Storage class
        class: StorageClass,
        /// Slot index
        index: usize,
        /// The message
        response: oneshot::Sender<Result<StoredMessage, SwitchError>>,
    },

    /// Set the preferred storage class
    SetPreferredStorage {
        /// New preferred class
        class: StorageClass,
    },

    /// Get the preferred storage class
    GetPreferredStorage {
        /// Preferred class
        response: oneshot::Sender<StorageClass>,
    },

    /// Get the SMS service centre address
    GetSmsc {
        /// Service centre address
        response: oneshot::Sender<String>,
    },

    /// Set the SMS service centre address
    SetSmsc {
        /// New address
        smsc: String,
        /// Outcome
        response: oneshot::Sender<Result<(), SwitchError>>,
    },

    /// Inject, or clear, a network error cause for following sends
    SetSendErrorCause {
        /// Cause to report, None to clear
        cause: Option<u16>,
    },

    /// Raise the storage-full notification
    ReportStorageFull {
        /// Exhausted class, if known
        class: Option<StorageClass>,
    },

    /// Route new-message notifications to a channel
    SubscribeNewMessages {
        /// Destination of the notifications
        tx: mpsc::UnboundedSender<NewMessageIndication>,
    },

    /// Stop new-message notifications
    UnsubscribeNewMessages,

    /// Route storage-full notifications to a channel
    SubscribeStorageFull {
        /// Destination of the notifications
        tx: mpsc::UnboundedSender<StorageFullIndication>,
    },

    /// Stop storage-full notifications
    UnsubscribeStorageFull,

    /// Cell broadcast registry operation
    CellBroadcast {
        /// Operation to run
        op: CellBroadcastOp,
        /// Outcome
        response: oneshot::Sender<Result<(), SwitchError>>,
    },

    /// Snapshot the cell broadcast selectors and activation flags
    GetCellBroadcast {
        /// Copy of the registry
        response: oneshot::Sender<CellBroadcastRegistry>,
    },

    /// Shutdown the actor
    Shutdown,
}

/// Run the switch actor until every handle is dropped or it is shut down
pub async fn run_switch_actor(
    mut simulator: SmsSimulator,
    mut cmd_rx: mpsc::Receiver<SwitchCommand>,
    event_tx: broadcast::Sender<SwitchEvent>,
) {
    info!("Switch actor started");

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            SwitchCommand::RegisterPeer {
                label,
                outbound,
                response,
            } => {
                let handle = simulator.accept_peer(label, outbound).ok();
                let _ = response.send(handle);
            }

            SwitchCommand::PeerData { handle, data } => {
                match simulator.on_peer_readable(handle, &data) {
                    Ok(outcome) => debug!("Peer {} read handled: {:?}", handle.0, outcome),
                    Err(SwitchError::NotFound) => {
                        debug!("Ignoring data from closed peer {}", handle.0)
                    }
                    Err(e) => warn!("Inbound frame from peer {} failed: {}", handle.0, e),
                }
            }

            SwitchCommand::PeerClosed { handle } => {
                simulator.close_peer(handle);
            }

            SwitchCommand::PeerError { handle, message } => {
                warn!("Connection error on peer {}: {}", handle.0, message);
                let _ = event_tx.send(SwitchEvent::Error {
                    source: format!("Peer {}", handle.0),
                    message,
                });
                simulator.close_peer(handle);
            }

            SwitchCommand::Send {
                protocol,
                payload,
                response,
            } => {
                let _ = response.send(simulator.send(protocol, payload));
            }

            SwitchCommand::CountMessages {
                class,
                status,
                response,
            } => {
                let _ = response.send(simulator.count_messages(class, status));
            }

            SwitchCommand::ListMessages {
                class,
                status,
                response,
            } => {
                let _ = response.send(simulator.list_messages(class, status));
            }

            SwitchCommand::ReadMessage {
                class,
                index,
                response,
            } => {
                let _ = response.send(simulator.read_message(class, index));
            }

            SwitchCommand::DeleteMessage {
                class,
                index,
                response,
            } => {
                let _ = response.send(simulator.delete_message(class, index));
            }

            SwitchCommand::DeleteAllMessages { response } => {
                let _ = response.send(simulator.delete_all_messages());
            }

            SwitchCommand::SetMessageStatus {
                class,
                index,
                status,
                response,
            } => {
                let _ = response.send(simulator.set_message_status(class, index, status));
            }

            SwitchCommand::AcquireMessage {
                class,
                index,
                release_tx,
                response,
            } => {
                // An undelivered guard is dropped here and queues its own release
                let _ = response.send(
                    simulator
                        .acquire_message(class, index)
                        .map(|(message, lease)| MessageGuard::new(message, lease, release_tx)),
                );
            }

            SwitchCommand::ReleaseMessage { lease, response } => {
                let _ = response.send(simulator.release_message(lease));
            }

            SwitchCommand::TakeMessage {
                class,
                index,
                response,
            } => {
                let _ = response.send(simulator.with_message(class, index, StoredMessage::clone));
            }

            SwitchCommand::SetPreferredStorage { class } => {
                simulator.set_preferred_storage(class);
            }

            SwitchCommand::GetPreferredStorage { response } => {
                let _ = response.send(simulator.preferred_storage());
            }

            SwitchCommand::GetSmsc { response } => {
                let _ = response.send(simulator.smsc().to_string());
            }

            SwitchCommand::SetSmsc { smsc, response } => {
                let _ = response.send(simulator.set_smsc(smsc));
            }

            SwitchCommand::SetSendErrorCause { cause } => {
                simulator.set_send_error_cause(cause);
            }

            SwitchCommand::ReportStorageFull { class } => {
                simulator.report_storage_full(class);
            }

            SwitchCommand::SubscribeNewMessages { tx } => {
                simulator.set_new_message_handler(Box::new(move |indication| {
                    let _ = tx.send(*indication);
                }));
            }

            SwitchCommand::UnsubscribeNewMessages => {
                simulator.clear_new_message_handler();
            }

            SwitchCommand::SubscribeStorageFull { tx } => {
                simulator.set_storage_full_handler(Box::new(move |indication| {
                    let _ = tx.send(*indication);
                }));
            }

            SwitchCommand::UnsubscribeStorageFull => {
                simulator.clear_storage_full_handler();
            }

            SwitchCommand::CellBroadcast { op, response } => {
                let _ = response.send(apply_cell_broadcast_op(&mut simulator, op));
            }

            SwitchCommand::GetCellBroadcast { response } => {
                let _ = response.send(simulator.cell_broadcast().clone());
            }

            SwitchCommand::Shutdown => {
                info!("Switch actor shutting down");
                break;
            }
        }

        for event in simulator.drain_events() {
            // No receivers is fine
            let _ = event_tx.send(event);
        }
    }

    info!("Switch actor stopped");
}

fn apply_cell_broadcast_op(
    simulator: &mut SmsSimulator,
    op: CellBroadcastOp,
) -> Result<(), SwitchError> {
    match op {
        CellBroadcastOp::AddRange(range) => simulator.add_range(range),
        CellBroadcastOp::RemoveRange { from_id, to_id } => simulator.remove_range(from_id, to_id),
        CellBroadcastOp::ClearRanges => {
            simulator.clear_ranges();
            Ok(())
        }
        CellBroadcastOp::AddService(service) => simulator.add_service(service),
        CellBroadcastOp::RemoveService { category, language } => {
            simulator.remove_service(category, language)
        }
        CellBroadcastOp::ClearServices => {
            simulator.clear_services();
            Ok(())
        }
        CellBroadcastOp::Activate(protocol) => {
            simulator.activate_cell_broadcast(protocol);
            Ok(())
        }
        CellBroadcastOp::Deactivate(protocol) => {
            simulator.deactivate_cell_broadcast(protocol);
            Ok(())
        }
    }
}

/// Spawn the switch actor on the current runtime
pub fn spawn_switch(simulator: SmsSimulator) -> (SwitchHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let (event_tx, _) = broadcast::channel(EVENT_QUEUE_DEPTH);
    let task = tokio::spawn(run_switch_actor(simulator, cmd_rx, event_tx.clone()));
    (SwitchHandle { cmd_tx, event_tx }, task)
}

/// A stored message leased through the switch actor
///
/// While the guard lives its slot cannot be deleted, have its status set to
/// `Unknown` or be leased again. Awaiting [`release`](Self::release) frees
/// the slot and reports the outcome; dropping the guard on any other path
/// queues the same release. The lease goes back at most once.
#[derive(Debug)]
pub struct MessageGuard {
    message: StoredMessage,
    lease: Option<MessageLease>,
    release_tx: mpsc::Sender<SwitchCommand>,
}

impl MessageGuard {
    fn new(message: StoredMessage, lease: MessageLease, release_tx: mpsc::Sender<SwitchCommand>) -> Self {
        Self {
            message,
            lease: Some(lease),
            release_tx,
        }
    }

    /// The leased message
    pub fn message(&self) -> &StoredMessage {
        &self.message
    }

    /// Storage class of the leased slot
    pub fn class(&self) -> StorageClass {
        self.message.class
    }

    /// Index of the leased slot
    pub fn index(&self) -> usize {
        self.message.index
    }

    /// Free the slot and wait for the actor to confirm
    pub async fn release(mut self) -> Result<(), SwitchError> {
        // Reserve first so a cancelled wait leaves the lease with the guard
        let permit = self
            .release_tx
            .reserve()
            .await
            .map_err(|_| SwitchError::ActorUnavailable)?;
        let Some(lease) = self.lease.take() else {
            return Ok(());
        };

        let (response, rx) = oneshot::channel();
        permit.send(SwitchCommand::ReleaseMessage { lease, response });
        rx.await.map_err(|_| SwitchError::ActorUnavailable)?
    }
}

impl Drop for MessageGuard {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        let (class, index) = (lease.class(), lease.index());
        let (response, _) = oneshot::channel();

        match self
            .release_tx
            .try_send(SwitchCommand::ReleaseMessage { lease, response })
        {
            Ok(()) => debug!("Queued release of dropped lease on {}[{}]", class, index),
            Err(mpsc::error::TrySendError::Full(cmd)) => {
                match tokio::runtime::Handle::try_current() {
                    Ok(runtime) => {
                        let release_tx = self.release_tx.clone();
                        runtime.spawn(async move {
                            let _ = release_tx.send(cmd).await;
                        });
                    }
                    Err(_) => warn!(
                        "Lease on {}[{}] dropped outside a runtime while the switch queue is full",
                        class, index
                    ),
                }
            }
            // The actor, and the storage with it, is gone
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Client handle to a running switch actor
///
/// Cheap to clone; every clone talks to the same actor. Every method fails
/// with [`SwitchError::ActorUnavailable`] once the actor has stopped.
#[derive(Debug, Clone)]
pub struct SwitchHandle {
    cmd_tx: mpsc::Sender<SwitchCommand>,
    event_tx: broadcast::Sender<SwitchEvent>,
}

impl SwitchHandle {
    /// Build a handle from the actor's channels
    pub fn new(cmd_tx: mpsc::Sender<SwitchCommand>, event_tx: broadcast::Sender<SwitchEvent>) -> Self {
        Self { cmd_tx, event_tx }
    }

    /// Receive every event the switch publishes from now on
    pub fn subscribe_events(&self) -> broadcast::Receiver<SwitchEvent> {
        self.event_tx.subscribe()
    }

    async fn command(&self, cmd: SwitchCommand) -> Result<(), SwitchError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| SwitchError::ActorUnavailable)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SwitchCommand,
    ) -> Result<T, SwitchError> {
        let (tx, rx) = oneshot::channel();
        self.command(make(tx)).await?;
        rx.await.map_err(|_| SwitchError::ActorUnavailable)
    }

    // -------------------------------------------------------------------------
    // Peer connections
    // -------------------------------------------------------------------------

    /// Register a peer; returns None when the peer table is full
    pub async fn register_peer(
        &self,
        label: String,
        outbound: mpsc::Sender<Vec<u8>>,
    ) -> Result<Option<PeerHandle>, SwitchError> {
        self.request(|response| SwitchCommand::RegisterPeer {
            label,
            outbound,
            response,
        })
        .await
    }

    /// Forward the bytes of one read from a peer
    pub async fn peer_data(&self, handle: PeerHandle, data: Vec<u8>) -> Result<(), SwitchError> {
        self.command(SwitchCommand::PeerData { handle, data }).await
    }

    /// Report that a peer closed its end
    pub async fn peer_closed(&self, handle: PeerHandle) -> Result<(), SwitchError> {
        self.command(SwitchCommand::PeerClosed { handle }).await
    }

    /// Report a peer connection failure
    pub async fn peer_error(&self, handle: PeerHandle, message: String) -> Result<(), SwitchError> {
        self.command(SwitchCommand::PeerError { handle, message })
            .await
    }

    // -------------------------------------------------------------------------
    // Messaging
    // -------------------------------------------------------------------------

    /// Send a PDU
    ///
    /// The returned report carries the message reference and the loopback
    /// outcome; [`SendReport::result`] folds them into a single result.
    pub async fn send(&self, protocol: Protocol, payload: Vec<u8>) -> Result<SendReport, SwitchError> {
        self.request(|response| SwitchCommand::Send {
            protocol,
            payload,
            response,
        })
        .await?
    }

    /// Number of messages in a class with the given status
    pub async fn count_messages(
        &self,
        class: StorageClass,
        status: MessageStatus,
    ) -> Result<usize, SwitchError> {
        self.request(|response| SwitchCommand::CountMessages {
            class,
            status,
            response,
        })
        .await
    }

    /// Indexes of the messages in a class with the given status
    pub async fn list_messages(
        &self,
        class: StorageClass,
        status: MessageStatus,
    ) -> Result<Vec<usize>, SwitchError> {
        self.request(|response| SwitchCommand::ListMessages {
            class,
            status,
            response,
        })
        .await
    }

    /// Read a stored message
    pub async fn read_message(
        &self,
        class: StorageClass,
        index: usize,
    ) -> Result<StoredMessage, SwitchError> {
        self.request(|response| SwitchCommand::ReadMessage {
            class,
            index,
            response,
        })
        .await?
    }

    /// Delete a stored message
    pub async fn delete_message(&self, class: StorageClass, index: usize) -> Result<(), SwitchError> {
        self.request(|response| SwitchCommand::DeleteMessage {
            class,
            index,
            response,
        })
        .await?
    }

    /// Delete every unleased message
    pub async fn delete_all_messages(&self) -> Result<usize, SwitchError> {
        self.request(|response| SwitchCommand::DeleteAllMessages { response })
            .await
    }

    /// Change a stored message's status
    pub async fn set_message_status(
        &self,
        class: StorageClass,
        index: usize,
        status: MessageStatus,
    ) -> Result<(), SwitchError> {
        self.request(|response| SwitchCommand::SetMessageStatus {
            class,
            index,
            status,
            response,
        })
        .await?
    }

    /// Read a message and lease its slot
    ///
    /// The slot stays leased until the returned guard is released or dropped.
    pub async fn acquire_message(
        &self,
        class: StorageClass,
        index: usize,
    ) -> Result<MessageGuard, SwitchError> {
        let release_tx = self.cmd_tx.clone();
        self.request(|response| SwitchCommand::AcquireMessage {
            class,
            index,
            release_tx,
            response,
        })
        .await?
    }

    /// Give back a leased message, freeing its slot
    pub async fn release_message(&self, guard: MessageGuard) -> Result<(), SwitchError> {
        guard.release().await
    }

    /// Read a message and free its slot in one step
    pub async fn take_message(
        &self,
        class: StorageClass,
        index: usize,
    ) -> Result<StoredMessage, SwitchError> {
        self.request(|response| SwitchCommand::TakeMessage {
            class,
            index,
            response,
        })
        .await?
    }

    /// Set the preferred storage class
    pub async fn set_preferred_storage(&self, class: StorageClass) -> Result<(), SwitchError> {
        self.command(SwitchCommand::SetPreferredStorage { class })
            .await
    }

    /// Get the preferred storage class
    pub async fn preferred_storage(&self) -> Result<StorageClass, SwitchError> {
        self.request(|response| SwitchCommand::GetPreferredStorage { response })
            .await
    }

    /// Get the SMS service centre address
    pub async fn smsc(&self) -> Result<String, SwitchError> {
        self.request(|response| SwitchCommand::GetSmsc { response })
            .await
    }

    /// Set the SMS service centre address
    pub async fn set_smsc(&self, smsc: impl Into<String>) -> Result<(), SwitchError> {
        let smsc = smsc.into();
        self.request(|response| SwitchCommand::SetSmsc { smsc, response })
            .await?
    }

    /// Inject, or clear, a network error cause reported by following sends
    pub async fn set_send_error_cause(&self, cause: Option<u16>) -> Result<(), SwitchError> {
        self.command(SwitchCommand::SetSendErrorCause { cause })
            .await
    }

    /// Raise the storage-full notification
    pub async fn report_storage_full(&self, class: Option<StorageClass>) -> Result<(), SwitchError> {
        self.command(SwitchCommand::ReportStorageFull { class })
            .await
    }

    // -------------------------------------------------------------------------
    // Notifications
    // -------------------------------------------------------------------------

    /// Receive new-message notifications, replacing any earlier subscriber
    pub async fn subscribe_new_messages(
        &self,
    ) -> Result<mpsc::UnboundedReceiver<NewMessageIndication>, SwitchError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.command(SwitchCommand::SubscribeNewMessages { tx })
            .await?;
        Ok(rx)
    }

    /// Stop new-message notifications
    pub async fn unsubscribe_new_messages(&self) -> Result<(), SwitchError> {
        self.command(SwitchCommand::UnsubscribeNewMessages).await
    }

    /// Receive storage-full notifications, replacing any earlier subscriber
    pub async fn subscribe_storage_full(
        &self,
    ) -> Result<mpsc::UnboundedReceiver<StorageFullIndication>, SwitchError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.command(SwitchCommand::SubscribeStorageFull { tx })
            .await?;
        Ok(rx)
    }

    /// Stop storage-full notifications
    pub async fn unsubscribe_storage_full(&self) -> Result<(), SwitchError> {
        self.command(SwitchCommand::UnsubscribeStorageFull).await
    }

    // -------------------------------------------------------------------------
    // Cell broadcast
    // -------------------------------------------------------------------------

    /// Run a cell broadcast registry operation
    pub async fn cell_broadcast(&self, op: CellBroadcastOp) -> Result<(), SwitchError> {
        self.request(|response| SwitchCommand::CellBroadcast { op, response })
            .await?
    }

    /// Add a 3GPP message identifier range
    pub async fn add_range(&self, range: BroadcastRange) -> Result<(), SwitchError> {
        self.cell_broadcast(CellBroadcastOp::AddRange(range)).await
    }

    /// Remove a 3GPP range by its bounds
    pub async fn remove_range(&self, from_id: u16, to_id: u16) -> Result<(), SwitchError> {
        self.cell_broadcast(CellBroadcastOp::RemoveRange { from_id, to_id })
            .await
    }

    /// Remove every 3GPP range
    pub async fn clear_ranges(&self) -> Result<(), SwitchError> {
        self.cell_broadcast(CellBroadcastOp::ClearRanges).await
    }

    /// Add a CDMA service
    pub async fn add_service(&self, service: BroadcastService) -> Result<(), SwitchError> {
        self.cell_broadcast(CellBroadcastOp::AddService(service))
            .await
    }

    /// Remove a CDMA service by category and language
    pub async fn remove_service(&self, category: u16, language: u16) -> Result<(), SwitchError> {
        self.cell_broadcast(CellBroadcastOp::RemoveService { category, language })
            .await
    }

    /// Remove every CDMA service
    pub async fn clear_services(&self) -> Result<(), SwitchError> {
        self.cell_broadcast(CellBroadcastOp::ClearServices).await
    }

    /// Start receiving cell broadcast for a protocol
    pub async fn activate_cell_broadcast(&self, protocol: Protocol) -> Result<(), SwitchError> {
        self.cell_broadcast(CellBroadcastOp::Activate(protocol))
            .await
    }

    /// Stop receiving cell broadcast for a protocol
    pub async fn deactivate_cell_broadcast(&self, protocol: Protocol) -> Result<(), SwitchError> {
        self.cell_broadcast(CellBroadcastOp::Deactivate(protocol))
            .await
    }

    /// Current cell broadcast configuration
    pub async fn cell_broadcast_state(&self) -> Result<CellBroadcastRegistry, SwitchError> {
        self.request(|response| SwitchCommand::GetCellBroadcast { response })
            .await
    }

    /// Stop the actor
    pub async fn shutdown(&self) -> Result<(), SwitchError> {
        self.command(SwitchCommand::Shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use sms_protocol::{PduCodec, SimPduCodec, SmsPdu};
    use sms_sim::{VirtualModem, VirtualModemConfig};

    use super::*;
    use crate::config::SwitchConfig;

    const LOCAL: &str = "+15550001";

    fn start() -> (SwitchHandle, VirtualModem) {
        let modem = VirtualModem::new(VirtualModemConfig {
            subscriber_number: LOCAL.into(),
            ..Default::default()
        });
        let simulator = SmsSimulator::new(SwitchConfig::default(), modem.handle(), SimPduCodec::new());
        let (switch, _task) = spawn_switch(simulator);
        (switch, modem)
    }

    fn submit_to(destination: &str) -> Vec<u8> {
        SimPduCodec::new()
            .encode(Protocol::Gsm, &SmsPdu::submit_text(destination, "hello"))
            .unwrap()
    }

    #[tokio::test]
    async fn test_send_to_self_notifies_subscriber() {
        let (switch, _modem) = start();
        let mut new_messages = switch.subscribe_new_messages().await.unwrap();

        let report = switch.send(Protocol::Gsm, submit_to(LOCAL)).await.unwrap();
        assert_eq!(report.result().unwrap(), 0);

        let indication = new_messages.recv().await.unwrap();
        assert_eq!(indication.class, StorageClass::Sim);
        assert_eq!(
            switch
                .count_messages(StorageClass::Sim, MessageStatus::Unread)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_subscriber() {
        let (switch, _modem) = start();
        let mut first = switch.subscribe_new_messages().await.unwrap();
        let mut second = switch.subscribe_new_messages().await.unwrap();

        switch.send(Protocol::Gsm, submit_to(LOCAL)).await.unwrap();

        assert!(second.recv().await.is_some());
        // The replaced handler, and with it the first sender, is gone
        assert!(first.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let (switch, _modem) = start();
        let mut rx = switch.subscribe_storage_full().await.unwrap();
        switch.report_storage_full(None).await.unwrap();
        assert_eq!(rx.recv().await, Some(StorageFullIndication { class: None }));

        switch.unsubscribe_storage_full().await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_while_offline() {
        let (switch, modem) = start();
        modem.set_registration(sms_protocol::RegistrationState::Searching);

        assert!(matches!(
            switch.send(Protocol::Gsm, submit_to(LOCAL)).await,
            Err(SwitchError::NotPossible(_))
        ));
    }

    #[tokio::test]
    async fn test_take_message_frees_slot() {
        let (switch, _modem) = start();
        switch.send(Protocol::Gsm, submit_to(LOCAL)).await.unwrap();

        let msg = switch.take_message(StorageClass::Sim, 0).await.unwrap();
        assert_eq!(msg.protocol, Protocol::Gsm);
        assert!(matches!(
            switch.read_message(StorageClass::Sim, 0).await,
            Err(SwitchError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_lease_over_handle() {
        let (switch, _modem) = start();
        switch.send(Protocol::Gsm, submit_to(LOCAL)).await.unwrap();

        let guard = switch.acquire_message(StorageClass::Sim, 0).await.unwrap();
        assert_eq!(guard.message().status, MessageStatus::Unread);
        assert!(matches!(
            switch.delete_message(StorageClass::Sim, 0).await,
            Err(SwitchError::SlotLeased { .. })
        ));
        switch.release_message(guard).await.unwrap();
        assert_eq!(
            switch
                .list_messages(StorageClass::Sim, MessageStatus::Unread)
                .await
                .unwrap(),
            Vec::<usize>::new()
        );
    }

    #[tokio::test]
    async fn test_lease_dropped_on_error_path_frees_slot() {
        let (switch, _modem) = start();
        switch.send(Protocol::Gsm, submit_to(LOCAL)).await.unwrap();

        let result: Result<(), SwitchError> = async {
            let guard = switch.acquire_message(StorageClass::Sim, 0).await?;
            assert_eq!(guard.index(), 0);
            Err(SwitchError::NotFound)
        }
        .await;
        assert!(matches!(result, Err(SwitchError::NotFound)));

        // The release was queued ahead of these commands
        assert!(matches!(
            switch.read_message(StorageClass::Sim, 0).await,
            Err(SwitchError::NotFound)
        ));
        switch.send(Protocol::Gsm, submit_to(LOCAL)).await.unwrap();
        let guard = switch.acquire_message(StorageClass::Sim, 0).await.unwrap();
        drop(guard);
        assert_eq!(switch.delete_all_messages().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_released_lease_is_not_released_again() {
        let (switch, _modem) = start();
        switch.send(Protocol::Gsm, submit_to(LOCAL)).await.unwrap();
        let first = switch.acquire_message(StorageClass::Sim, 0).await.unwrap();
        first.release().await.unwrap();

        // Same slot, new message, new lease
        switch.send(Protocol::Gsm, submit_to(LOCAL)).await.unwrap();
        let second = switch.acquire_message(StorageClass::Sim, 0).await.unwrap();
        assert!(matches!(
            switch.delete_message(StorageClass::Sim, 0).await,
            Err(SwitchError::SlotLeased { .. })
        ));
        second.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_guard_outlives_actor() {
        let (switch, _modem) = start();
        switch.send(Protocol::Gsm, submit_to(LOCAL)).await.unwrap();
        let guard = switch.acquire_message(StorageClass::Sim, 0).await.unwrap();

        switch.shutdown().await.unwrap();
        assert!(matches!(
            guard.release().await,
            Err(SwitchError::ActorUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_settings_round_trip_through_actor() {
        let (switch, _modem) = start();

        switch.set_preferred_storage(StorageClass::Sim).await.unwrap();
        assert_eq!(switch.preferred_storage().await.unwrap(), StorageClass::Sim);

        switch.set_smsc("+3312345").await.unwrap();
        assert_eq!(switch.smsc().await.unwrap(), "+3312345");
    }

    #[tokio::test]
    async fn test_cell_broadcast_over_handle() {
        let (switch, _modem) = start();
        switch.add_range(BroadcastRange::new(1, 2)).await.unwrap();
        assert!(matches!(
            switch.add_range(BroadcastRange::new(1, 2)).await,
            Err(SwitchError::Duplicate)
        ));
        switch.remove_range(1, 2).await.unwrap();
        assert!(matches!(
            switch.remove_service(9, 9).await,
            Err(SwitchError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let (switch, _modem) = start();
        let mut events = switch.subscribe_events();
        switch.send(Protocol::Gsm, submit_to("+1999")).await.unwrap();

        let event = events.recv().await.unwrap();
        assert!(matches!(event, SwitchEvent::FrameSent { peers: 0, .. }));
    }

    #[tokio::test]
    async fn test_shutdown() {
        let (switch, _modem) = start();
        switch.shutdown().await.unwrap();
        // Wait for the actor to drop its receiver
        while !switch.cmd_tx.is_closed() {
            tokio::task::yield_now().await;
        }
        assert!(matches!(
            switch.smsc().await,
            Err(SwitchError::ActorUnavailable)
        ));
    }
}
