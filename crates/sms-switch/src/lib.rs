//! SMS Switching Engine
//!
//! This crate lets a simulated device send and receive short messages by
//! exchanging encoded PDUs with other simulator instances over TCP, while
//! keeping received messages in bounded, typed, in-memory storage.
//!
//! # Architecture
//!
//! - [`SmsSimulator`] holds all switch state: [`MessageStorage`] (fixed slots
//!   per [`StorageClass`]), the [`CellBroadcastRegistry`] and the
//!   [`PeerTable`]. It routes sends to peers and back to itself, and files
//!   inbound frames into storage.
//! - [`run_switch_actor`] owns one simulator and processes [`SwitchCommand`]s
//!   one at a time; [`SwitchHandle`] is the async client for it.
//! - [`PeerConnection`] runs one task per connected peer and the
//!   [`listener`] accepts peers over TCP.
//! - Everything that happens is published as a [`SwitchEvent`].
//!
//! # Example
//!
//! ```rust,no_run
//! use sms_protocol::SimPduCodec;
//! use sms_sim::VirtualModem;
//! use sms_switch::{listener, spawn_switch, SmsSimulator, SwitchConfig};
//!
//! # async fn demo() -> Result<(), sms_switch::SwitchError> {
//! let config = SwitchConfig::default();
//! let modem = VirtualModem::new(Default::default());
//! let simulator = SmsSimulator::new(config.clone(), modem.handle(), SimPduCodec::new());
//! let (switch, _task) = spawn_switch(simulator);
//!
//! let tcp = listener::bind(&config).await?;
//! listener::run_listener(tcp, switch, config.peer_queue_depth).await
//! # }
//! ```

pub mod actor;
pub mod cell_broadcast;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod events;
pub mod listener;
pub mod peers;
pub mod storage;

// Re-export actor types
pub use actor::{
    run_switch_actor, spawn_switch, CellBroadcastOp, MessageGuard, SwitchCommand, SwitchHandle,
};

// Re-export engine types
pub use engine::{
    incoming_storage, Loopback, NewMessageHandler, ReadOutcome, SendReport, SmsSimulator,
    StorageFullHandler,
};

pub use cell_broadcast::{
    BroadcastRange, BroadcastSelector, BroadcastService, CellBroadcastRegistry, SelectorList,
};
pub use config::SwitchConfig;
pub use connection::{attach, PeerConnection};
pub use error::SwitchError;
pub use events::{NewMessageIndication, StorageFullIndication, SwitchEvent};
pub use peers::{BroadcastReport, PeerHandle, PeerTable};
pub use storage::{MessageLease, MessageStatus, MessageStorage, StorageClass, StoredMessage};
