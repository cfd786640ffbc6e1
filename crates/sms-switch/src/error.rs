//! Error types for the switching engine

use sms_protocol::FrameError;
use thiserror::Error;

use crate::storage::StorageClass;

/// Errors that can occur in the switching engine
#[derive(Debug, Error)]
pub enum SwitchError {
    /// Device is not registered, or its subscriber number is unavailable
    #[error("not possible: {0}")]
    NotPossible(String),

    /// Every slot of a storage class is in use
    #[error("no free slot in {class} storage")]
    NoMemory {
        /// Storage class that is exhausted
        class: StorageClass,
    },

    /// Payload too large for a wire frame
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    OutOfRange {
        /// Offending length
        len: usize,
        /// Largest accepted length
        max: usize,
    },

    /// Index, class or key does not exist, or the slot is free
    #[error("not found")]
    NotFound,

    /// Registry is at capacity
    #[error("registry full ({capacity} entries)")]
    Full {
        /// Registry capacity
        capacity: usize,
    },

    /// Registry already holds an entry with the same key
    #[error("duplicate entry")]
    Duplicate,

    /// Frame size disagrees with its header, or the header is malformed
    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] FrameError),

    /// Connection limit reached
    #[error("connection rejected: limit of {max} peers reached")]
    ConnectionRejected {
        /// Configured connection limit
        max: usize,
    },

    /// Slot is held by an outstanding lease
    #[error("slot {index} in {class} storage is leased")]
    SlotLeased {
        /// Storage class of the slot
        class: StorageClass,
        /// Slot index
        index: usize,
    },

    /// Lease no longer matches the slot it was taken on
    #[error("stale lease on slot {index} in {class} storage")]
    StaleLease {
        /// Storage class of the slot
        class: StorageClass,
        /// Slot index
        index: usize,
    },

    /// Send failure injected through the simulation hook
    #[error("send rejected by network (cause {cause})")]
    SendRejected {
        /// Simulated network error cause
        cause: u16,
    },

    /// The switch actor has stopped
    #[error("switch actor is not running")]
    ActorUnavailable,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
