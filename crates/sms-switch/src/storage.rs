//! Fixed-capacity message storage
//!
//! Each storage class is backed by a fixed number of slots that are never
//! grown. A slot is free while its status is [`MessageStatus::Unknown`];
//! allocation is a linear scan for the first free slot.
//!
//! Consumers that hand a message to an application layer take a
//! [`MessageLease`] on its slot. While the lease is outstanding the slot can
//! only be freed by releasing the lease, and releasing it frees the slot.

use std::fmt;

use serde::{Deserialize, Serialize};
use sms_protocol::{Protocol, MAX_PAYLOAD_LEN};
use tracing::debug;

use crate::error::SwitchError;

/// Message storage area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StorageClass {
    /// Modem non-volatile memory
    #[default]
    Nv,
    /// SIM card
    Sim,
}

impl StorageClass {
    /// Every storage class, in slot-array order
    pub const ALL: [StorageClass; 2] = [StorageClass::Nv, StorageClass::Sim];

    fn index(self) -> usize {
        match self {
            StorageClass::Nv => 0,
            StorageClass::Sim => 1,
        }
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            StorageClass::Nv => "NV",
            StorageClass::Sim => "SIM",
        }
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Status of a stored message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MessageStatus {
    /// Received, not yet read
    Unread,
    /// Received and read
    Read,
    /// Stored and sent
    Sent,
    /// Stored, not yet sent
    Unsent,
    /// Slot is free
    #[default]
    Unknown,
}

/// Snapshot of a stored message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Storage class holding the message
    pub class: StorageClass,
    /// Slot index within the class
    pub index: usize,
    /// Current status
    pub status: MessageStatus,
    /// Protocol the PDU is encoded for
    pub protocol: Protocol,
    /// Encoded PDU
    pub pdu: Vec<u8>,
}

/// Exclusive claim on a stored message
///
/// Obtained from [`MessageStorage::acquire`] and given back through
/// [`MessageStorage::release`], which frees the slot. The lease is not
/// clonable, so it can be released at most once. Callers going through the
/// switch actor hold it inside a [`MessageGuard`](crate::actor::MessageGuard),
/// which releases it when dropped; direct callers use
/// [`MessageStorage::with_message`] for the same guarantee.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a lease keeps its slot occupied until released"]
pub struct MessageLease {
    class: StorageClass,
    index: usize,
    generation: u64,
}

impl MessageLease {
    /// Storage class of the leased slot
    pub fn class(&self) -> StorageClass {
        self.class
    }

    /// Index of the leased slot
    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Debug, Clone, Default)]
struct Slot {
    status: MessageStatus,
    protocol: Option<Protocol>,
    pdu: Vec<u8>,
    /// Bumped every time the slot is freed
    generation: u64,
    leased: bool,
}

impl Slot {
    fn is_free(&self) -> bool {
        self.status == MessageStatus::Unknown
    }

    fn clear(&mut self) {
        self.status = MessageStatus::Unknown;
        self.protocol = None;
        self.pdu.clear();
        self.leased = false;
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Slot arrays for every storage class
#[derive(Debug, Clone)]
pub struct MessageStorage {
    classes: [Vec<Slot>; 2],
    capacity: usize,
}

impl MessageStorage {
    /// Create storage with `capacity` slots per class
    pub fn new(capacity: usize) -> Self {
        Self {
            classes: [vec![Slot::default(); capacity], vec![Slot::default(); capacity]],
            capacity,
        }
    }

    /// Slots per class
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn slot(&self, class: StorageClass, index: usize) -> Result<&Slot, SwitchError> {
        self.classes[class.index()]
            .get(index)
            .ok_or(SwitchError::NotFound)
    }

    fn slot_mut(&mut self, class: StorageClass, index: usize) -> Result<&mut Slot, SwitchError> {
        self.classes[class.index()]
            .get_mut(index)
            .ok_or(SwitchError::NotFound)
    }

    /// Find the first free slot in a class
    ///
    /// The slot stays free until it is written.
    pub fn allocate(&self, class: StorageClass) -> Result<usize, SwitchError> {
        self.classes[class.index()]
            .iter()
            .position(Slot::is_free)
            .ok_or(SwitchError::NoMemory { class })
    }

    /// Overwrite a slot's protocol and PDU in place
    ///
    /// Writing a free slot makes it live with status `Unread`; the status of
    /// a live slot is left alone.
    pub fn write(
        &mut self,
        class: StorageClass,
        index: usize,
        protocol: Protocol,
        pdu: Vec<u8>,
    ) -> Result<(), SwitchError> {
        if pdu.len() > MAX_PAYLOAD_LEN {
            return Err(SwitchError::OutOfRange {
                len: pdu.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }

        let slot = self.slot_mut(class, index)?;
        if slot.is_free() {
            slot.status = MessageStatus::Unread;
        }
        slot.protocol = Some(protocol);
        slot.pdu = pdu;
        Ok(())
    }

    /// Allocate a slot, write the message and set its status
    pub fn store(
        &mut self,
        class: StorageClass,
        protocol: Protocol,
        pdu: Vec<u8>,
        status: MessageStatus,
    ) -> Result<usize, SwitchError> {
        let index = self.allocate(class)?;
        self.write(class, index, protocol, pdu)?;
        if status != MessageStatus::Unknown {
            self.slot_mut(class, index)?.status = status;
        }
        debug!("New message at storage[{}] idx[{}]", class, index);
        Ok(index)
    }

    /// Read a live message
    pub fn read(&self, class: StorageClass, index: usize) -> Result<StoredMessage, SwitchError> {
        let slot = self.slot(class, index)?;
        match (slot.is_free(), slot.protocol) {
            (false, Some(protocol)) => Ok(StoredMessage {
                class,
                index,
                status: slot.status,
                protocol,
                pdu: slot.pdu.clone(),
            }),
            _ => Err(SwitchError::NotFound),
        }
    }

    /// Change the status of a live message
    ///
    /// Setting `Unknown` frees the slot, which a lease forbids.
    pub fn set_status(
        &mut self,
        class: StorageClass,
        index: usize,
        status: MessageStatus,
    ) -> Result<(), SwitchError> {
        let slot = self.slot_mut(class, index)?;
        if slot.is_free() {
            return Err(SwitchError::NotFound);
        }
        if status == MessageStatus::Unknown {
            if slot.leased {
                return Err(SwitchError::SlotLeased { class, index });
            }
            slot.clear();
            return Ok(());
        }

        debug!(
            "Changing message status storage[{}] index[{}] status [{:?}] -> [{:?}]",
            class, index, slot.status, status
        );
        slot.status = status;
        Ok(())
    }

    /// Free a slot; freeing a free slot succeeds
    pub fn free(&mut self, class: StorageClass, index: usize) -> Result<(), SwitchError> {
        let slot = self.slot_mut(class, index)?;
        if slot.leased {
            return Err(SwitchError::SlotLeased { class, index });
        }
        if !slot.is_free() {
            slot.clear();
        }
        Ok(())
    }

    /// Free every unleased slot in every class, returning how many were live
    pub fn free_all(&mut self) -> usize {
        let mut freed = 0;
        for slot in self.classes.iter_mut().flatten() {
            if !slot.is_free() && !slot.leased {
                slot.clear();
                freed += 1;
            }
        }
        freed
    }

    /// Number of messages in a class with the given status
    ///
    /// Counting `Unknown` yields the number of free slots.
    pub fn count(&self, class: StorageClass, status: MessageStatus) -> usize {
        self.classes[class.index()]
            .iter()
            .filter(|slot| slot.status == status)
            .count()
    }

    /// Indexes of the messages in a class with the given status, ascending
    pub fn indexes(&self, class: StorageClass, status: MessageStatus) -> Vec<usize> {
        self.classes[class.index()]
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.status == status)
            .map(|(index, _)| index)
            .collect()
    }

    /// Number of live messages in a class
    pub fn occupied(&self, class: StorageClass) -> usize {
        self.capacity - self.count(class, MessageStatus::Unknown)
    }

    /// Take the lease on a live message
    pub fn acquire(&mut self, class: StorageClass, index: usize) -> Result<MessageLease, SwitchError> {
        let slot = self.slot_mut(class, index)?;
        if slot.is_free() {
            return Err(SwitchError::NotFound);
        }
        if slot.leased {
            return Err(SwitchError::SlotLeased { class, index });
        }
        slot.leased = true;
        Ok(MessageLease {
            class,
            index,
            generation: slot.generation,
        })
    }

    /// Give back a lease, freeing its slot
    pub fn release(&mut self, lease: MessageLease) -> Result<(), SwitchError> {
        let MessageLease {
            class,
            index,
            generation,
        } = lease;
        let slot = self.slot_mut(class, index)?;
        if !slot.leased || slot.generation != generation {
            return Err(SwitchError::StaleLease { class, index });
        }
        slot.clear();
        debug!("Released message storage[{}] index[{}]", class, index);
        Ok(())
    }

    /// Lease a message for the duration of `f`, then release it
    ///
    /// The slot is freed once `f` returns, whatever `f` returns.
    pub fn with_message<R>(
        &mut self,
        class: StorageClass,
        index: usize,
        f: impl FnOnce(&StoredMessage) -> R,
    ) -> Result<R, SwitchError> {
        let lease = self.acquire(class, index)?;
        let result = self.read(class, index).map(|message| f(&message));
        self.release(lease)?;
        result
    }
}
