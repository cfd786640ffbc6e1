//! Cell broadcast selector registry
//!
//! Two bounded lists of selectors decide which broadcast channels the device
//! listens to: 3GPP message identifier ranges and CDMA service categories.
//! Lists keep insertion order and stay gap-free when an entry is removed.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sms_protocol::Protocol;
use tracing::debug;

use crate::error::SwitchError;

/// An entry that can be held in a [`SelectorList`]
pub trait BroadcastSelector: Clone {
    /// Fields that identify the entry for duplicate checks and removal
    type Key: PartialEq + Copy;

    /// Identity of this entry
    fn key(&self) -> Self::Key;
}

/// 3GPP cell broadcast message identifier range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastRange {
    /// First message identifier
    pub from_id: u16,
    /// Last message identifier
    pub to_id: u16,
    /// Whether the range is selected
    pub selected: bool,
}

impl BroadcastRange {
    /// A selected range
    pub fn new(from_id: u16, to_id: u16) -> Self {
        Self {
            from_id,
            to_id,
            selected: true,
        }
    }
}

impl BroadcastSelector for BroadcastRange {
    type Key = (u16, u16);

    fn key(&self) -> Self::Key {
        (self.from_id, self.to_id)
    }
}

/// CDMA broadcast service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastService {
    /// Service category
    pub category: u16,
    /// Language indicator
    pub language: u16,
    /// Whether the service is selected
    pub selected: bool,
}

impl BroadcastService {
    /// A selected service
    pub fn new(category: u16, language: u16) -> Self {
        Self {
            category,
            language,
            selected: true,
        }
    }
}

impl BroadcastSelector for BroadcastService {
    type Key = (u16, u16);

    fn key(&self) -> Self::Key {
        (self.category, self.language)
    }
}

/// Bounded, insertion-ordered list of selectors
#[derive(Debug, Clone)]
pub struct SelectorList<E> {
    entries: Vec<E>,
    capacity: usize,
}

impl<E: BroadcastSelector> SelectorList<E> {
    /// Create an empty list holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry
    pub fn add(&mut self, entry: E) -> Result<(), SwitchError> {
        if self.entries.len() >= self.capacity {
            return Err(SwitchError::Full {
                capacity: self.capacity,
            });
        }
        let key = entry.key();
        if self.entries.iter().any(|e| e.key() == key) {
            return Err(SwitchError::Duplicate);
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Remove the entry with `key`, shifting later entries down
    pub fn remove(&mut self, key: E::Key) -> Result<E, SwitchError> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.key() == key)
            .ok_or(SwitchError::NotFound)?;
        Ok(self.entries.remove(pos))
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[E] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Range and service lists plus per-protocol activation
#[derive(Debug, Clone)]
pub struct CellBroadcastRegistry {
    ranges: SelectorList<BroadcastRange>,
    services: SelectorList<BroadcastService>,
    active: HashSet<Protocol>,
}

impl CellBroadcastRegistry {
    /// Create a registry whose lists hold `capacity` entries each
    pub fn new(capacity: usize) -> Self {
        Self {
            ranges: SelectorList::new(capacity),
            services: SelectorList::new(capacity),
            active: HashSet::new(),
        }
    }

    /// 3GPP message identifier ranges
    pub fn ranges(&self) -> &SelectorList<BroadcastRange> {
        &self.ranges
    }

    /// Mutable access to the 3GPP ranges
    pub fn ranges_mut(&mut self) -> &mut SelectorList<BroadcastRange> {
        &mut self.ranges
    }

    /// CDMA services
    pub fn services(&self) -> &SelectorList<BroadcastService> {
        &self.services
    }

    /// Mutable access to the CDMA services
    pub fn services_mut(&mut self) -> &mut SelectorList<BroadcastService> {
        &mut self.services
    }

    /// Start listening to cell broadcast for a protocol
    pub fn activate(&mut self, protocol: Protocol) {
        if self.active.insert(protocol) {
            debug!("Cell broadcast activated for {}", protocol.name());
        }
    }

    /// Stop listening to cell broadcast for a protocol
    pub fn deactivate(&mut self, protocol: Protocol) {
        if self.active.remove(&protocol) {
            debug!("Cell broadcast deactivated for {}", protocol.name());
        }
    }

    /// Whether cell broadcast is active for a protocol
    pub fn is_active(&self, protocol: Protocol) -> bool {
        self.active.contains(&protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_compacts() {
        let mut list = SelectorList::new(50);
        list.add(BroadcastRange::new(1, 10)).unwrap();
        list.add(BroadcastRange::new(20, 30)).unwrap();
        list.add(BroadcastRange::new(40, 50)).unwrap();

        let removed = list.remove((20, 30)).unwrap();
        assert_eq!(removed, BroadcastRange::new(20, 30));
        assert_eq!(
            list.entries(),
            &[BroadcastRange::new(1, 10), BroadcastRange::new(40, 50)]
        );
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_remove_missing_leaves_list_unchanged() {
        let mut list = SelectorList::new(50);
        list.add(BroadcastService::new(1, 1)).unwrap();
        list.add(BroadcastService::new(2, 1)).unwrap();
        let before = list.entries().to_vec();

        assert!(matches!(list.remove((3, 1)), Err(SwitchError::NotFound)));
        assert_eq!(list.entries(), before.as_slice());
    }

    #[test]
    fn test_duplicate_is_rejected_by_key() {
        let mut list = SelectorList::new(50);
        list.add(BroadcastRange::new(5, 6)).unwrap();

        let mut unselected = BroadcastRange::new(5, 6);
        unselected.selected = false;
        assert!(matches!(list.add(unselected), Err(SwitchError::Duplicate)));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_capacity() {
        let mut list = SelectorList::new(50);
        for id in 0..50u16 {
            list.add(BroadcastRange::new(id, id)).unwrap();
        }
        assert!(matches!(
            list.add(BroadcastRange::new(100, 100)),
            Err(SwitchError::Full { capacity: 50 })
        ));

        // Removing makes room again
        list.remove((0, 0)).unwrap();
        list.add(BroadcastRange::new(100, 100)).unwrap();
        assert_eq!(list.entries().last(), Some(&BroadcastRange::new(100, 100)));
    }

    #[test]
    fn test_clear() {
        let mut list = SelectorList::new(2);
        list.add(BroadcastService::new(1, 0)).unwrap();
        list.clear();
        assert!(list.is_empty());
        list.add(BroadcastService::new(1, 0)).unwrap();
    }

    #[test]
    fn test_activation_per_protocol() {
        let mut registry = CellBroadcastRegistry::new(50);
        assert!(!registry.is_active(Protocol::Gsm));

        registry.activate(Protocol::Gsm);
        assert!(registry.is_active(Protocol::Gsm));
        assert!(!registry.is_active(Protocol::Cdma));

        registry.deactivate(Protocol::Gsm);
        assert!(!registry.is_active(Protocol::Gsm));
    }

    #[test]
    fn test_lists_are_independent() {
        let mut registry = CellBroadcastRegistry::new(50);
        registry.ranges_mut().add(BroadcastRange::new(1, 2)).unwrap();
        registry.services_mut().add(BroadcastService::new(1, 2)).unwrap();

        registry.ranges_mut().clear();
        assert!(registry.ranges().is_empty());
        assert_eq!(registry.services().len(), 1);
    }
}
