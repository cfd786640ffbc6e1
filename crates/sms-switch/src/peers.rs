//! Connected peer table
//!
//! The table only records where outbound frames for each peer go. Reading
//! from the peer's socket happens in its connection task, which forwards the
//! bytes to the switch actor.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::error::SwitchError;

/// Unique identifier for a connected peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerHandle(pub u32);

impl PeerHandle {
    /// Get the raw handle value
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

#[derive(Debug)]
struct Peer {
    handle: PeerHandle,
    label: String,
    outbound: mpsc::Sender<Vec<u8>>,
}

/// Outcome of broadcasting one frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Peers the frame was queued for
    pub delivered: Vec<PeerHandle>,
    /// Peers whose queue was full or closed
    pub failed: Vec<PeerHandle>,
}

/// Bounded set of live peer connections
#[derive(Debug)]
pub struct PeerTable {
    slots: Vec<Option<Peer>>,
    next_handle: u32,
}

impl PeerTable {
    /// Create a table accepting at most `max_connections` peers
    pub fn new(max_connections: usize) -> Self {
        Self {
            slots: (0..max_connections).map(|_| None).collect(),
            next_handle: 1,
        }
    }

    /// Register a new peer
    ///
    /// Fails with [`SwitchError::ConnectionRejected`] when every slot is taken;
    /// no record is created in that case.
    pub fn accept(
        &mut self,
        label: String,
        outbound: mpsc::Sender<Vec<u8>>,
    ) -> Result<PeerHandle, SwitchError> {
        let max = self.slots.len();
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(SwitchError::ConnectionRejected { max })?;

        let handle = PeerHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);

        info!("Peer {} connected (handle {})", label, handle.0);
        *slot = Some(Peer {
            handle,
            label,
            outbound,
        });
        Ok(handle)
    }

    /// Remove a peer, returning whether it was connected
    ///
    /// Dropping the outbound sender ends the peer's connection task. Closing
    /// an unknown or already closed handle is a no-op.
    pub fn close(&mut self, handle: PeerHandle) -> bool {
        for slot in self.slots.iter_mut() {
            if slot.as_ref().is_some_and(|p| p.handle == handle) {
                if let Some(peer) = slot.take() {
                    info!("Peer {} closed (handle {})", peer.label, handle.0);
                }
                return true;
            }
        }
        false
    }

    /// Whether a peer is connected
    pub fn contains(&self, handle: PeerHandle) -> bool {
        self.peers().any(|p| p.handle == handle)
    }

    /// Label a peer was registered with
    pub fn label(&self, handle: PeerHandle) -> Option<&str> {
        self.peers()
            .find(|p| p.handle == handle)
            .map(|p| p.label.as_str())
    }

    /// Handles of every connected peer
    pub fn handles(&self) -> Vec<PeerHandle> {
        self.peers().map(|p| p.handle).collect()
    }

    /// Number of connected peers
    pub fn len(&self) -> usize {
        self.peers().count()
    }

    /// Whether no peer is connected
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether another peer can be accepted
    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Queue a frame for every connected peer
    ///
    /// A peer whose queue is full or whose task has gone away is skipped and
    /// logged; the frame still goes to everyone else. Nothing is retried.
    pub fn broadcast(&self, frame: &[u8]) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for peer in self.peers() {
            match peer.outbound.try_send(frame.to_vec()) {
                Ok(()) => {
                    debug!("Queued {} bytes for peer {}", frame.len(), peer.label);
                    report.delivered.push(peer.handle);
                }
                Err(TrySendError::Full(_)) => {
                    warn!("Send to peer {} failed: queue full", peer.label);
                    report.failed.push(peer.handle);
                }
                Err(TrySendError::Closed(_)) => {
                    warn!("Send to peer {} failed: connection gone", peer.label);
                    report.failed.push(peer.handle);
                }
            }
        }

        report
    }

    fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.slots.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_up_to_limit() {
        let mut table = PeerTable::new(1);
        let (tx, _rx) = mpsc::channel(4);
        let handle = table.accept("a".into(), tx).unwrap();
        assert!(table.contains(handle));
        assert!(table.is_full());

        let (tx2, _rx2) = mpsc::channel(4);
        assert!(matches!(
            table.accept("b".into(), tx2),
            Err(SwitchError::ConnectionRejected { max: 1 })
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut table = PeerTable::new(2);
        let (tx, _rx) = mpsc::channel(4);
        let handle = table.accept("a".into(), tx).unwrap();

        assert!(table.close(handle));
        assert!(!table.close(handle));
        assert!(table.is_empty());
    }

    #[test]
    fn test_close_frees_slot_for_new_handle() {
        let mut table = PeerTable::new(1);
        let (tx, _rx) = mpsc::channel(4);
        let first = table.accept("a".into(), tx).unwrap();
        table.close(first);

        let (tx, _rx) = mpsc::channel(4);
        let second = table.accept("b".into(), tx).unwrap();
        assert_ne!(first, second);
        assert_eq!(table.label(second), Some("b"));
    }

    #[test]
    fn test_broadcast_skips_failed_peer() {
        let mut table = PeerTable::new(3);
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, rx_b) = mpsc::channel(4);
        let (tx_c, mut rx_c) = mpsc::channel(4);
        let a = table.accept("a".into(), tx_a).unwrap();
        let b = table.accept("b".into(), tx_b).unwrap();
        let c = table.accept("c".into(), tx_c).unwrap();

        drop(rx_b);
        let report = table.broadcast(&[1, 2, 3]);

        assert_eq!(report.delivered, vec![a, c]);
        assert_eq!(report.failed, vec![b]);
        assert_eq!(rx_a.try_recv().unwrap(), vec![1, 2, 3]);
        assert_eq!(rx_c.try_recv().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_broadcast_full_queue() {
        let mut table = PeerTable::new(1);
        let (tx, mut rx) = mpsc::channel(1);
        let handle = table.accept("slow".into(), tx).unwrap();

        assert_eq!(table.broadcast(&[1]).delivered, vec![handle]);
        assert_eq!(table.broadcast(&[2]).failed, vec![handle]);
        assert_eq!(rx.try_recv().unwrap(), vec![1]);
    }
}
