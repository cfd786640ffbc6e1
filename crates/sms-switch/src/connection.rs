//! Async peer connection task
//!
//! Each accepted peer runs in its own spawned task. The task performs one
//! read per readiness event and forwards the bytes to the switch actor as-is;
//! framing is checked by the actor. Frames the actor broadcasts arrive on a
//! bounded queue and are written out in order.
//!
//! The task ends when the peer closes, an I/O error occurs, or the actor
//! drops the peer's outbound queue (for example after a protocol violation).
//!
//! Generic over the I/O type so tests can use `DuplexStream` from
//! `tokio::io::duplex()` in place of a TCP stream.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sms_protocol::MAX_FRAME_SIZE;

use crate::actor::SwitchHandle;
use crate::error::SwitchError;
use crate::peers::PeerHandle;

/// Connection to one remote simulator
pub struct PeerConnection<T> {
    handle: PeerHandle,
    label: String,
    io: T,
    switch: SwitchHandle,
}

impl<T> PeerConnection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create a connection for a peer already registered with the switch
    pub fn new(handle: PeerHandle, label: String, io: T, switch: SwitchHandle) -> Self {
        Self {
            handle,
            label,
            io,
            switch,
        }
    }

    /// Main loop - runs until the peer closes, I/O fails, or the switch
    /// drops the outbound queue
    pub async fn run(self, mut outbound_rx: mpsc::Receiver<Vec<u8>>) {
        let Self {
            handle,
            label,
            io,
            switch,
        } = self;
        let (mut reader, mut writer) = tokio::io::split(io);
        let mut buffer = vec![0u8; MAX_FRAME_SIZE];

        info!("Starting read loop for peer {} ({})", handle.0, label);

        loop {
            tokio::select! {
                frame = outbound_rx.recv() => {
                    let Some(frame) = frame else {
                        debug!("Switch closed peer {}", handle.0);
                        break;
                    };
                    let written = async {
                        writer.write_all(&frame).await?;
                        writer.flush().await
                    }
                    .await;
                    if let Err(e) = written {
                        warn!("Error while sending frame to peer {}: {}", handle.0, e);
                        let _ = switch.peer_error(handle, format!("Write error: {}", e)).await;
                        break;
                    }
                    debug!("Wrote {} bytes to peer {}", frame.len(), handle.0);
                }

                result = reader.read(&mut buffer) => {
                    match result {
                        Ok(0) => {
                            let _ = switch.peer_closed(handle).await;
                            break;
                        }
                        Ok(n) => {
                            debug!("Read {} bytes from peer {}", n, handle.0);
                            if switch.peer_data(handle, buffer[..n].to_vec()).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Read error on peer {}: {}", handle.0, e);
                            let _ = switch.peer_error(handle, format!("Read error: {}", e)).await;
                            break;
                        }
                    }
                }
            }
        }

        let _ = writer.shutdown().await;
        info!("Read loop ended for peer {} ({})", handle.0, label);
    }
}

/// Register a stream with the switch and spawn its connection task
///
/// Returns `Ok(None)` when the switch refuses the peer because it is at its
/// connection limit; the stream is dropped, closing it.
pub async fn attach<T>(
    switch: &SwitchHandle,
    label: String,
    io: T,
    queue_depth: usize,
) -> Result<Option<PeerHandle>, SwitchError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (outbound_tx, outbound_rx) = mpsc::channel(queue_depth.max(1));
    let Some(handle) = switch.register_peer(label.clone(), outbound_tx).await? else {
        return Ok(None);
    };

    let connection = PeerConnection::new(handle, label, io, switch.clone());
    tokio::spawn(connection.run(outbound_rx));
    Ok(Some(handle))
}

#[cfg(test)]
mod tests {
    use sms_protocol::{Frame, PduCodec, Protocol, SimPduCodec, SmsPdu};
    use sms_sim::{VirtualModem, VirtualModemConfig};
    use tokio::io::duplex;

    use super::*;
    use crate::actor::spawn_switch;
    use crate::config::SwitchConfig;
    use crate::engine::SmsSimulator;
    use crate::events::SwitchEvent;
    use crate::storage::{MessageStatus, StorageClass};

    fn start() -> (SwitchHandle, VirtualModem) {
        let modem = VirtualModem::new(VirtualModemConfig {
            subscriber_number: "+15550001".into(),
            ..Default::default()
        });
        let simulator =
            SmsSimulator::new(SwitchConfig::default(), modem.handle(), SimPduCodec::new());
        let (switch, _task) = spawn_switch(simulator);
        (switch, modem)
    }

    #[tokio::test]
    async fn test_inbound_frame_is_stored() {
        let (switch, _modem) = start();
        let mut new_messages = switch.subscribe_new_messages().await.unwrap();
        let (local, mut remote) = duplex(4096);
        attach(&switch, "duplex".into(), local, 8).await.unwrap().unwrap();

        let frame = Frame::new("+15550002", "", Protocol::Gsm, vec![9, 8, 7]).unwrap();
        remote.write_all(&frame.encode()).await.unwrap();

        let indication = new_messages.recv().await.unwrap();
        let stored = switch
            .read_message(indication.class, indication.index)
            .await
            .unwrap();
        assert_eq!(stored.pdu, vec![9, 8, 7]);
        assert_eq!(stored.status, MessageStatus::Unread);
    }

    #[tokio::test]
    async fn test_outbound_frame_reaches_peer() {
        let (switch, _modem) = start();
        let (local, mut remote) = duplex(4096);
        attach(&switch, "duplex".into(), local, 8).await.unwrap().unwrap();

        let pdu = SimPduCodec::new()
            .encode(Protocol::Gsm, &SmsPdu::submit_text("+15550002", "hi"))
            .unwrap();
        switch.send(Protocol::Gsm, pdu.clone()).await.unwrap();

        let mut buf = vec![0u8; MAX_FRAME_SIZE];
        let n = remote.read(&mut buf).await.unwrap();
        let frame = Frame::decode(&buf[..n]).unwrap();
        assert_eq!(frame.origin(), "+15550001");
        assert_eq!(frame.payload(), pdu.as_slice());
    }

    #[tokio::test]
    async fn test_short_frame_disconnects_peer() {
        let (switch, _modem) = start();
        let mut events = switch.subscribe_events();
        let (local, mut remote) = duplex(4096);
        let handle = attach(&switch, "duplex".into(), local, 8).await.unwrap().unwrap();

        let bytes = Frame::new("+15550002", "", Protocol::Gsm, vec![1, 2, 3])
            .unwrap()
            .encode();
        remote.write_all(&bytes[..bytes.len() - 1]).await.unwrap();

        // The connection task shuts the stream once the switch drops the peer
        let mut buf = [0u8; 16];
        assert_eq!(remote.read(&mut buf).await.unwrap(), 0);
        assert_eq!(
            switch
                .count_messages(StorageClass::Sim, MessageStatus::Unread)
                .await
                .unwrap(),
            0
        );

        loop {
            match events.recv().await.unwrap() {
                SwitchEvent::ProtocolViolation { handle: h, .. } => {
                    assert_eq!(h, handle);
                    break;
                }
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let (switch, _modem) = start();
        let (first, _first_remote) = duplex(64);
        assert!(attach(&switch, "a".into(), first, 8).await.unwrap().is_some());

        let (second, mut second_remote) = duplex(64);
        assert!(attach(&switch, "b".into(), second, 8).await.unwrap().is_none());

        // Rejected stream was dropped
        let mut buf = [0u8; 4];
        assert_eq!(second_remote.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_peer_close_frees_slot() {
        let (switch, _modem) = start();
        let mut events = switch.subscribe_events();
        let (local, remote) = duplex(64);
        let handle = attach(&switch, "a".into(), local, 8).await.unwrap().unwrap();
        drop(remote);

        loop {
            if let SwitchEvent::PeerDisconnected { handle: h } = events.recv().await.unwrap() {
                assert_eq!(h, handle);
                break;
            }
        }

        let (again, _remote) = duplex(64);
        assert!(attach(&switch, "b".into(), again, 8).await.unwrap().is_some());
    }
}
