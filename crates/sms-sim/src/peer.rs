//! Virtual remote simulator
//!
//! A [`VirtualPeer`] stands in for another simulator instance connected to
//! the switch: it builds submission frames stamped with its own number and
//! decodes the frames it receives. [`run_virtual_peer_task`] drives one over
//! an async stream, the same way a real remote simulator would talk over TCP.

use std::io;

use sms_protocol::{
    Frame, FrameError, PduCodec, PduError, Protocol, SimPduCodec, SmsPdu, MAX_FRAME_SIZE,
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Errors building or reading a virtual peer frame
#[derive(Debug, Error)]
pub enum PeerError {
    /// The frame could not be built or decoded
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The PDU could not be encoded
    #[error("PDU error: {0}")]
    Pdu(#[from] PduError),
}

/// A frame received by a virtual peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    /// Origin address in the frame header
    pub origin: String,
    /// Destination address in the frame header
    pub destination: String,
    /// Protocol of the payload
    pub protocol: Protocol,
    /// Raw payload
    pub payload: Vec<u8>,
    /// Decoded PDU, if the payload could be decoded
    pub pdu: Option<SmsPdu>,
}

/// A simulated remote device
#[derive(Debug, Clone)]
pub struct VirtualPeer {
    number: String,
    protocol: Protocol,
    codec: SimPduCodec,
}

impl VirtualPeer {
    /// Create a peer with its own subscriber number
    pub fn new(number: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            number: number.into(),
            protocol,
            codec: SimPduCodec::new(),
        }
    }

    /// Own subscriber number
    pub fn number(&self) -> &str {
        &self.number
    }

    /// Protocol used for outgoing messages
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Build the frame for a text submission to `destination`
    pub fn submit_frame(&self, destination: &str, text: &str) -> Result<Frame, PeerError> {
        let pdu = self
            .codec
            .encode(self.protocol, &SmsPdu::submit_text(destination, text))?;
        Ok(Frame::new(self.number.as_str(), "", self.protocol, pdu)?)
    }

    /// Decode one received frame
    pub fn receive(&self, data: &[u8]) -> Result<ReceivedFrame, PeerError> {
        let frame = Frame::decode(data)?;
        let pdu = match self.codec.decode(frame.protocol(), frame.payload()) {
            Ok(pdu) => Some(pdu),
            Err(e) => {
                debug!("Virtual peer {} could not decode PDU: {}", self.number, e);
                None
            }
        };

        Ok(ReceivedFrame {
            origin: frame.origin().to_string(),
            destination: frame.destination().to_string(),
            protocol: frame.protocol(),
            pdu,
            payload: frame.into_payload(),
        })
    }
}

/// Commands that can be sent to a virtual peer task
#[derive(Debug, Clone)]
pub enum VirtualPeerCommand {
    /// Submit a text message
    SendText {
        /// Destination number encoded in the PDU
        destination: String,
        /// Message text
        text: String,
    },
    /// Write raw bytes to the stream, bypassing framing
    SendRaw(Vec<u8>),
    /// Shutdown the virtual peer task
    Shutdown,
}

/// Run a virtual peer over `stream`
///
/// Frames read from the stream are decoded and published on `frame_tx`.
/// Frames that fail to decode are logged and skipped. The task ends when the
/// stream closes, a shutdown is requested or the command channel closes.
pub async fn run_virtual_peer_task<S>(
    mut stream: S,
    peer: VirtualPeer,
    mut cmd_rx: mpsc::Receiver<VirtualPeerCommand>,
    frame_tx: broadcast::Sender<ReceivedFrame>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; MAX_FRAME_SIZE];

    info!(
        "Starting virtual peer task for {} ({})",
        peer.number(),
        peer.protocol().name()
    );

    loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Virtual peer stream closed for {}", peer.number());
                        break;
                    }
                    Ok(n) => match peer.receive(&buf[..n]) {
                        Ok(frame) => {
                            debug!(
                                "Virtual peer {} received frame from {} ({} bytes)",
                                peer.number(), frame.origin, frame.payload.len()
                            );
                            let _ = frame_tx.send(frame);
                        }
                        Err(e) => warn!("Virtual peer {} dropped {} bytes: {}", peer.number(), n, e),
                    },
                    Err(e) => {
                        warn!("Virtual peer {} stream error: {}", peer.number(), e);
                        return Err(e);
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(VirtualPeerCommand::SendText { destination, text }) => {
                        match peer.submit_frame(&destination, &text) {
                            Ok(frame) => {
                                stream.write_all(&frame.encode()).await?;
                                stream.flush().await?;
                            }
                            Err(e) => warn!("Virtual peer {} cannot send: {}", peer.number(), e),
                        }
                    }
                    Some(VirtualPeerCommand::SendRaw(data)) => {
                        stream.write_all(&data).await?;
                        stream.flush().await?;
                    }
                    Some(VirtualPeerCommand::Shutdown) | None => {
                        info!("Shutdown requested for virtual peer {}", peer.number());
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use sms_protocol::MessageType;
    use tokio::io::duplex;

    use super::*;

    #[test]
    fn test_submit_frame() {
        let peer = VirtualPeer::new("+15550002", Protocol::Gsm);
        let frame = peer.submit_frame("+15550001", "hi").unwrap();

        assert_eq!(frame.origin(), "+15550002");
        assert_eq!(frame.destination(), "");

        let received = peer.receive(&frame.encode()).unwrap();
        let pdu = received.pdu.unwrap();
        assert_eq!(pdu.message_type, MessageType::Submit);
        assert_eq!(pdu.address, "+15550001");
    }

    #[test]
    fn test_receive_undecodable_payload() {
        let peer = VirtualPeer::new("+15550002", Protocol::Gsm);
        let frame = Frame::new("+1", "", Protocol::Gsm, vec![0xFF]).unwrap();

        let received = peer.receive(&frame.encode()).unwrap();
        assert_eq!(received.payload, vec![0xFF]);
        assert!(received.pdu.is_none());
    }

    #[tokio::test]
    async fn test_task_sends_and_receives() {
        let (peer_io, mut other) = duplex(4096);
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let (frame_tx, mut frame_rx) = broadcast::channel(4);
        let peer = VirtualPeer::new("+15550002", Protocol::Gsm);
        let task = tokio::spawn(run_virtual_peer_task(peer_io, peer, cmd_rx, frame_tx));

        cmd_tx
            .send(VirtualPeerCommand::SendText {
                destination: "+15550001".into(),
                text: "ping".into(),
            })
            .await
            .unwrap();
        let mut buf = vec![0u8; MAX_FRAME_SIZE];
        let n = other.read(&mut buf).await.unwrap();
        let sent = Frame::decode(&buf[..n]).unwrap();
        assert_eq!(sent.origin(), "+15550002");

        let reply = Frame::new("+15550001", "", Protocol::Gsm, vec![1]).unwrap();
        other.write_all(&reply.encode()).await.unwrap();
        let received = frame_rx.recv().await.unwrap();
        assert_eq!(received.origin, "+15550001");

        cmd_tx.send(VirtualPeerCommand::Shutdown).await.unwrap();
        task.await.unwrap().unwrap();
    }
}
