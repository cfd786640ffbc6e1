//! SMS Simulation Library
//!
//! This crate provides the simulated collaborators the SMS switch runs
//! against, so it can be exercised without a modem or a second machine:
//!
//! - **VirtualModem**: Registration state, radio technology and subscriber
//!   number, changeable at runtime
//! - **VirtualPeer**: A remote simulator that submits and receives frames
//!
//! # Example
//!
//! ```rust
//! use sms_protocol::{Modem, Protocol, RegistrationState};
//! use sms_sim::{VirtualModem, VirtualModemConfig, VirtualPeer};
//!
//! let modem = VirtualModem::new(VirtualModemConfig::default());
//! let view = modem.handle();
//! assert!(view.is_registered());
//!
//! modem.set_registration(RegistrationState::Searching);
//! assert!(!view.is_registered());
//!
//! let peer = VirtualPeer::new("+15550002", Protocol::Gsm);
//! let frame = peer.submit_frame("+15550000", "hello").unwrap();
//! println!("Peer frame: {:02X?}", frame.encode());
//! ```

pub mod modem;
pub mod peer;

pub use modem::{ModemHandle, ModemState, VirtualModem, VirtualModemConfig};
pub use peer::{run_virtual_peer_task, PeerError, ReceivedFrame, VirtualPeer, VirtualPeerCommand};
