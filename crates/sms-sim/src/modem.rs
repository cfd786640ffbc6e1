//! Virtual modem state
//!
//! Holds the radio state the switch consults: network registration, the
//! radio access technology in use and the SIM's subscriber number. The state
//! lives in a `watch` channel so that a test or the daemon can change it while
//! the switch actor reads it through a [`ModemHandle`].

use serde::{Deserialize, Serialize};
use sms_protocol::{Modem, RadioTechnology, RegistrationState};
use tokio::sync::watch;
use tracing::info;

/// Snapshot of the simulated radio state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModemState {
    /// Network registration state
    pub registration: RegistrationState,
    /// Radio access technology in use
    pub radio_technology: RadioTechnology,
    /// Subscriber number reported by the SIM (empty if absent)
    pub subscriber_number: String,
}

/// Configuration for creating a virtual modem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualModemConfig {
    /// Initial registration state
    pub registration: RegistrationState,
    /// Initial radio access technology
    pub radio_technology: RadioTechnology,
    /// Subscriber number reported by the SIM
    pub subscriber_number: String,
}

impl Default for VirtualModemConfig {
    fn default() -> Self {
        Self {
            registration: RegistrationState::Home,
            radio_technology: RadioTechnology::Gsm,
            subscriber_number: "+15550000".to_string(),
        }
    }
}

/// A simulated modem whose state can be changed at runtime
#[derive(Debug)]
pub struct VirtualModem {
    state: watch::Sender<ModemState>,
}

impl VirtualModem {
    /// Create a modem from its initial configuration
    pub fn new(config: VirtualModemConfig) -> Self {
        let (state, _) = watch::channel(ModemState {
            registration: config.registration,
            radio_technology: config.radio_technology,
            subscriber_number: config.subscriber_number,
        });
        Self { state }
    }

    /// Read-only view for the switch
    pub fn handle(&self) -> ModemHandle {
        ModemHandle {
            state: self.state.subscribe(),
        }
    }

    /// Current state
    pub fn state(&self) -> ModemState {
        self.state.borrow().clone()
    }

    /// Change the registration state
    pub fn set_registration(&self, registration: RegistrationState) {
        info!("Virtual modem registration: {:?}", registration);
        self.state.send_modify(|s| s.registration = registration);
    }

    /// Change the radio access technology
    pub fn set_radio_technology(&self, technology: RadioTechnology) {
        info!("Virtual modem radio technology: {}", technology.name());
        self.state.send_modify(|s| s.radio_technology = technology);
    }

    /// Change the subscriber number
    pub fn set_subscriber_number(&self, number: impl Into<String>) {
        let number = number.into();
        info!("Virtual modem subscriber number: {}", number);
        self.state.send_modify(|s| s.subscriber_number = number);
    }
}

/// Shared read-only view of a [`VirtualModem`]
#[derive(Debug, Clone)]
pub struct ModemHandle {
    state: watch::Receiver<ModemState>,
}

impl Modem for ModemHandle {
    fn is_registered(&self) -> bool {
        self.state.borrow().registration.is_registered()
    }

    fn radio_technology(&self) -> RadioTechnology {
        self.state.borrow().radio_technology
    }

    fn local_address(&self) -> Option<String> {
        let state = self.state.borrow();
        if state.subscriber_number.is_empty() {
            None
        } else {
            Some(state.subscriber_number.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_online() {
        let modem = VirtualModem::new(VirtualModemConfig::default());
        let handle = modem.handle();
        assert!(handle.is_registered());
        assert_eq!(handle.radio_technology(), RadioTechnology::Gsm);
        assert_eq!(handle.local_address().as_deref(), Some("+15550000"));
    }

    #[test]
    fn test_handle_sees_changes() {
        let modem = VirtualModem::new(VirtualModemConfig::default());
        let handle = modem.handle();

        modem.set_registration(RegistrationState::Denied);
        assert!(!handle.is_registered());

        modem.set_registration(RegistrationState::Roaming);
        assert!(handle.is_registered());

        modem.set_radio_technology(RadioTechnology::Cdma);
        assert_eq!(handle.radio_technology(), RadioTechnology::Cdma);

        modem.set_subscriber_number("");
        assert_eq!(handle.local_address(), None);
        assert_eq!(modem.state().subscriber_number, "");
    }
}
