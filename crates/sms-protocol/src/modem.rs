//! Radio state consulted by the switching engine
//!
//! The engine only needs three answers from the simulated modem: whether it
//! is registered on a network, which radio access technology is in use, and
//! the device's own subscriber number.

/// Network registration state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegistrationState {
    /// Not registered and not searching
    #[default]
    None,
    /// Registered on the home network
    Home,
    /// Searching for a network
    Searching,
    /// Registration denied by the network
    Denied,
    /// Registered on a roaming network
    Roaming,
    /// State could not be determined
    Unknown,
}

impl RegistrationState {
    /// Whether messages can be sent and received in this state
    pub fn is_registered(&self) -> bool {
        matches!(self, RegistrationState::Home | RegistrationState::Roaming)
    }
}

/// Radio access technology in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RadioTechnology {
    /// Unknown or no service
    Unknown,
    /// GSM
    #[default]
    Gsm,
    /// UMTS
    Umts,
    /// TD-SCDMA
    TdScdma,
    /// LTE
    Lte,
    /// CDMA
    Cdma,
}

impl RadioTechnology {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            RadioTechnology::Unknown => "Unknown",
            RadioTechnology::Gsm => "GSM",
            RadioTechnology::Umts => "UMTS",
            RadioTechnology::TdScdma => "TD-SCDMA",
            RadioTechnology::Lte => "LTE",
            RadioTechnology::Cdma => "CDMA",
        }
    }
}

/// Read-only view of the simulated modem
pub trait Modem: Send {
    /// Whether the device is registered (home or roaming)
    fn is_registered(&self) -> bool;

    /// Radio access technology currently in use
    fn radio_technology(&self) -> RadioTechnology;

    /// Own subscriber number, if the SIM provides one
    fn local_address(&self) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_home_and_roaming_are_registered() {
        assert!(RegistrationState::Home.is_registered());
        assert!(RegistrationState::Roaming.is_registered());

        for state in [
            RegistrationState::None,
            RegistrationState::Searching,
            RegistrationState::Denied,
            RegistrationState::Unknown,
        ] {
            assert!(!state.is_registered(), "{:?} should not be registered", state);
        }
    }
}
