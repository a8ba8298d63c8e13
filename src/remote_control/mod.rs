//! Remote control channel
//!
//! Devices running a recent enough OS accept a second, verified connection
//! on the `AirPlay` port carrying a bidirectional data stream. MRP messages
//! are tunneled through it, so MRP works without its own service endpoint.

mod channel;
mod error;
mod mrp_connection;

#[cfg(test)]
mod tests;

pub use channel::{ControlChannelProtocol, DataChannel, RemoteControl};
pub use error::RemoteControlError;
pub use mrp_connection::AirPlayMrpConnection;

use crate::discovery::parser::{parse_os_major_version, txt_keys};
use crate::protocol::pairing::{AuthenticationType, HapCredentials};
use crate::types::DeviceService;

/// First major OS version with a remote control channel
pub const MIN_REMOTE_CONTROL_OS_VERSION: u32 = 13;

/// Whether the advertised OS version supports the remote control channel
#[must_use]
pub fn is_supported(service: &DeviceService) -> bool {
    service
        .properties
        .get(txt_keys::OS_VERSION)
        .and_then(|version| parse_os_major_version(version))
        .is_some_and(|major| major >= MIN_REMOTE_CONTROL_OS_VERSION)
}

/// Whether the remote control channel can be opened
///
/// Needs device support and credentials that can encrypt the channel.
#[must_use]
pub fn is_remote_control_eligible(supported: bool, kind: AuthenticationType) -> bool {
    supported && matches!(kind, AuthenticationType::Hap | AuthenticationType::Transient)
}

/// Outcome of the remote control eligibility check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeDecision {
    /// The device does not offer the channel
    NotSupported,
    /// Credentials of this kind cannot open the channel
    UnsupportedCredentials(AuthenticationType),
    /// The channel can be bridged
    Eligible,
}

/// Decide whether MRP should be tunneled over `service`
#[must_use]
pub fn bridge_decision(service: &DeviceService, credentials: &HapCredentials) -> BridgeDecision {
    let supported = is_supported(service);
    let kind = credentials.auth_type();

    if is_remote_control_eligible(supported, kind) {
        BridgeDecision::Eligible
    } else if !supported {
        BridgeDecision::NotSupported
    } else {
        BridgeDecision::UnsupportedCredentials(kind)
    }
}
