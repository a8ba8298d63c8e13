//! Test doubles for the collaborators this crate drives

mod fake_device;
mod mocks;

#[cfg(test)]
mod tests;

pub use fake_device::FakeDevice;
pub use mocks::{
    ChannelPeer, CountingServerFactory, HandlerStats, MockControlChannel, MockPairSetup,
    MockPlayer, MockProtocolHandler, MockSecondaryFactory, PlayBehaviour, PlayCall,
    SERVED_URL, ScriptedVerifier, SecondaryCall, ServerStats, VerifyOutcome,
};

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::discovery::parser::txt_keys;
use crate::types::{DeviceConfig, DeviceService, Protocol};

/// `osvers` of a device with a remote control channel
pub const REMOTE_CONTROL_OS_VERSION: &str = "13.4.1";

/// Install a tracing subscriber writing to the test output
#[cfg(test)]
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Device configuration with one `AirPlay` service at `address`
///
/// `osvers` is set when given, and so are the credentials.
#[must_use]
pub fn airplay_config(
    address: SocketAddr,
    os_version: Option<&str>,
    credentials: Option<&str>,
) -> DeviceConfig {
    let mut properties = HashMap::new();
    properties.insert(txt_keys::DEVICE_ID.to_string(), "AA:BB:CC:DD:EE:FF".to_string());
    if let Some(version) = os_version {
        properties.insert(txt_keys::OS_VERSION.to_string(), version.to_string());
    }

    let mut service = DeviceService::new(
        Some("AA:BB:CC:DD:EE:FF".to_string()),
        Protocol::AirPlay,
        address.port(),
    )
    .with_properties(properties);
    if let Some(credentials) = credentials {
        service = service.with_credentials(credentials);
    }

    let mut config = DeviceConfig::new(address.ip(), "Test Device");
    config.add_service(service);
    config
}

/// HAP credentials in storage format
#[must_use]
pub fn hap_credentials() -> String {
    format!(
        "{}:{}:{}:{}",
        hex::encode([1u8; 32]),
        hex::encode([2u8; 32]),
        hex::encode(b"device-id"),
        hex::encode(b"client-id")
    )
}

/// Legacy credentials in storage format
#[must_use]
pub fn legacy_credentials() -> String {
    format!("{}:{}", hex::encode(b"client-id"), hex::encode([3u8; 32]))
}
