use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use super::*;
use crate::protocol::pairing::{AuthenticationType, parse_credentials};

#[tokio::test]
async fn test_fake_device_counts_connections() {
    let device = FakeDevice::start().await.unwrap();
    assert!(device.port() > 0);

    let mut stream = TcpStream::connect(device.address()).await.unwrap();
    assert!(device.wait_accepted(1).await);
    stream.write_all(b"hello").await.unwrap();
    assert_eq!(device.closed(), 0);

    drop(stream);
    assert!(device.wait_closed(1).await);
}

#[tokio::test]
async fn test_fake_device_stop_drops_connections() {
    let device = FakeDevice::start().await.unwrap();
    let _stream = TcpStream::connect(device.address()).await.unwrap();
    assert!(device.wait_accepted(1).await);

    device.stop();
    assert!(device.wait_closed(1).await);
}

#[test]
fn test_credential_fixtures() {
    assert_eq!(
        parse_credentials(Some(&hap_credentials())).auth_type(),
        AuthenticationType::Hap
    );
    assert_eq!(
        parse_credentials(Some(&legacy_credentials())).auth_type(),
        AuthenticationType::Legacy
    );
}

#[test]
fn test_airplay_config_fixture() {
    let address = "10.0.0.2:7000".parse().unwrap();
    let config = airplay_config(address, Some(REMOTE_CONTROL_OS_VERSION), None);

    let service = config.get_service(Protocol::AirPlay).unwrap();
    assert_eq!(service.port, 7000);
    assert!(!service.has_credentials());
    assert_eq!(
        service.properties.get(txt_keys::OS_VERSION).map(String::as_str),
        Some(REMOTE_CONTROL_OS_VERSION)
    );
    assert_eq!(config.identifier(), Some("AA:BB:CC:DD:EE:FF"));
}
