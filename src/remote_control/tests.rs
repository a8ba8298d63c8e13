use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use proptest::prelude::*;

use super::*;
use crate::discovery::parser::txt_keys;
use crate::net::ConnectionGateway;
use crate::protocol::pairing::parse_credentials;
use crate::state::{DeviceEvent, StateProducer};
use crate::testing::{
    FakeDevice, MockControlChannel, ScriptedVerifier, VerifyOutcome, hap_credentials,
    init_tracing, legacy_credentials,
};
use crate::types::{MIN_KEEPALIVE_INTERVAL, Protocol};

fn service(os_version: Option<&str>) -> DeviceService {
    let mut properties = HashMap::new();
    if let Some(version) = os_version {
        properties.insert(txt_keys::OS_VERSION.to_string(), version.to_string());
    }
    DeviceService::new(None, Protocol::AirPlay, 7000).with_properties(properties)
}

const KINDS: [AuthenticationType; 4] = [
    AuthenticationType::Null,
    AuthenticationType::Legacy,
    AuthenticationType::Hap,
    AuthenticationType::Transient,
];

#[test]
fn test_eligibility_truth_table() {
    for kind in KINDS {
        assert!(!is_remote_control_eligible(false, kind), "{kind:?}");
    }
    assert!(!is_remote_control_eligible(true, AuthenticationType::Null));
    assert!(!is_remote_control_eligible(true, AuthenticationType::Legacy));
    assert!(is_remote_control_eligible(true, AuthenticationType::Hap));
    assert!(is_remote_control_eligible(true, AuthenticationType::Transient));
}

#[test]
fn test_support_follows_os_version() {
    assert!(!is_supported(&service(None)));
    assert!(!is_supported(&service(Some("12.4"))));
    assert!(!is_supported(&service(Some("garbage"))));
    assert!(is_supported(&service(Some("13.0"))));
    assert!(is_supported(&service(Some("17.2.1"))));
}

#[test]
fn test_bridge_decision() {
    let hap = parse_credentials(Some(&hap_credentials()));
    let legacy = parse_credentials(Some(&legacy_credentials()));

    assert_eq!(
        bridge_decision(&service(Some("12.0")), &hap),
        BridgeDecision::NotSupported
    );
    assert_eq!(
        bridge_decision(&service(Some("15.0")), &legacy),
        BridgeDecision::UnsupportedCredentials(AuthenticationType::Legacy)
    );
    assert_eq!(
        bridge_decision(&service(Some("15.0")), &HapCredentials::none()),
        BridgeDecision::UnsupportedCredentials(AuthenticationType::Null)
    );
    assert_eq!(
        bridge_decision(&service(Some("15.0")), &hap),
        BridgeDecision::Eligible
    );
    assert_eq!(
        bridge_decision(&service(Some("15.0")), &HapCredentials::transient()),
        BridgeDecision::Eligible
    );
}

proptest! {
    #[test]
    fn eligible_only_when_supported_with_usable_credentials(
        supported in any::<bool>(),
        index in 0..KINDS.len(),
    ) {
        let kind = KINDS[index];
        let expected = supported
            && (kind == AuthenticationType::Hap || kind == AuthenticationType::Transient);
        prop_assert_eq!(is_remote_control_eligible(supported, kind), expected);
    }

    #[test]
    fn decision_agrees_with_gate(major in 0u32..30, index in 0..KINDS.len()) {
        let kind = KINDS[index];
        let credentials = match kind {
            AuthenticationType::Null => HapCredentials::none(),
            AuthenticationType::Legacy => parse_credentials(Some(&legacy_credentials())),
            AuthenticationType::Hap => parse_credentials(Some(&hap_credentials())),
            AuthenticationType::Transient => HapCredentials::transient(),
        };
        let service = service(Some(&format!("{major}.1")));
        let eligible = bridge_decision(&service, &credentials) == BridgeDecision::Eligible;
        prop_assert_eq!(eligible, is_remote_control_eligible(major >= 13, kind));
    }
}

struct Fixture {
    device: FakeDevice,
    channel: Arc<MockControlChannel>,
    listener: StateProducer,
    control: Arc<RemoteControl>,
}

async fn fixture(channel: MockControlChannel, outcome: VerifyOutcome) -> Fixture {
    fixture_with_keepalive(channel, outcome, Duration::from_millis(20)).await
}

async fn fixture_with_keepalive(
    channel: MockControlChannel,
    outcome: VerifyOutcome,
    keepalive_interval: Duration,
) -> Fixture {
    init_tracing();
    let device = FakeDevice::start().await.unwrap();
    let channel = Arc::new(channel);
    let listener = StateProducer::default();
    let gateway = ConnectionGateway::new(
        Arc::new(ScriptedVerifier::new(outcome)),
        Duration::from_secs(1),
    );
    let control = Arc::new(RemoteControl::new(
        gateway,
        channel.clone(),
        listener.clone(),
        keepalive_interval,
    ));

    Fixture {
        device,
        channel,
        listener,
        control,
    }
}

async fn start(f: &Fixture) -> Result<(), RemoteControlError> {
    f.control
        .start(
            f.device.address().ip(),
            f.device.port(),
            &parse_credentials(Some(&hap_credentials())),
        )
        .await
}

async fn settle(tasks: crate::interface::PendingTasks) {
    for task in tasks {
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("task did not settle")
            .unwrap();
    }
}

#[tokio::test]
async fn test_start_and_stop() {
    let f = fixture(MockControlChannel::new(), VerifyOutcome::Accept).await;

    start(&f).await.unwrap();
    assert!(f.control.is_active());
    assert_eq!(f.channel.opens(), 1);
    assert!(f.device.wait_accepted(1).await);

    let tasks = f.control.stop();
    assert_eq!(tasks.len(), 2);
    settle(tasks).await;

    assert!(!f.control.is_active());
    assert!(f.control.stop().is_empty());
    assert!(f.device.wait_closed(1).await);
}

#[tokio::test]
async fn test_start_twice_fails() {
    let f = fixture(MockControlChannel::new(), VerifyOutcome::Accept).await;

    start(&f).await.unwrap();
    assert!(matches!(
        start(&f).await,
        Err(RemoteControlError::AlreadyStarted)
    ));

    settle(f.control.stop()).await;
}

#[tokio::test]
async fn test_refused_channel_closes_connection() {
    let f = fixture(MockControlChannel::failing(), VerifyOutcome::Accept).await;

    assert!(matches!(
        start(&f).await,
        Err(RemoteControlError::Setup { .. })
    ));
    assert!(!f.control.is_active());
    assert!(f.control.stop().is_empty());
    assert!(f.device.wait_closed(1).await);
}

#[tokio::test]
async fn test_rejected_verification() {
    let f = fixture(MockControlChannel::new(), VerifyOutcome::Reject).await;

    let err = start(&f).await.unwrap_err();
    assert!(matches!(err, RemoteControlError::Connect(_)));
    assert_eq!(f.channel.opens(), 0);
    assert!(f.device.wait_closed(1).await);
}

#[tokio::test]
async fn test_relay_both_directions() {
    let f = fixture(MockControlChannel::new(), VerifyOutcome::Accept).await;
    let mut incoming = f.control.take_receiver().unwrap();
    assert!(f.control.take_receiver().is_none());

    start(&f).await.unwrap();
    let mut peer = f.channel.take_peer().unwrap();

    f.control.send(Bytes::from_static(b"to device")).unwrap();
    assert_eq!(
        peer.next_from_client().await,
        Some(Bytes::from_static(b"to device"))
    );

    peer.send_to_client(Bytes::from_static(b"to client"))
        .await
        .unwrap();
    assert_eq!(incoming.recv().await, Some(Bytes::from_static(b"to client")));

    settle(f.control.stop()).await;
    assert!(matches!(
        f.control.send(Bytes::from_static(b"late")),
        Err(RemoteControlError::NotStarted)
    ));
}

#[tokio::test]
async fn test_device_closing_stream_reports_loss() {
    let f = fixture(MockControlChannel::new(), VerifyOutcome::Accept).await;
    let mut events = f.listener.subscribe();

    start(&f).await.unwrap();
    drop(f.channel.take_peer());

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        event,
        DeviceEvent::ConnectionLost {
            protocol: Protocol::Mrp,
            ..
        }
    ));
    assert!(!f.control.is_active());

    settle(f.control.stop()).await;
}

#[tokio::test]
async fn test_data_stream_error_reports_loss() {
    let f = fixture(MockControlChannel::new(), VerifyOutcome::Accept).await;
    let mut events = f.listener.subscribe();

    start(&f).await.unwrap();
    let peer = f.channel.take_peer().unwrap();
    peer.to_client
        .unbounded_send(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")))
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, DeviceEvent::ConnectionLost { .. }));

    settle(f.control.stop()).await;
}

#[tokio::test]
async fn test_keepalive_failure_reports_loss() {
    let f = fixture(MockControlChannel::new(), VerifyOutcome::Accept).await;
    let mut events = f.listener.subscribe();

    start(&f).await.unwrap();
    let _peer = f.channel.take_peer();

    tokio::time::sleep(Duration::from_millis(70)).await;
    assert!(f.channel.keepalives() >= 1);
    assert!(f.control.is_active());

    f.channel.fail_keepalives();
    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        event,
        DeviceEvent::ConnectionLost {
            protocol: Protocol::Mrp,
            ..
        }
    ));
    assert!(!f.control.is_active());

    settle(f.control.stop()).await;
    assert!(f.device.wait_closed(1).await);
}

#[tokio::test]
async fn test_restart_after_loss() {
    let f = fixture(MockControlChannel::new(), VerifyOutcome::Accept).await;
    let mut events = f.listener.subscribe();

    start(&f).await.unwrap();
    drop(f.channel.take_peer());
    let _ = tokio::time::timeout(Duration::from_secs(1), events.recv()).await;

    start(&f).await.unwrap();
    assert!(f.control.is_active());
    assert_eq!(f.channel.opens(), 2);

    settle(f.control.stop()).await;
}

#[tokio::test]
async fn test_mrp_connection_reports_close() {
    let f = fixture(MockControlChannel::new(), VerifyOutcome::Accept).await;
    let mut events = f.listener.subscribe();
    let connection = AirPlayMrpConnection::new(f.control.clone(), f.listener.clone());

    assert!(!connection.is_connected());
    assert!(matches!(
        connection.send(Bytes::from_static(b"early")),
        Err(RemoteControlError::NotStarted)
    ));

    start(&f).await.unwrap();
    assert!(connection.is_connected());
    let mut peer = f.channel.take_peer().unwrap();
    connection.send(Bytes::from_static(b"mrp")).unwrap();
    assert_eq!(peer.next_from_client().await, Some(Bytes::from_static(b"mrp")));

    connection.close();
    assert_eq!(
        events.recv().await.unwrap(),
        DeviceEvent::ConnectionClosed {
            protocol: Protocol::Mrp
        }
    );

    settle(f.control.stop()).await;
}

#[tokio::test]
async fn test_stop_with_stalled_device() {
    let f = fixture(MockControlChannel::stalled(), VerifyOutcome::Accept).await;

    start(&f).await.unwrap();
    f.control.send(Bytes::from_static(b"never read")).unwrap();
    // Let the relay pick the frame up and block on the sink
    tokio::time::sleep(Duration::from_millis(20)).await;

    let tasks = f.control.stop();
    assert_eq!(tasks.len(), 2);
    settle(tasks).await;
    assert!(f.device.wait_closed(1).await);
}

#[tokio::test]
async fn test_stalled_device_is_not_reported_lost_on_stop() {
    let f = fixture(MockControlChannel::stalled(), VerifyOutcome::Accept).await;
    let mut events = f.listener.subscribe();

    start(&f).await.unwrap();
    f.control.send(Bytes::from_static(b"never read")).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    settle(f.control.stop()).await;

    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_zero_keepalive_interval_is_raised() {
    let f = fixture_with_keepalive(
        MockControlChannel::new(),
        VerifyOutcome::Accept,
        Duration::ZERO,
    )
    .await;
    assert!(format!("{:?}", f.control).contains(&format!("{MIN_KEEPALIVE_INTERVAL:?}")));

    start(&f).await.unwrap();
    let _peer = f.channel.take_peer();
    tokio::time::sleep(MIN_KEEPALIVE_INTERVAL * 5).await;
    assert!(f.control.is_active());
    assert!(f.channel.keepalives() >= 1);

    settle(f.control.stop()).await;
}
