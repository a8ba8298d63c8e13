use std::sync::Arc;
use std::time::Duration;

use airplay_frontend::interface::Interfaces;
use airplay_frontend::protocol::{AirPlayProtocol, ClientSessionManager, SetupData};
use airplay_frontend::state::{DeviceEvent, StateProducer};
use airplay_frontend::testing::{
    CountingServerFactory, FakeDevice, MockControlChannel, MockPlayer, MockSecondaryFactory,
    PlayBehaviour, REMOTE_CONTROL_OS_VERSION, SERVED_URL, ScriptedVerifier, airplay_config,
    hap_credentials,
};
use airplay_frontend::types::{DeviceConfig, FeatureName, Protocol};
use airplay_frontend::{AirPlayConfig, PendingTasks, PlayOptions};
use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::time::timeout;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

struct Harness {
    device: FakeDevice,
    channel: Arc<MockControlChannel>,
    factory: Arc<MockSecondaryFactory>,
    player: Arc<MockPlayer>,
    protocol: AirPlayProtocol,
    listener: StateProducer,
    session_manager: ClientSessionManager,
}

async fn harness(channel: MockControlChannel) -> Harness {
    init_tracing();
    let device = FakeDevice::start().await.expect("Failed to start fake device");
    let channel = Arc::new(channel);
    let factory = Arc::new(MockSecondaryFactory::new());
    let player = Arc::new(MockPlayer::new(PlayBehaviour::Finish));

    let protocol = AirPlayProtocol::builder(Arc::new(ScriptedVerifier::accepting()), player.clone())
        .content_servers(Arc::new(CountingServerFactory::new()))
        .remote_control(channel.clone(), factory.clone())
        .build();

    let config = AirPlayConfig::builder()
        .connection_timeout(Duration::from_secs(2))
        .keepalive_interval(Duration::from_millis(50))
        .build();

    Harness {
        device,
        channel,
        factory,
        player,
        protocol,
        listener: StateProducer::new(config.event_capacity),
        session_manager: ClientSessionManager::new(config),
    }
}

fn setup(
    h: &Harness,
    config: &mut DeviceConfig,
    interfaces: &mut Interfaces,
) -> Vec<SetupData> {
    h.protocol
        .setup(
            &Handle::current(),
            config,
            interfaces,
            h.listener.clone(),
            h.session_manager.clone(),
        )
        .expect("AirPlay service is configured")
        .collect()
}

async fn settle(tasks: PendingTasks) {
    for task in tasks {
        timeout(Duration::from_secs(2), task)
            .await
            .expect("Background task did not settle")
            .expect("Background task panicked");
    }
}

#[tokio::test]
async fn test_two_protocols_connect_and_close() {
    let h = harness(MockControlChannel::new()).await;
    let mut config = airplay_config(
        h.device.address(),
        Some(REMOTE_CONTROL_OS_VERSION),
        Some(&hap_credentials()),
    );
    let mut interfaces = Interfaces::new();

    let items = setup(&h, &mut config, &mut interfaces);
    assert_eq!(
        items.iter().map(|item| item.protocol).collect::<Vec<_>>(),
        vec![Protocol::AirPlay, Protocol::Mrp]
    );

    for item in &items {
        item.handler.connect().await.expect("connect failed");
    }

    let stats = h.factory.stats();
    assert_eq!(stats.connects(), 1);
    assert_eq!(h.channel.opens(), 1);
    assert!(h.device.wait_accepted(1).await);

    let connection = h.factory.calls()[0].connection.clone();
    assert!(connection.is_connected());

    let mut tasks = Vec::new();
    for item in &items {
        tasks.extend(item.handler.close());
    }
    // One from the tunneled protocol, keepalive and relay from the channel
    assert_eq!(tasks.len(), 3);
    settle(tasks).await;

    assert_eq!(stats.closes(), 1);
    assert!(!connection.is_connected());
    assert!(h.device.wait_closed(1).await);
}

#[tokio::test]
async fn test_mrp_traffic_over_remote_control() {
    let h = harness(MockControlChannel::new()).await;
    let mut config = airplay_config(
        h.device.address(),
        Some(REMOTE_CONTROL_OS_VERSION),
        Some(&hap_credentials()),
    );
    let mut interfaces = Interfaces::new();

    let items = setup(&h, &mut config, &mut interfaces);
    for item in &items {
        item.handler.connect().await.unwrap();
    }

    let connection = h.factory.calls()[0].connection.clone();
    let mut from_device = connection.take_receiver().unwrap();
    let mut peer = h.channel.take_peer().unwrap();

    connection.send(Bytes::from_static(b"\x08\x01")).unwrap();
    assert_eq!(
        timeout(Duration::from_secs(1), peer.next_from_client())
            .await
            .unwrap(),
        Some(Bytes::from_static(b"\x08\x01"))
    );

    peer.send_to_client(Bytes::from_static(b"\x08\x02"))
        .await
        .unwrap();
    assert_eq!(
        timeout(Duration::from_secs(1), from_device.recv())
            .await
            .unwrap(),
        Some(Bytes::from_static(b"\x08\x02"))
    );

    for item in &items {
        settle(item.handler.close()).await;
    }
}

#[tokio::test]
async fn test_failed_channel_keeps_secondary_registered() {
    let h = harness(MockControlChannel::failing()).await;
    let mut config = airplay_config(
        h.device.address(),
        Some(REMOTE_CONTROL_OS_VERSION),
        Some(&hap_credentials()),
    );
    let mut interfaces = Interfaces::new();

    let items = setup(&h, &mut config, &mut interfaces);
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].protocol, Protocol::Mrp);

    for item in &items {
        item.handler
            .connect()
            .await
            .expect("remote control failure must not fail connect");
    }

    let stats = h.factory.stats();
    assert_eq!(stats.connects(), 0);
    assert!(config.get_service(Protocol::Mrp).is_some());

    // Only the tunneled protocol leaves a task behind
    let tasks = items[1].handler.close();
    assert_eq!(tasks.len(), 1);
    settle(tasks).await;
    assert!(items[0].handler.close().is_empty());
    assert!(h.device.wait_closed(1).await);
}

#[tokio::test]
async fn test_unreachable_channel_keeps_primary_working() {
    let h = harness(MockControlChannel::new()).await;
    let mut config = airplay_config(
        h.device.address(),
        Some(REMOTE_CONTROL_OS_VERSION),
        Some(&hap_credentials()),
    );
    let mut interfaces = Interfaces::new();
    let items = setup(&h, &mut config, &mut interfaces);

    h.device.stop();
    drop(h.device);
    tokio::time::sleep(Duration::from_millis(50)).await;

    for item in &items {
        item.handler.connect().await.unwrap();
    }
    assert_eq!(h.factory.stats().connects(), 0);
    assert_eq!(h.channel.opens(), 0);

    let mut tasks = Vec::new();
    for item in &items {
        tasks.extend(item.handler.close());
    }
    settle(tasks).await;
}

#[tokio::test]
async fn test_single_protocol_without_remote_control() {
    let h = harness(MockControlChannel::new()).await;
    let mut config = airplay_config(h.device.address(), Some("12.4"), Some(&hap_credentials()));
    let mut interfaces = Interfaces::new();

    let items = setup(&h, &mut config, &mut interfaces);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].protocol, Protocol::AirPlay);
    assert!(h.factory.calls().is_empty());
    assert!(config.get_service(Protocol::Mrp).is_none());

    items[0].handler.connect().await.unwrap();

    let stream = interfaces.stream.main_instance().unwrap().clone();
    assert_eq!(interfaces.stream.main_protocol(), Some(Protocol::AirPlay));
    stream
        .play_url("http://example.com/movie.mp4", PlayOptions::at(12))
        .await
        .unwrap();

    let calls = h.player.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].position, 12);
    assert_ne!(calls[0].url, SERVED_URL);

    let features = interfaces.features.main_instance().unwrap();
    assert!(features.get_feature(FeatureName::PlayUrl).is_available());
    assert!(!features.get_feature(FeatureName::Pause).is_available());

    assert!(items[0].handler.close().is_empty());
}

#[tokio::test]
async fn test_primary_close_cancels_playback() {
    init_tracing();
    let device = FakeDevice::start().await.unwrap();
    let player = Arc::new(MockPlayer::new(PlayBehaviour::Hang));
    let protocol = AirPlayProtocol::builder(Arc::new(ScriptedVerifier::accepting()), player.clone())
        .content_servers(Arc::new(CountingServerFactory::new()))
        .build();

    let mut config = airplay_config(device.address(), None, Some(&hap_credentials()));
    let mut interfaces = Interfaces::new();
    let items: Vec<SetupData> = protocol
        .setup(
            &Handle::current(),
            &mut config,
            &mut interfaces,
            StateProducer::default(),
            ClientSessionManager::default(),
        )
        .unwrap()
        .collect();

    let stream = interfaces.stream.get(Protocol::AirPlay).unwrap().clone();
    let playback = tokio::spawn(async move {
        stream
            .play_url("http://example.com/live", PlayOptions::default())
            .await
    });
    player.started().await;

    assert!(items[0].handler.close().is_empty());
    let result = timeout(Duration::from_secs(1), playback)
        .await
        .expect("playback was not cancelled")
        .unwrap();
    assert!(matches!(result, Err(airplay_frontend::AirPlayError::Cancelled)));
    assert!(device.wait_closed(1).await);
}

#[tokio::test]
async fn test_connection_lost_is_reported() {
    let h = harness(MockControlChannel::new()).await;
    let mut events = h.listener.subscribe();
    let mut config = airplay_config(
        h.device.address(),
        Some(REMOTE_CONTROL_OS_VERSION),
        Some(&hap_credentials()),
    );
    let mut interfaces = Interfaces::new();

    let items = setup(&h, &mut config, &mut interfaces);
    for item in &items {
        item.handler.connect().await.unwrap();
    }

    drop(h.channel.take_peer());

    let event = timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("no event")
        .unwrap();
    assert!(matches!(
        event,
        DeviceEvent::ConnectionLost {
            protocol: Protocol::Mrp,
            ..
        }
    ));

    for item in &items {
        settle(item.handler.close()).await;
    }
}
