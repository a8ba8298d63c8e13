use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::runtime::Handle;

use super::pairing::PairOptions;
use super::*;
use crate::discovery::AIRPLAY_SERVICE_TYPE;
use crate::error::AirPlayError;
use crate::interface::Interfaces;
use crate::state::StateProducer;
use crate::testing::{
    CountingServerFactory, MockControlChannel, MockPairSetup, MockPlayer, MockSecondaryFactory,
    PlayBehaviour, REMOTE_CONTROL_OS_VERSION, ScriptedVerifier, airplay_config,
    hap_credentials, legacy_credentials,
};
use crate::types::{DeviceConfig, FeatureName, Protocol};

fn address() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 7000)
}

fn protocol(secondary: Option<Arc<MockSecondaryFactory>>) -> AirPlayProtocol {
    let mut builder = AirPlayProtocol::builder(
        Arc::new(ScriptedVerifier::accepting()),
        Arc::new(MockPlayer::new(PlayBehaviour::Finish)),
    )
    .content_servers(Arc::new(CountingServerFactory::new()));

    if let Some(factory) = secondary {
        builder = builder.remote_control(Arc::new(MockControlChannel::new()), factory);
    }
    builder.build()
}

#[test]
fn test_scan_registers_airplay_handler() {
    let handlers = AirPlayProtocol::scan();
    assert_eq!(handlers.len(), 1);
    assert!(handlers.contains_key(AIRPLAY_SERVICE_TYPE));
}

#[tokio::test]
async fn test_setup_without_airplay_service() {
    let mut config = DeviceConfig::new(address().ip(), "Empty");
    let mut interfaces = Interfaces::new();

    let not_supported = matches!(
        protocol(None).setup(
            &Handle::current(),
            &mut config,
            &mut interfaces,
            StateProducer::default(),
            ClientSessionManager::default(),
        ),
        Err(AirPlayError::NotSupported { .. })
    );

    assert!(not_supported);
    assert!(interfaces.stream.is_empty());
}

#[tokio::test]
async fn test_primary_registers_before_yield() {
    let mut config = airplay_config(address(), None, Some(&hap_credentials()));
    let mut interfaces = Interfaces::new();

    let protocol = protocol(None);
    let mut setup = protocol
        .setup(
            &Handle::current(),
            &mut config,
            &mut interfaces,
            StateProducer::default(),
            ClientSessionManager::default(),
        )
        .unwrap();
    assert_eq!(setup.size_hint(), (1, Some(2)));

    let primary = setup.next().unwrap();
    assert_eq!(primary.protocol, Protocol::AirPlay);
    assert_eq!(primary.features.len(), 1);
    assert!(primary.features.contains(&FeatureName::PlayUrl));

    assert!(setup.next().is_none());
    assert!(setup.next().is_none());
    drop(setup);

    let features = interfaces.features.get(Protocol::AirPlay).unwrap();
    assert!(features.get_feature(FeatureName::PlayUrl).is_available());
    assert!(interfaces.stream.get(Protocol::AirPlay).is_some());

    primary.handler.connect().await.unwrap();
    assert!(primary.handler.close().is_empty());
    assert!(primary.handler.close().is_empty());
}

#[tokio::test]
async fn test_nothing_registered_until_polled() {
    let mut config = airplay_config(address(), None, None);
    let mut interfaces = Interfaces::new();

    let protocol = protocol(None);
    let setup = protocol
        .setup(
            &Handle::current(),
            &mut config,
            &mut interfaces,
            StateProducer::default(),
            ClientSessionManager::default(),
        )
        .unwrap();
    drop(setup);

    assert!(interfaces.features.is_empty());
    assert!(interfaces.stream.is_empty());
}

#[tokio::test]
async fn test_secondary_for_eligible_device() {
    let factory = Arc::new(MockSecondaryFactory::new());
    let mut config = airplay_config(
        address(),
        Some(REMOTE_CONTROL_OS_VERSION),
        Some(&hap_credentials()),
    );
    let mut interfaces = Interfaces::new();

    let protocol = protocol(Some(factory.clone()));
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

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].protocol, Protocol::AirPlay);
    assert_eq!(items[1].protocol, Protocol::Mrp);
    assert!(items[1].features.contains(&FeatureName::Play));

    let calls = factory.calls();
    assert_eq!(calls.len(), 1);
    assert!(!calls[0].requires_heartbeat);
    assert!(calls[0].had_mrp_service);
    assert!(!calls[0].connection.is_connected());

    let mrp = config.get_service(Protocol::Mrp).unwrap();
    assert_eq!(mrp.port, 0);
    assert!(mrp.identifier.is_none());
}

#[tokio::test]
async fn test_no_secondary_for_old_os() {
    let factory = Arc::new(MockSecondaryFactory::new());
    let mut config = airplay_config(address(), Some("12.2"), Some(&hap_credentials()));
    let mut interfaces = Interfaces::new();

    let protocol = protocol(Some(factory.clone()));
    let count = protocol
        .setup(
            &Handle::current(),
            &mut config,
            &mut interfaces,
            StateProducer::default(),
            ClientSessionManager::default(),
        )
        .unwrap()
        .count();

    assert_eq!(count, 1);
    assert!(factory.calls().is_empty());
    assert!(config.get_service(Protocol::Mrp).is_none());
}

#[tokio::test]
async fn test_no_secondary_for_legacy_credentials() {
    let factory = Arc::new(MockSecondaryFactory::new());
    let mut config = airplay_config(
        address(),
        Some(REMOTE_CONTROL_OS_VERSION),
        Some(&legacy_credentials()),
    );
    let mut interfaces = Interfaces::new();

    let protocol = protocol(Some(factory.clone()));
    let count = protocol
        .setup(
            &Handle::current(),
            &mut config,
            &mut interfaces,
            StateProducer::default(),
            ClientSessionManager::default(),
        )
        .unwrap()
        .count();

    assert_eq!(count, 1);
    assert!(factory.calls().is_empty());
    assert!(config.get_service(Protocol::Mrp).is_none());
}

#[tokio::test]
async fn test_no_secondary_without_tunnel() {
    let mut config = airplay_config(
        address(),
        Some(REMOTE_CONTROL_OS_VERSION),
        Some(&hap_credentials()),
    );
    let mut interfaces = Interfaces::new();

    let protocol = protocol(None);
    let count = protocol
        .setup(
            &Handle::current(),
            &mut config,
            &mut interfaces,
            StateProducer::default(),
            ClientSessionManager::default(),
        )
        .unwrap()
        .count();

    assert_eq!(count, 1);
    assert!(config.get_service(Protocol::Mrp).is_none());
}

#[tokio::test]
async fn test_pair_requires_procedure() {
    let config = airplay_config(address(), None, None);
    let result = protocol(None).pair(
        &config,
        &ClientSessionManager::default(),
        PairOptions::default(),
    );
    assert!(matches!(result, Err(AirPlayError::NotSupported { .. })));
}

#[tokio::test]
async fn test_pair_without_airplay_service() {
    let config = DeviceConfig::new(address().ip(), "Empty");
    let protocol = AirPlayProtocol::builder(
        Arc::new(ScriptedVerifier::accepting()),
        Arc::new(MockPlayer::new(PlayBehaviour::Finish)),
    )
    .pair_setup(Arc::new(MockPairSetup::new("1111", Default::default())))
    .build();

    let result = protocol.pair(
        &config,
        &ClientSessionManager::default(),
        PairOptions::default(),
    );
    assert!(matches!(result, Err(AirPlayError::NotSupported { .. })));
}

#[tokio::test]
async fn test_pair_returns_handler() {
    let config = airplay_config(address(), None, None);
    let protocol = AirPlayProtocol::builder(
        Arc::new(ScriptedVerifier::accepting()),
        Arc::new(MockPlayer::new(PlayBehaviour::Finish)),
    )
    .pair_setup(Arc::new(MockPairSetup::new("1111", Default::default())))
    .build();

    let handler = protocol
        .pair(
            &config,
            &ClientSessionManager::default(),
            PairOptions { pin: Some(1111) },
        )
        .unwrap();
    assert!(handler.device_provides_pin());
    assert!(!handler.has_paired());
}
