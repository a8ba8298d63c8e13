use std::collections::{HashMap, HashSet};
use std::iter::FusedIterator;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::Handle;

use super::pairing::{
    AirPlayPairingHandler, HapCredentials, PairOptions, PairSetupProcedure, extract_credentials,
};
use crate::discovery::{self, ScanHandler};
use crate::error::AirPlayError;
use crate::features::AirPlayFeatures;
use crate::interface::{
    Interfaces, PairingHandler, PendingTasks, ProtocolHandler, SetupData, Stream,
};
use crate::net::{ConnectionGateway, CredentialVerifier};
use crate::remote_control::{
    AirPlayMrpConnection, BridgeDecision, ControlChannelProtocol, RemoteControl, bridge_decision,
};
use crate::state::StateProducer;
use crate::streaming::{AirPlayStream, ContentServerFactory, MediaPlayer, StaticFileServerFactory};
use crate::types::{AirPlayConfig, DeviceConfig, DeviceService, FeatureName, Protocol};

/// Session-wide settings shared by every protocol of one device
#[derive(Debug, Clone, Default)]
pub struct ClientSessionManager {
    /// Timeouts and intervals
    pub config: AirPlayConfig,
}

impl ClientSessionManager {
    /// Create a session manager
    #[must_use]
    pub fn new(config: AirPlayConfig) -> Self {
        Self { config }
    }
}

/// Builds the protocol that is tunneled over the remote control channel
pub trait SecondaryProtocolFactory: Send + Sync {
    /// Set up the protocol with `connection` as its transport
    #[allow(clippy::too_many_arguments)]
    fn create_with_connection(
        &self,
        handle: &Handle,
        config: &mut DeviceConfig,
        interfaces: &mut Interfaces,
        listener: &StateProducer,
        session_manager: &ClientSessionManager,
        connection: AirPlayMrpConnection,
        requires_heartbeat: bool,
    ) -> SetupData;
}

#[derive(Clone)]
struct Tunnel {
    channel: Arc<dyn ControlChannelProtocol>,
    factory: Arc<dyn SecondaryProtocolFactory>,
}

/// `AirPlay` protocol front-end
///
/// Produces the `AirPlay` streaming front-end for a device and, when the
/// device supports it, MRP tunneled over the remote control channel.
pub struct AirPlayProtocol {
    verifier: Arc<dyn CredentialVerifier>,
    player: Arc<dyn MediaPlayer>,
    servers: Option<Arc<dyn ContentServerFactory>>,
    tunnel: Option<Tunnel>,
    pair_setup: Option<Arc<dyn PairSetupProcedure>>,
}

impl AirPlayProtocol {
    /// Start building a protocol around the collaborators every setup needs
    #[must_use]
    pub fn builder(
        verifier: Arc<dyn CredentialVerifier>,
        player: Arc<dyn MediaPlayer>,
    ) -> AirPlayProtocolBuilder {
        AirPlayProtocolBuilder {
            protocol: Self {
                verifier,
                player,
                servers: None,
                tunnel: None,
                pair_setup: None,
            },
        }
    }

    /// Discovery handlers for the services this protocol understands
    #[must_use]
    pub fn scan() -> HashMap<&'static str, ScanHandler> {
        discovery::scan()
    }

    /// Set up the front-ends of a device
    ///
    /// The returned iterator yields the `AirPlay` front-end first, then MRP
    /// if the remote control channel can carry it.
    ///
    /// # Errors
    ///
    /// Returns `NotSupported` if `config` has no `AirPlay` service
    pub fn setup<'a>(
        &self,
        handle: &Handle,
        config: &'a mut DeviceConfig,
        interfaces: &'a mut Interfaces,
        listener: StateProducer,
        session_manager: ClientSessionManager,
    ) -> Result<AirPlaySetup<'a>, AirPlayError> {
        let service = config
            .get_service(Protocol::AirPlay)
            .cloned()
            .ok_or_else(|| AirPlayError::not_supported("AirPlay service is not available"))?;

        let gateway = self.gateway(&session_manager);
        let servers: Arc<dyn ContentServerFactory> = match &self.servers {
            Some(servers) => Arc::clone(servers),
            None => Arc::new(StaticFileServerFactory::new(
                session_manager.config.server_shutdown_timeout,
            )),
        };

        Ok(AirPlaySetup {
            handle: handle.clone(),
            config,
            interfaces,
            listener,
            session_manager,
            service,
            gateway,
            player: Arc::clone(&self.player),
            servers,
            tunnel: self.tunnel.clone(),
            step: SetupStep::Primary,
        })
    }

    /// Pairing handler for the `AirPlay` service of a device
    ///
    /// # Errors
    ///
    /// Returns `NotSupported` if `config` has no `AirPlay` service or no
    /// pair-setup procedure was configured
    pub fn pair(
        &self,
        config: &DeviceConfig,
        session_manager: &ClientSessionManager,
        options: PairOptions,
    ) -> Result<Box<dyn PairingHandler>, AirPlayError> {
        let service = config
            .get_service(Protocol::AirPlay)
            .cloned()
            .ok_or_else(|| AirPlayError::not_supported("AirPlay service is not available"))?;
        let procedure = self
            .pair_setup
            .clone()
            .ok_or_else(|| AirPlayError::not_supported("no pair-setup procedure configured"))?;

        Ok(Box::new(AirPlayPairingHandler::new(
            config.address,
            service,
            self.gateway(session_manager),
            procedure,
            options,
        )))
    }

    fn gateway(&self, session_manager: &ClientSessionManager) -> ConnectionGateway {
        ConnectionGateway::new(
            Arc::clone(&self.verifier),
            session_manager.config.connection_timeout,
        )
    }
}

impl std::fmt::Debug for AirPlayProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirPlayProtocol")
            .field("remote_control", &self.tunnel.is_some())
            .field("pairing", &self.pair_setup.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`AirPlayProtocol`]
pub struct AirPlayProtocolBuilder {
    protocol: AirPlayProtocol,
}

impl AirPlayProtocolBuilder {
    /// Serve local files with `servers` instead of [`StaticFileServerFactory`]
    #[must_use]
    pub fn content_servers(mut self, servers: Arc<dyn ContentServerFactory>) -> Self {
        self.protocol.servers = Some(servers);
        self
    }

    /// Tunnel a secondary protocol over the remote control channel
    #[must_use]
    pub fn remote_control(
        mut self,
        channel: Arc<dyn ControlChannelProtocol>,
        factory: Arc<dyn SecondaryProtocolFactory>,
    ) -> Self {
        self.protocol.tunnel = Some(Tunnel { channel, factory });
        self
    }

    /// Enable pairing with `procedure`
    #[must_use]
    pub fn pair_setup(mut self, procedure: Arc<dyn PairSetupProcedure>) -> Self {
        self.protocol.pair_setup = Some(procedure);
        self
    }

    /// Build the protocol
    #[must_use]
    pub fn build(self) -> AirPlayProtocol {
        self.protocol
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetupStep {
    Primary,
    Secondary,
    Done,
}

/// Front-ends of one device, produced on demand
///
/// Registrations in [`Interfaces`] happen as each item is produced, so they
/// are in place before the caller connects it.
pub struct AirPlaySetup<'a> {
    handle: Handle,
    config: &'a mut DeviceConfig,
    interfaces: &'a mut Interfaces,
    listener: StateProducer,
    session_manager: ClientSessionManager,
    service: DeviceService,
    gateway: ConnectionGateway,
    player: Arc<dyn MediaPlayer>,
    servers: Arc<dyn ContentServerFactory>,
    tunnel: Option<Tunnel>,
    step: SetupStep,
}

impl AirPlaySetup<'_> {
    fn primary(&mut self) -> SetupData {
        let stream = Arc::new(AirPlayStream::new(
            self.config.address,
            Some(self.service.clone()),
            self.gateway.clone(),
            Arc::clone(&self.player),
            Arc::clone(&self.servers),
        ));

        self.interfaces.features.register(
            Arc::new(AirPlayFeatures::new(self.service.clone())),
            Protocol::AirPlay,
        );
        let playback: Arc<dyn Stream> = stream.clone();
        self.interfaces.stream.register(playback, Protocol::AirPlay);

        SetupData {
            protocol: Protocol::AirPlay,
            handler: Box::new(AirPlayHandler { stream }),
            features: HashSet::from([FeatureName::PlayUrl]),
        }
    }

    fn secondary(&mut self) -> Option<SetupData> {
        let credentials = extract_credentials(&self.service);
        match bridge_decision(&self.service, &credentials) {
            BridgeDecision::NotSupported => {
                tracing::debug!("Remote control channel is not supported by device");
                return None;
            }
            BridgeDecision::UnsupportedCredentials(kind) => {
                tracing::debug!(
                    "Remote control channel is not supported by {:?} credentials",
                    kind
                );
                return None;
            }
            BridgeDecision::Eligible => {}
        }

        let Some(tunnel) = self.tunnel.clone() else {
            tracing::debug!("Remote control channel is supported but no tunnel is configured");
            return None;
        };

        tracing::debug!("Setting up MRP over the remote control channel");

        let control = Arc::new(RemoteControl::new(
            self.gateway.clone(),
            tunnel.channel,
            self.listener.clone(),
            self.session_manager.config.keepalive_interval,
        ));
        self.config
            .add_service(DeviceService::new(None, Protocol::Mrp, 0));

        let secondary = tunnel.factory.create_with_connection(
            &self.handle,
            self.config,
            self.interfaces,
            &self.listener,
            &self.session_manager,
            AirPlayMrpConnection::new(Arc::clone(&control), self.listener.clone()),
            false,
        );

        Some(SetupData {
            protocol: secondary.protocol,
            features: secondary.features,
            handler: Box::new(RemoteControlHandler {
                control,
                address: self.config.address,
                port: self.service.port,
                credentials,
                inner: secondary.handler,
            }),
        })
    }
}

impl Iterator for AirPlaySetup<'_> {
    type Item = SetupData;

    fn next(&mut self) -> Option<SetupData> {
        match self.step {
            SetupStep::Primary => {
                self.step = SetupStep::Secondary;
                Some(self.primary())
            }
            SetupStep::Secondary => {
                self.step = SetupStep::Done;
                self.secondary()
            }
            SetupStep::Done => None,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.step {
            SetupStep::Primary => (1, Some(2)),
            SetupStep::Secondary => (0, Some(1)),
            SetupStep::Done => (0, Some(0)),
        }
    }
}

impl FusedIterator for AirPlaySetup<'_> {}

impl std::fmt::Debug for AirPlaySetup<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirPlaySetup")
            .field("address", &self.config.address)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

/// The `AirPlay` front-end has no connection of its own to manage
struct AirPlayHandler {
    stream: Arc<AirPlayStream>,
}

#[async_trait]
impl ProtocolHandler for AirPlayHandler {
    async fn connect(&self) -> Result<(), AirPlayError> {
        Ok(())
    }

    fn close(&self) -> PendingTasks {
        self.stream.close();
        Vec::new()
    }
}

/// Starts the remote control channel before the tunneled protocol
///
/// A channel that fails to start is logged and leaves the tunneled protocol
/// unconnected; the primary front-end is unaffected.
struct RemoteControlHandler {
    control: Arc<RemoteControl>,
    address: IpAddr,
    port: u16,
    credentials: HapCredentials,
    inner: Box<dyn ProtocolHandler>,
}

#[async_trait]
impl ProtocolHandler for RemoteControlHandler {
    async fn connect(&self) -> Result<(), AirPlayError> {
        if let Err(e) = self
            .control
            .start(self.address, self.port, &self.credentials)
            .await
        {
            tracing::error!("Failed to set up remote control channel: {}", e);
            return Ok(());
        }

        self.inner.connect().await
    }

    fn close(&self) -> PendingTasks {
        let mut tasks = self.inner.close();
        tasks.extend(self.control.stop());
        tasks
    }
}
