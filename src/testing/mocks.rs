//! Scripted collaborators for exercising setup, streaming and the remote
//! control bridge without a real device.

use std::collections::HashSet;
use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc as futures_mpsc;
use futures::{Sink, SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;

use crate::error::AirPlayError;
use crate::interface::{Interfaces, PendingTasks, ProtocolHandler, SetupData};
use crate::net::{CredentialVerifier, HttpConnection, SessionKeys};
use crate::protocol::pairing::{HapCredentials, PairSetupProcedure};
use crate::protocol::{ClientSessionManager, SecondaryProtocolFactory};
use crate::remote_control::{
    AirPlayMrpConnection, ControlChannelProtocol, DataChannel, RemoteControlError,
};
use crate::state::StateProducer;
use crate::streaming::{ContentServer, ContentServerFactory, MediaPlayer};
use crate::types::{DeviceConfig, FeatureName, Protocol};

/// What [`ScriptedVerifier`] answers
#[derive(Debug, Clone)]
pub enum VerifyOutcome {
    /// Accept without encrypting the connection
    Accept,
    /// Accept and install these session keys
    Encrypt(SessionKeys),
    /// Reject the credentials
    Reject,
}

/// Credential verifier with a fixed answer
#[derive(Debug)]
pub struct ScriptedVerifier {
    outcome: VerifyOutcome,
    calls: AtomicUsize,
}

impl ScriptedVerifier {
    /// Verifier answering `outcome` to every call
    #[must_use]
    pub fn new(outcome: VerifyOutcome) -> Self {
        Self {
            outcome,
            calls: AtomicUsize::new(0),
        }
    }

    /// Verifier accepting everything
    #[must_use]
    pub fn accepting() -> Self {
        Self::new(VerifyOutcome::Accept)
    }

    /// Number of verifications performed
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialVerifier for ScriptedVerifier {
    async fn verify_credentials(
        &self,
        _connection: &mut HttpConnection,
        _credentials: &HapCredentials,
    ) -> Result<Option<SessionKeys>, AirPlayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            VerifyOutcome::Accept => Ok(None),
            VerifyOutcome::Encrypt(keys) => Ok(Some(keys.clone())),
            VerifyOutcome::Reject => Err(AirPlayError::AuthenticationFailed {
                message: "credentials rejected".to_string(),
                recoverable: false,
            }),
        }
    }
}

/// How [`MockPlayer`] plays
#[derive(Debug, Clone)]
pub enum PlayBehaviour {
    /// Finish immediately
    Finish,
    /// Fail with a playback error
    Fail(String),
    /// Never finish
    Hang,
}

/// One call to [`MockPlayer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayCall {
    /// URL handed to the player
    pub url: String,
    /// Start position
    pub position: u32,
    /// Whether the connection had been verified
    pub verified: bool,
}

/// Media player recording what it was asked to play
#[derive(Debug)]
pub struct MockPlayer {
    behaviour: PlayBehaviour,
    calls: Mutex<Vec<PlayCall>>,
    started: Notify,
}

impl MockPlayer {
    /// Player behaving as `behaviour`
    #[must_use]
    pub fn new(behaviour: PlayBehaviour) -> Self {
        Self {
            behaviour,
            calls: Mutex::new(Vec::new()),
            started: Notify::new(),
        }
    }

    /// Calls made so far
    #[must_use]
    pub fn calls(&self) -> Vec<PlayCall> {
        self.calls.lock().clone()
    }

    /// Wait until a playback has started
    pub async fn started(&self) {
        self.started.notified().await;
    }
}

#[async_trait]
impl MediaPlayer for MockPlayer {
    async fn play_url(
        &self,
        connection: &mut HttpConnection,
        url: &str,
        position: u32,
    ) -> Result<(), AirPlayError> {
        self.calls.lock().push(PlayCall {
            url: url.to_string(),
            position,
            verified: connection.is_verified(),
        });
        self.started.notify_one();

        match &self.behaviour {
            PlayBehaviour::Finish => Ok(()),
            PlayBehaviour::Fail(message) => Err(AirPlayError::PlaybackError {
                message: message.clone(),
            }),
            PlayBehaviour::Hang => std::future::pending().await,
        }
    }
}

/// Counters shared by the servers of a [`CountingServerFactory`]
#[derive(Debug, Default)]
pub struct ServerStats {
    created: AtomicUsize,
    started: AtomicUsize,
    stopped: AtomicUsize,
    paths: Mutex<Vec<PathBuf>>,
}

impl ServerStats {
    /// Servers created
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Servers started
    #[must_use]
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Servers stopped after being started
    #[must_use]
    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Files servers were created for
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.paths.lock().clone()
    }
}

/// Content server factory whose servers only count calls
#[derive(Debug, Default)]
pub struct CountingServerFactory {
    stats: Arc<ServerStats>,
}

impl CountingServerFactory {
    /// Create a factory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared counters
    #[must_use]
    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.stats)
    }
}

impl ContentServerFactory for CountingServerFactory {
    fn create(&self, path: &Path, _bind: IpAddr) -> Box<dyn ContentServer> {
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        self.stats.paths.lock().push(path.to_path_buf());
        Box::new(CountingServer {
            stats: Arc::clone(&self.stats),
            running: false,
        })
    }
}

struct CountingServer {
    stats: Arc<ServerStats>,
    running: bool,
}

#[async_trait]
impl ContentServer for CountingServer {
    async fn start(&mut self) -> Result<String, AirPlayError> {
        self.stats.started.fetch_add(1, Ordering::SeqCst);
        self.running = true;
        Ok(SERVED_URL.to_string())
    }

    async fn stop(&mut self) {
        if std::mem::take(&mut self.running) {
            self.stats.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// URL returned by servers of [`CountingServerFactory`]
pub const SERVED_URL: &str = "http://127.0.0.1:8080/media";

/// Device side of a [`MockControlChannel`] data stream
#[derive(Debug)]
pub struct ChannelPeer {
    /// Frames to deliver to the client
    pub to_client: futures_mpsc::UnboundedSender<io::Result<Bytes>>,
    /// Frames the client sent
    pub from_client: futures_mpsc::UnboundedReceiver<Bytes>,
}

impl ChannelPeer {
    /// Next frame the client sent
    pub async fn next_from_client(&mut self) -> Option<Bytes> {
        self.from_client.next().await
    }

    /// Deliver a frame to the client
    ///
    /// # Errors
    ///
    /// Returns error if the client side is gone
    pub async fn send_to_client(&mut self, frame: Bytes) -> Result<(), futures_mpsc::SendError> {
        self.to_client.send(Ok(frame)).await
    }
}

/// Remote control negotiation over in-memory channels
#[derive(Debug, Default)]
pub struct MockControlChannel {
    fail_open: bool,
    stall_sink: bool,
    fail_keepalive: AtomicBool,
    opens: AtomicUsize,
    keepalives: AtomicUsize,
    peer: Mutex<Option<ChannelPeer>>,
}

impl MockControlChannel {
    /// Channel that opens successfully
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel whose negotiation is refused
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Channel whose data sink never accepts a frame, like a device that
    /// stopped reading
    #[must_use]
    pub fn stalled() -> Self {
        Self {
            stall_sink: true,
            ..Self::default()
        }
    }

    /// Make every following keepalive fail
    pub fn fail_keepalives(&self) {
        self.fail_keepalive.store(true, Ordering::SeqCst);
    }

    /// Successful negotiations
    #[must_use]
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Keepalives sent
    #[must_use]
    pub fn keepalives(&self) -> usize {
        self.keepalives.load(Ordering::SeqCst)
    }

    /// Device side of the most recently opened data stream
    pub fn take_peer(&self) -> Option<ChannelPeer> {
        self.peer.lock().take()
    }
}

#[async_trait]
impl ControlChannelProtocol for MockControlChannel {
    async fn open(
        &self,
        _connection: &mut HttpConnection,
        _credentials: &HapCredentials,
    ) -> Result<DataChannel, RemoteControlError> {
        if self.fail_open {
            return Err(RemoteControlError::setup("device refused data stream"));
        }

        let (to_device, from_client) = futures_mpsc::unbounded::<Bytes>();
        let (to_client, from_device) = futures_mpsc::unbounded::<io::Result<Bytes>>();

        *self.peer.lock() = Some(ChannelPeer {
            to_client,
            from_client,
        });
        self.opens.fetch_add(1, Ordering::SeqCst);

        let sink: Pin<Box<dyn Sink<Bytes, Error = io::Error> + Send>> = if self.stall_sink {
            Box::pin(futures::sink::unfold((), |(), _frame: Bytes| {
                std::future::pending::<io::Result<()>>()
            }))
        } else {
            Box::pin(to_device.sink_map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e)))
        };

        Ok(DataChannel {
            sink,
            source: from_device.boxed(),
        })
    }

    async fn keepalive(&self, _connection: &mut HttpConnection) -> Result<(), RemoteControlError> {
        self.keepalives.fetch_add(1, Ordering::SeqCst);
        if self.fail_keepalive.load(Ordering::SeqCst) {
            Err(RemoteControlError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "keepalive not answered",
            )))
        } else {
            Ok(())
        }
    }
}

/// Counters of a [`MockProtocolHandler`]
#[derive(Debug, Default)]
pub struct HandlerStats {
    connects: AtomicUsize,
    closes: AtomicUsize,
}

impl HandlerStats {
    /// Calls to `connect`
    #[must_use]
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Calls to `close`
    #[must_use]
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Protocol handler leaving one short background task behind on close
#[derive(Debug)]
pub struct MockProtocolHandler {
    handle: Handle,
    stats: Arc<HandlerStats>,
}

#[async_trait]
impl ProtocolHandler for MockProtocolHandler {
    async fn connect(&self) -> Result<(), AirPlayError> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> PendingTasks {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        vec![self.handle.spawn(async {
            tokio::task::yield_now().await;
        })]
    }
}

/// What a [`MockSecondaryFactory`] was given
#[derive(Debug, Clone)]
pub struct SecondaryCall {
    /// `requires_heartbeat` argument
    pub requires_heartbeat: bool,
    /// Whether the config already held the MRP placeholder service
    pub had_mrp_service: bool,
    /// Transport handed over
    pub connection: AirPlayMrpConnection,
}

/// Secondary protocol factory producing [`MockProtocolHandler`]s
#[derive(Debug, Default)]
pub struct MockSecondaryFactory {
    stats: Arc<HandlerStats>,
    calls: Mutex<Vec<SecondaryCall>>,
}

impl MockSecondaryFactory {
    /// Create a factory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters of the handlers produced
    #[must_use]
    pub fn stats(&self) -> Arc<HandlerStats> {
        Arc::clone(&self.stats)
    }

    /// Calls made so far
    #[must_use]
    pub fn calls(&self) -> Vec<SecondaryCall> {
        self.calls.lock().clone()
    }
}

impl SecondaryProtocolFactory for MockSecondaryFactory {
    fn create_with_connection(
        &self,
        handle: &Handle,
        config: &mut DeviceConfig,
        _interfaces: &mut Interfaces,
        _listener: &StateProducer,
        _session_manager: &ClientSessionManager,
        connection: AirPlayMrpConnection,
        requires_heartbeat: bool,
    ) -> SetupData {
        self.calls.lock().push(SecondaryCall {
            requires_heartbeat,
            had_mrp_service: config.get_service(Protocol::Mrp).is_some(),
            connection,
        });

        SetupData {
            protocol: Protocol::Mrp,
            handler: Box::new(MockProtocolHandler {
                handle: handle.clone(),
                stats: Arc::clone(&self.stats),
            }),
            features: HashSet::from([FeatureName::Play, FeatureName::Pause]),
        }
    }
}

/// Pair-setup procedure accepting one PIN
#[derive(Debug)]
pub struct MockPairSetup {
    pin: String,
    credentials: HapCredentials,
    starts: AtomicUsize,
}

impl MockPairSetup {
    /// Procedure accepting `pin` and producing `credentials`
    #[must_use]
    pub fn new(pin: impl Into<String>, credentials: HapCredentials) -> Self {
        Self {
            pin: pin.into(),
            credentials,
            starts: AtomicUsize::new(0),
        }
    }

    /// Calls to `start_pairing`
    #[must_use]
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PairSetupProcedure for MockPairSetup {
    async fn start_pairing(&self, _connection: &mut HttpConnection) -> Result<(), AirPlayError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn finish_pairing(
        &self,
        _connection: &mut HttpConnection,
        pin: &str,
    ) -> Result<HapCredentials, AirPlayError> {
        if pin == self.pin {
            Ok(self.credentials.clone())
        } else {
            Err(AirPlayError::PairingFailed {
                message: format!("wrong pin {pin}"),
            })
        }
    }
}
