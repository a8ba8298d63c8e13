use std::future::Future;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::player::MediaPlayer;
use super::server::{ContentServer, ContentServerFactory};
use crate::error::AirPlayError;
use crate::interface::{PlayOptions, Stream};
use crate::net::{ConnectionGateway, HttpConnection, local_address_reaching};
use crate::protocol::pairing::{HapCredentials, parse_credentials};
use crate::types::DeviceService;

/// Phase of the tracked playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Nothing is playing
    Idle,
    /// Starting the local content server
    Preparing,
    /// Opening the device connection
    Connecting,
    /// Verifying credentials
    Verifying,
    /// Playback in progress
    Playing,
}

struct TrackedPlayback {
    id: u64,
    cancel: CancellationToken,
    state: StreamState,
}

type TrackingSlot = Mutex<Option<TrackedPlayback>>;

/// Clears the tracking slot on every exit, but only while it still holds
/// the playback it was created for
struct TrackingGuard<'a> {
    slot: &'a TrackingSlot,
    id: u64,
}

impl Drop for TrackingGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|tracked| tracked.id == self.id) {
            *slot = None;
        }
    }
}

/// Resources acquired by one playback, released whatever the outcome
#[derive(Default)]
struct PlaybackResources {
    server: Option<Box<dyn ContentServer>>,
    connection: Option<HttpConnection>,
}

impl PlaybackResources {
    async fn release(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close().await;
        }
        if let Some(mut server) = self.server.take() {
            server.stop().await;
        }
    }
}

/// Run `future` unless `cancel` fires first
async fn cancellable<T>(
    cancel: &CancellationToken,
    future: impl Future<Output = Result<T, AirPlayError>>,
) -> Result<T, AirPlayError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(AirPlayError::Cancelled),
        result = future => result,
    }
}

/// URL playback on the `AirPlay` service of a device
///
/// Each [`play_url`](Stream::play_url) call runs to completion on the
/// caller's task. The most recent call is tracked so [`close`](Stream::close)
/// can cancel it.
pub struct AirPlayStream {
    address: IpAddr,
    service: Option<DeviceService>,
    credentials: HapCredentials,
    gateway: ConnectionGateway,
    player: Arc<dyn MediaPlayer>,
    servers: Arc<dyn ContentServerFactory>,
    tracked: TrackingSlot,
    next_id: AtomicU64,
}

impl AirPlayStream {
    /// Create a stream session for the device at `address`
    ///
    /// Without a `service` every playback fails with `NotSupported`.
    #[must_use]
    pub fn new(
        address: IpAddr,
        service: Option<DeviceService>,
        gateway: ConnectionGateway,
        player: Arc<dyn MediaPlayer>,
        servers: Arc<dyn ContentServerFactory>,
    ) -> Self {
        let credentials =
            parse_credentials(service.as_ref().and_then(|s| s.credentials.as_deref()));

        Self {
            address,
            service,
            credentials,
            gateway,
            player,
            servers,
            tracked: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Phase of the tracked playback
    #[must_use]
    pub fn state(&self) -> StreamState {
        self.tracked
            .lock()
            .as_ref()
            .map_or(StreamState::Idle, |tracked| tracked.state)
    }

    /// Whether a playback is tracked
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.tracked.lock().is_some()
    }

    fn set_state(&self, id: u64, state: StreamState) {
        if let Some(tracked) = self.tracked.lock().as_mut().filter(|t| t.id == id) {
            tracing::debug!("Playback {}: {:?} -> {:?}", id, tracked.state, state);
            tracked.state = state;
        }
    }

    async fn run(
        &self,
        id: u64,
        port: u16,
        url: &str,
        options: PlayOptions,
        cancel: &CancellationToken,
        resources: &mut PlaybackResources,
    ) -> Result<(), AirPlayError> {
        let mut url = url.to_string();

        if tokio::fs::try_exists(&url).await.unwrap_or(false) {
            let bind = local_address_reaching(self.address).await.map_err(|e| {
                AirPlayError::LocalServer {
                    message: format!("no local address reaches {}", self.address),
                    source: Some(Box::new(e)),
                }
            })?;

            let server = resources
                .server
                .insert(self.servers.create(Path::new(&url), bind));
            url = cancellable(cancel, server.start()).await?;
            tracing::debug!("Local file will be played from {}", url);
        }

        self.set_state(id, StreamState::Connecting);
        let connection = resources.connection.insert(
            cancellable(cancel, self.gateway.connect(self.address, port)).await?,
        );

        self.set_state(id, StreamState::Verifying);
        cancellable(cancel, self.gateway.verify(connection, &self.credentials)).await?;

        self.set_state(id, StreamState::Playing);
        cancellable(
            cancel,
            self.player.play_url(connection, &url, options.position),
        )
        .await
    }
}

#[async_trait]
impl Stream for AirPlayStream {
    async fn play_url(&self, url: &str, options: PlayOptions) -> Result<(), AirPlayError> {
        let Some(port) = self.service.as_ref().map(|service| service.port) else {
            return Err(AirPlayError::not_supported("AirPlay service is not available"));
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let previous = self.tracked.lock().replace(TrackedPlayback {
            id,
            cancel: cancel.clone(),
            state: StreamState::Preparing,
        });
        if let Some(previous) = previous {
            tracing::debug!("Playback {} replaces tracked playback {}", id, previous.id);
        }

        tracing::info!("Playing {} at position {}", url, options.position);

        let guard = TrackingGuard {
            slot: &self.tracked,
            id,
        };
        let mut resources = PlaybackResources::default();
        let result = self
            .run(id, port, url, options, &cancel, &mut resources)
            .await;

        drop(guard);
        resources.release().await;

        match &result {
            Ok(()) => tracing::info!("Playback {} finished", id),
            Err(AirPlayError::Cancelled) => tracing::info!("Playback {} cancelled", id),
            Err(e) => tracing::warn!("Playback {} failed: {}", id, e),
        }
        result
    }

    fn close(&self) {
        if let Some(tracked) = self.tracked.lock().as_ref() {
            tracing::debug!("Cancelling playback {}", tracked.id);
            tracked.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for AirPlayStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirPlayStream")
            .field("address", &self.address)
            .field("service", &self.service.as_ref().map(|s| s.port))
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
