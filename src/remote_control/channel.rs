use std::io;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Sink, SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;

use super::error::RemoteControlError;
use crate::interface::PendingTasks;
use crate::net::{ConnectionGateway, HttpConnection};
use crate::protocol::pairing::HapCredentials;
use crate::state::StateProducer;
use crate::types::{MIN_KEEPALIVE_INTERVAL, Protocol};

/// Bidirectional data stream negotiated over the control connection
pub struct DataChannel {
    /// Frames towards the device
    pub sink: Pin<Box<dyn Sink<Bytes, Error = io::Error> + Send>>,
    /// Frames from the device; ends when the device closes the stream
    pub source: BoxStream<'static, io::Result<Bytes>>,
}

impl std::fmt::Debug for DataChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataChannel").finish_non_exhaustive()
    }
}

/// Wire negotiation of the remote control channel
#[async_trait]
pub trait ControlChannelProtocol: Send + Sync {
    /// Negotiate the data stream on a verified connection
    ///
    /// # Errors
    ///
    /// Returns `Setup` if the device refuses the channel
    async fn open(
        &self,
        connection: &mut HttpConnection,
        credentials: &HapCredentials,
    ) -> Result<DataChannel, RemoteControlError>;

    /// Keep the control connection alive
    ///
    /// # Errors
    ///
    /// Returns error if the device stopped answering
    async fn keepalive(&self, connection: &mut HttpConnection) -> Result<(), RemoteControlError>;
}

struct ActiveChannel {
    cancel: CancellationToken,
    outgoing: mpsc::UnboundedSender<Bytes>,
    tasks: PendingTasks,
}

/// Remote control channel to one device
///
/// Owns the keepalive and relay tasks while started. Frames received from
/// the device are delivered to the receiver handed out once by
/// [`take_receiver`](Self::take_receiver).
pub struct RemoteControl {
    gateway: ConnectionGateway,
    protocol: Arc<dyn ControlChannelProtocol>,
    listener: StateProducer,
    keepalive_interval: Duration,
    incoming_tx: mpsc::UnboundedSender<Bytes>,
    incoming_rx: Mutex<Option<mpsc::UnboundedReceiver<Bytes>>>,
    active: Mutex<Option<ActiveChannel>>,
}

impl RemoteControl {
    /// Create a stopped channel
    ///
    /// `keepalive_interval` is raised to [`MIN_KEEPALIVE_INTERVAL`] if shorter.
    #[must_use]
    pub fn new(
        gateway: ConnectionGateway,
        protocol: Arc<dyn ControlChannelProtocol>,
        listener: StateProducer,
        keepalive_interval: Duration,
    ) -> Self {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        Self {
            gateway,
            protocol,
            listener,
            keepalive_interval: keepalive_interval.max(MIN_KEEPALIVE_INTERVAL),
            incoming_tx,
            incoming_rx: Mutex::new(Some(incoming_rx)),
            active: Mutex::new(None),
        }
    }

    /// Whether the channel is running
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|active| !active.cancel.is_cancelled())
    }

    /// Connect, verify and negotiate the channel, then start its tasks
    ///
    /// # Errors
    ///
    /// Returns `AlreadyStarted` if running, otherwise the error of the step
    /// that failed. The control connection is closed on failure.
    pub async fn start(
        &self,
        address: IpAddr,
        port: u16,
        credentials: &HapCredentials,
    ) -> Result<(), RemoteControlError> {
        if self.is_active() {
            return Err(RemoteControlError::AlreadyStarted);
        }

        tracing::debug!("Starting remote control channel to {}:{}", address, port);

        let mut connection = self.gateway.connect(address, port).await?;
        let channel = match self.negotiate(&mut connection, credentials).await {
            Ok(channel) => channel,
            Err(e) => {
                connection.close().await;
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();

        let keepalive = tokio::spawn(keepalive_loop(
            Arc::clone(&self.protocol),
            connection,
            self.keepalive_interval,
            cancel.clone(),
            self.listener.clone(),
        ));
        let relay = tokio::spawn(relay_loop(
            channel,
            outgoing_rx,
            self.incoming_tx.clone(),
            cancel.clone(),
            self.listener.clone(),
        ));

        let stale = self.active.lock().replace(ActiveChannel {
            cancel,
            outgoing,
            tasks: vec![keepalive, relay],
        });
        if let Some(stale) = stale {
            stale.cancel.cancel();
        }

        tracing::info!("Remote control channel to {} started", address);
        Ok(())
    }

    async fn negotiate(
        &self,
        connection: &mut HttpConnection,
        credentials: &HapCredentials,
    ) -> Result<DataChannel, RemoteControlError> {
        self.gateway.verify(connection, credentials).await?;
        self.protocol.open(connection, credentials).await
    }

    /// Stop the channel and hand back its tasks
    ///
    /// Returns nothing when the channel is not running.
    pub fn stop(&self) -> PendingTasks {
        match self.active.lock().take() {
            Some(active) => {
                tracing::debug!("Stopping remote control channel");
                active.cancel.cancel();
                active.tasks
            }
            None => Vec::new(),
        }
    }

    /// Queue a frame for the device
    ///
    /// # Errors
    ///
    /// Returns `NotStarted` when the channel is not running and `Closed` if
    /// the relay already exited
    pub fn send(&self, frame: Bytes) -> Result<(), RemoteControlError> {
        let active = self.active.lock();
        let active = active
            .as_ref()
            .filter(|active| !active.cancel.is_cancelled())
            .ok_or(RemoteControlError::NotStarted)?;

        active
            .outgoing
            .send(frame)
            .map_err(|_| RemoteControlError::Closed)
    }

    /// Receiver of frames from the device, available once
    pub fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<Bytes>> {
        self.incoming_rx.lock().take()
    }
}

impl Drop for RemoteControl {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for RemoteControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteControl")
            .field("active", &self.is_active())
            .field("keepalive_interval", &self.keepalive_interval)
            .finish_non_exhaustive()
    }
}

async fn keepalive_loop(
    protocol: Arc<dyn ControlChannelProtocol>,
    mut connection: HttpConnection,
    period: Duration,
    cancel: CancellationToken,
    listener: StateProducer,
) {
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let result = tokio::select! {
                    () = cancel.cancelled() => break,
                    result = protocol.keepalive(&mut connection) => result,
                };
                if let Err(e) = result {
                    tracing::warn!("Remote control keepalive failed: {}", e);
                    cancel.cancel();
                    listener.connection_lost(Protocol::Mrp, e.to_string());
                    break;
                }
            }
        }
    }

    connection.close().await;
}

/// Time granted to the data sink to flush and close once the relay exits
const SINK_CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

async fn relay_loop(
    channel: DataChannel,
    mut outgoing: mpsc::UnboundedReceiver<Bytes>,
    incoming: mpsc::UnboundedSender<Bytes>,
    cancel: CancellationToken,
    listener: StateProducer,
) {
    let DataChannel { mut sink, mut source } = channel;

    let failure = loop {
        tokio::select! {
            () = cancel.cancelled() => break None,
            frame = outgoing.recv() => match frame {
                Some(frame) => {
                    let sent = tokio::select! {
                        () = cancel.cancelled() => break None,
                        sent = sink.send(frame) => sent,
                    };
                    if let Err(e) = sent {
                        break Some(e.to_string());
                    }
                }
                None => break None,
            },
            frame = source.next() => match frame {
                Some(Ok(frame)) => {
                    if incoming.send(frame).is_err() {
                        tracing::trace!("Dropping remote control frame, nobody listening");
                    }
                }
                Some(Err(e)) => break Some(e.to_string()),
                None => break Some("device closed the data stream".to_string()),
            },
        }
    };

    match tokio::time::timeout(SINK_CLOSE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!("Closing remote control data stream failed: {}", e),
        Err(_) => tracing::debug!("Remote control data stream did not close in time"),
    }

    if let Some(reason) = failure {
        if !cancel.is_cancelled() {
            tracing::warn!("Remote control channel lost: {}", reason);
            cancel.cancel();
            listener.connection_lost(Protocol::Mrp, reason);
        }
    }
}
