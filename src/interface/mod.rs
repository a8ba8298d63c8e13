//! Interfaces shared by every protocol front-end
//!
//! Front-ends register their implementations in an [`Interfaces`] registry
//! keyed by protocol; the session manager picks which one answers.

mod relayer;

pub use relayer::Relayer;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::error::AirPlayError;
use crate::types::{FeatureInfo, FeatureName, Protocol};

/// Background tasks a front-end left running on close, for the caller to await
pub type PendingTasks = Vec<JoinHandle<()>>;

/// Feature availability of one front-end
pub trait Features: Send + Sync {
    /// Current state of a feature
    fn get_feature(&self, feature: FeatureName) -> FeatureInfo;
}

/// Options for [`Stream::play_url`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayOptions {
    /// Start position in seconds
    pub position: u32,
}

impl PlayOptions {
    /// Start playback at `position` seconds
    #[must_use]
    pub fn at(position: u32) -> Self {
        Self { position }
    }
}

/// Media streaming
#[async_trait]
pub trait Stream: Send + Sync {
    /// Play media from a URL or a local file path
    ///
    /// Does not return until playback has finished.
    ///
    /// # Errors
    ///
    /// Returns the error of whichever step failed
    async fn play_url(&self, url: &str, options: PlayOptions) -> Result<(), AirPlayError>;

    /// Cancel ongoing playback and free resources
    fn close(&self);
}

/// Connect/close pair of a protocol front-end
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    /// Activate the protocol
    ///
    /// # Errors
    ///
    /// Returns error if a mandatory connection cannot be established
    async fn connect(&self) -> Result<(), AirPlayError>;

    /// Tear the protocol down
    ///
    /// Safe whether or not `connect` ran or succeeded.
    fn close(&self) -> PendingTasks;
}

/// One protocol front-end produced by setup
pub struct SetupData {
    /// Protocol identity
    pub protocol: Protocol,
    /// Connect and close operations
    pub handler: Box<dyn ProtocolHandler>,
    /// Features this front-end can provide
    pub features: HashSet<FeatureName>,
}

impl std::fmt::Debug for SetupData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupData")
            .field("protocol", &self.protocol)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

/// Pairing with a device
#[async_trait]
pub trait PairingHandler: Send {
    /// Start pairing
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be reached or refuses to pair
    async fn begin(&mut self) -> Result<(), AirPlayError>;

    /// Complete pairing with the PIN given through [`pin`](Self::pin)
    ///
    /// # Errors
    ///
    /// Returns `PairingFailed` if no PIN was given or the device rejects it
    async fn finish(&mut self) -> Result<(), AirPlayError>;

    /// Supply the PIN shown by the device
    fn pin(&mut self, pin: u32);

    /// Whether the device shows the PIN (as opposed to us)
    fn device_provides_pin(&self) -> bool;

    /// Whether pairing completed
    fn has_paired(&self) -> bool;

    /// Credentials produced by a completed pairing, in storage format
    fn credentials(&self) -> Option<&str>;

    /// Release resources
    async fn close(&mut self);
}

/// Registry of front-end implementations, passed explicitly through setup
#[derive(Default)]
pub struct Interfaces {
    /// Feature registries
    pub features: Relayer<Arc<dyn Features>>,
    /// Stream implementations
    pub stream: Relayer<Arc<dyn Stream>>,
}

impl Interfaces {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
