//! # airplay-frontend
//!
//! `AirPlay` protocol front-end: URL streaming sessions and MRP tunneled
//! over the `AirPlay` remote control channel.
//!
//! ## Features
//!
//! - Discovery handler for `_airplay._tcp.local` services
//! - Credential parsing (HAP, legacy and transient)
//! - Cancellable URL and local file playback
//! - Remote control channel bridging MRP into a device session
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use airplay_frontend::protocol::{AirPlayProtocol, ClientSessionManager};
//! use airplay_frontend::testing::{MockPlayer, PlayBehaviour, ScriptedVerifier};
//! use airplay_frontend::{DeviceConfig, Interfaces, StateProducer};
//!
//! # async fn example(mut config: DeviceConfig) -> Result<(), airplay_frontend::AirPlayError> {
//! let protocol = AirPlayProtocol::builder(
//!     Arc::new(ScriptedVerifier::accepting()),
//!     Arc::new(MockPlayer::new(PlayBehaviour::Finish)),
//! )
//! .build();
//!
//! let mut interfaces = Interfaces::new();
//! let setup = protocol.setup(
//!     &tokio::runtime::Handle::current(),
//!     &mut config,
//!     &mut interfaces,
//!     StateProducer::default(),
//!     ClientSessionManager::default(),
//! )?;
//!
//! for item in setup {
//!     item.handler.connect().await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Setup**: [`protocol::AirPlayProtocol`] yields one [`SetupData`] per
//!   protocol front-end and registers implementations in [`Interfaces`]
//! - **Streaming**: [`streaming::AirPlayStream`] turns a URL into a verified,
//!   cancellable playback
//! - **Remote control**: [`remote_control::RemoteControl`] carries MRP over a
//!   second verified connection

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Error types
pub mod error;
/// Device state notifications
pub mod state;
/// Core types
pub mod types;

/// Testing utilities
pub mod testing;

pub mod discovery;
pub mod features;
pub mod interface;
pub mod net;
pub mod protocol;
pub mod remote_control;
/// Streaming support
pub mod streaming;

// Re-exports
pub use error::AirPlayError;
pub use features::AirPlayFeatures;
pub use interface::{Interfaces, PendingTasks, PlayOptions, ProtocolHandler, SetupData};
pub use protocol::{AirPlayProtocol, ClientSessionManager};
pub use state::{DeviceEvent, StateProducer};
pub use types::{AirPlayConfig, DeviceConfig, DeviceService, FeatureName, FeatureState, Protocol};
