use std::io;

use thiserror::Error;

use crate::error::AirPlayError;

/// Failures of the optional remote control channel
///
/// Kept apart from [`AirPlayError`]: these never fail the primary stream and
/// are absorbed where the channel is bridged into the tunneled protocol.
#[derive(Debug, Error)]
pub enum RemoteControlError {
    /// Connecting or verifying the control connection failed
    #[error("remote control connection failed: {0}")]
    Connect(#[from] AirPlayError),

    /// Negotiating the data stream failed
    #[error("remote control setup failed: {message}")]
    Setup {
        /// Description of the failure
        message: String,
    },

    /// `start` was called on a running channel
    #[error("remote control channel already started")]
    AlreadyStarted,

    /// Operation needs a running channel
    #[error("remote control channel not started")]
    NotStarted,

    /// The channel was torn down
    #[error("remote control channel closed")]
    Closed,

    /// Data stream I/O failed
    #[error("remote control I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RemoteControlError {
    /// Shorthand for [`RemoteControlError::Setup`]
    pub fn setup(message: impl Into<String>) -> Self {
        Self::Setup {
            message: message.into(),
        }
    }
}
