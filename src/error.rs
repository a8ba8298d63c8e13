use std::io;
use thiserror::Error;

/// Errors that can occur during `AirPlay` operations
#[derive(Debug, Error)]
pub enum AirPlayError {
    // ===== Availability Errors =====
    /// Operation requested against a service that is not configured
    #[error("not supported: {message}")]
    NotSupported {
        /// Description of what is missing
        message: String,
    },

    // ===== Connection Errors =====
    /// Failed to establish connection to device
    #[error("connection failed to {address}: {message}")]
    ConnectionFailed {
        /// Address that was dialed
        address: String,
        /// Description of the failure
        message: String,
        /// The underlying source of the error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection was closed unexpectedly
    #[error("connection closed: {address}")]
    Disconnected {
        /// Address of the closed peer
        address: String,
    },

    /// Connection timed out
    #[error("connection timeout after {duration:?}")]
    ConnectionTimeout {
        /// The duration of the timeout
        duration: std::time::Duration,
    },

    // ===== Authentication Errors =====
    /// Verification handshake rejected the credentials
    #[error("authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the failure
        message: String,
        /// Whether the error is recoverable by retrying
        recoverable: bool,
    },

    /// Pairing procedure failed
    #[error("pairing failed: {message}")]
    PairingFailed {
        /// Description of the failure
        message: String,
    },

    // ===== Playback Errors =====
    /// Playback error reported by the player or device
    #[error("playback error: {message}")]
    PlaybackError {
        /// Description of the error
        message: String,
    },

    /// The playback task was cancelled through `close()`
    #[error("playback cancelled")]
    Cancelled,

    /// Local content server could not be started
    #[error("local content server error: {message}")]
    LocalServer {
        /// Description of the failure
        message: String,
        /// The underlying source of the error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // ===== Protocol Errors =====
    /// Encrypted frame encoding/decoding failed
    #[error("codec error: {message}")]
    CodecError {
        /// Description of the error
        message: String,
    },

    // ===== I/O Errors =====
    /// Network I/O error
    #[error("network error: {0}")]
    NetworkError(#[from] io::Error),

    // ===== State Errors =====
    /// Operation not valid in current state
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of why the state is invalid
        message: String,
    },
}

impl AirPlayError {
    /// Shorthand for [`AirPlayError::NotSupported`]
    pub(crate) fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable by retrying
    ///
    /// Nothing in this crate retries; the classification is for callers.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::ConnectionTimeout { .. } | Self::NetworkError(_) | Self::Disconnected { .. } => {
                true
            }
            Self::AuthenticationFailed { recoverable, .. } => *recoverable,
            _ => false,
        }
    }

    /// Check if this error indicates connection loss
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            Self::Disconnected { .. }
                | Self::ConnectionFailed { .. }
                | Self::ConnectionTimeout { .. }
        )
    }
}

/// Result type alias for `AirPlay` operations
pub type Result<T> = std::result::Result<T, AirPlayError>;
