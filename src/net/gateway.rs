//! Encrypted connection gateway: connect, then verify credentials in place

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::connection::{HttpConnection, http_connect};
use super::secure::SessionKeys;
use crate::error::AirPlayError;
use crate::protocol::pairing::{AuthenticationType, HapCredentials};

/// Pair-verify procedure run over an open connection
///
/// Implementations perform the cryptographic handshake for the credential
/// type they are given. Returning session keys switches the connection to
/// encrypted framing; returning `None` leaves it in plain mode (legacy
/// verification does not encrypt the control connection).
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Verify `credentials` with the device on `connection`
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationFailed` when the device rejects the credentials
    async fn verify_credentials(
        &self,
        connection: &mut HttpConnection,
        credentials: &HapCredentials,
    ) -> Result<Option<SessionKeys>, AirPlayError>;
}

/// Opens connections and verifies them with stored credentials
#[derive(Clone)]
pub struct ConnectionGateway {
    verifier: Arc<dyn CredentialVerifier>,
    connect_timeout: Duration,
}

impl ConnectionGateway {
    /// Create a gateway around a verifier
    #[must_use]
    pub fn new(verifier: Arc<dyn CredentialVerifier>, connect_timeout: Duration) -> Self {
        Self {
            verifier,
            connect_timeout,
        }
    }

    /// Open a connection to `address:port`
    ///
    /// # Errors
    ///
    /// Returns `ConnectionFailed` or `ConnectionTimeout`
    pub async fn connect(&self, address: IpAddr, port: u16) -> Result<HttpConnection, AirPlayError> {
        http_connect(address, port, self.connect_timeout).await
    }

    /// Verify `connection` in place
    ///
    /// Credentials of type [`AuthenticationType::Null`] have nothing to verify
    /// and leave the connection as it is.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationFailed` if the handshake rejects the credentials
    pub async fn verify(
        &self,
        connection: &mut HttpConnection,
        credentials: &HapCredentials,
    ) -> Result<(), AirPlayError> {
        if credentials.auth_type() == AuthenticationType::Null {
            tracing::debug!("No credentials, skipping verification of {}", connection.peer_addr());
            return Ok(());
        }

        if connection.is_closed() {
            return Err(AirPlayError::InvalidState {
                message: "cannot verify a closed connection".to_string(),
            });
        }

        tracing::debug!(
            "Verifying {} with {:?} credentials",
            connection.peer_addr(),
            credentials.auth_type()
        );

        if let Some(keys) = self
            .verifier
            .verify_credentials(connection, credentials)
            .await?
        {
            connection.enable_encryption(&keys);
        }
        connection.mark_verified();
        Ok(())
    }
}

impl std::fmt::Debug for ConnectionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionGateway")
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}
