use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;

use super::credentials::HapCredentials;
use crate::error::AirPlayError;
use crate::interface::PairingHandler;
use crate::net::{ConnectionGateway, HttpConnection};
use crate::types::DeviceService;

/// Pair-setup exchange with a device
#[async_trait]
pub trait PairSetupProcedure: Send + Sync {
    /// Ask the device to start pairing and show a PIN
    ///
    /// # Errors
    ///
    /// Returns error if the device refuses
    async fn start_pairing(&self, connection: &mut HttpConnection) -> Result<(), AirPlayError>;

    /// Finish pairing with the PIN shown by the device
    ///
    /// # Errors
    ///
    /// Returns `PairingFailed` if the device rejects the PIN
    async fn finish_pairing(
        &self,
        connection: &mut HttpConnection,
        pin: &str,
    ) -> Result<HapCredentials, AirPlayError>;
}

/// Options for [`crate::protocol::AirPlayProtocol::pair`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairOptions {
    /// PIN to use, if known up front
    pub pin: Option<u32>,
}

/// Pairs with the `AirPlay` service of a device
pub struct AirPlayPairingHandler {
    address: IpAddr,
    service: DeviceService,
    gateway: ConnectionGateway,
    procedure: Arc<dyn PairSetupProcedure>,
    connection: Option<HttpConnection>,
    pin: Option<String>,
    has_paired: bool,
}

impl AirPlayPairingHandler {
    /// Create a handler for `service` on the device at `address`
    #[must_use]
    pub fn new(
        address: IpAddr,
        service: DeviceService,
        gateway: ConnectionGateway,
        procedure: Arc<dyn PairSetupProcedure>,
        options: PairOptions,
    ) -> Self {
        let mut handler = Self {
            address,
            service,
            gateway,
            procedure,
            connection: None,
            pin: None,
            has_paired: false,
        };
        if let Some(pin) = options.pin {
            handler.pin(pin);
        }
        handler
    }

    /// Service being paired, with credentials filled in once paired
    #[must_use]
    pub fn service(&self) -> &DeviceService {
        &self.service
    }
}

#[async_trait]
impl PairingHandler for AirPlayPairingHandler {
    async fn begin(&mut self) -> Result<(), AirPlayError> {
        if self.connection.is_none() {
            let connection = self.gateway.connect(self.address, self.service.port).await?;
            self.connection = Some(connection);
        }

        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| AirPlayError::InvalidState {
                message: "pairing connection missing".to_string(),
            })?;

        tracing::info!("Starting pairing with {}", connection.peer_addr());
        self.procedure.start_pairing(connection).await
    }

    async fn finish(&mut self) -> Result<(), AirPlayError> {
        let pin = self.pin.clone().ok_or_else(|| AirPlayError::PairingFailed {
            message: "no pin given".to_string(),
        })?;

        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| AirPlayError::InvalidState {
                message: "pairing was not started".to_string(),
            })?;

        let credentials = self.procedure.finish_pairing(connection, &pin).await?;
        self.service.credentials = Some(credentials.to_string());
        self.has_paired = true;

        tracing::info!("Pairing with {} finished", self.address);
        Ok(())
    }

    fn pin(&mut self, pin: u32) {
        self.pin = Some(format!("{pin:04}"));
        tracing::debug!("AirPlay pin set to {:?}", self.pin);
    }

    fn device_provides_pin(&self) -> bool {
        true
    }

    fn has_paired(&self) -> bool {
        self.has_paired
    }

    fn credentials(&self) -> Option<&str> {
        if self.has_paired {
            self.service.credentials.as_deref()
        } else {
            None
        }
    }

    async fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close().await;
        }
    }
}

impl std::fmt::Debug for AirPlayPairingHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirPlayPairingHandler")
            .field("address", &self.address)
            .field("port", &self.service.port)
            .field("has_paired", &self.has_paired)
            .finish_non_exhaustive()
    }
}
