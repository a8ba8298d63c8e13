use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use super::channel::RemoteControl;
use super::error::RemoteControlError;
use crate::state::StateProducer;
use crate::types::Protocol;

/// MRP transport carried by the remote control channel
///
/// Handed to the MRP protocol in place of a TCP connection of its own.
#[derive(Clone)]
pub struct AirPlayMrpConnection {
    control: Arc<RemoteControl>,
    listener: StateProducer,
}

impl AirPlayMrpConnection {
    /// Transport over `control`, reporting closes to `listener`
    #[must_use]
    pub fn new(control: Arc<RemoteControl>, listener: StateProducer) -> Self {
        Self { control, listener }
    }

    /// Whether the underlying channel is running
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.control.is_active()
    }

    /// Send one MRP message
    ///
    /// # Errors
    ///
    /// Returns `NotStarted` until the channel is running
    pub fn send(&self, message: Bytes) -> Result<(), RemoteControlError> {
        tracing::trace!("Sending {} bytes of MRP data", message.len());
        self.control.send(message)
    }

    /// Receiver of MRP messages from the device, available once
    pub fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<Bytes>> {
        self.control.take_receiver()
    }

    /// Report the transport as closed
    ///
    /// The channel itself is stopped by whoever owns it.
    pub fn close(&self) {
        tracing::debug!("MRP connection over remote control closed");
        self.listener.connection_closed(Protocol::Mrp);
    }
}

impl std::fmt::Debug for AirPlayMrpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirPlayMrpConnection")
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}
