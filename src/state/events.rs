//! Device listener events

use tokio::sync::broadcast;

use crate::types::Protocol;

/// Events reported to whoever owns the device session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A protocol connection dropped without being asked to
    ConnectionLost {
        /// Protocol whose connection dropped
        protocol: Protocol,
        /// Description of the failure
        reason: String,
    },
    /// A protocol connection was closed on request
    ConnectionClosed {
        /// Protocol that closed
        protocol: Protocol,
    },
}

/// Producer of device events, cheap to clone and share between protocols
#[derive(Debug, Clone)]
pub struct StateProducer {
    /// Broadcast sender
    tx: broadcast::Sender<DeviceEvent>,
}

impl StateProducer {
    /// Create a producer buffering up to `capacity` events per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.tx.subscribe()
    }

    /// Report that a connection was lost
    pub fn connection_lost(&self, protocol: Protocol, reason: impl Into<String>) {
        self.emit(DeviceEvent::ConnectionLost {
            protocol,
            reason: reason.into(),
        });
    }

    /// Report that a connection was closed
    pub fn connection_closed(&self, protocol: Protocol) {
        self.emit(DeviceEvent::ConnectionClosed { protocol });
    }

    /// Emit an event
    pub fn emit(&self, event: DeviceEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    /// Get subscriber count
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StateProducer {
    fn default() -> Self {
        Self::new(32)
    }
}
