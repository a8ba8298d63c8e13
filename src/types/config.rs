use std::time::Duration;

/// Shortest keepalive interval accepted for the remote control channel
pub const MIN_KEEPALIVE_INTERVAL: Duration = Duration::from_millis(10);

/// Configuration for `AirPlay` front-end behavior
#[derive(Debug, Clone)]
pub struct AirPlayConfig {
    /// Timeout for connection attempts (default: 10 seconds)
    pub connection_timeout: Duration,

    /// Interval between keepalives on the remote control channel (default: 2 seconds)
    pub keepalive_interval: Duration,

    /// Time granted to the local content server to finish in-flight requests
    /// before it is aborted (default: 2 seconds)
    pub server_shutdown_timeout: Duration,

    /// Capacity of the device event channel (default: 32)
    pub event_capacity: usize,
}

impl Default for AirPlayConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(2),
            server_shutdown_timeout: Duration::from_secs(2),
            event_capacity: 32,
        }
    }
}

impl AirPlayConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> AirPlayConfigBuilder {
        AirPlayConfigBuilder::default()
    }
}

/// Builder for `AirPlayConfig`
#[derive(Debug, Clone, Default)]
pub struct AirPlayConfigBuilder {
    config: AirPlayConfig,
}

impl AirPlayConfigBuilder {
    /// Set connection timeout
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Set remote control keepalive interval, at least [`MIN_KEEPALIVE_INTERVAL`]
    #[must_use]
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.config.keepalive_interval = interval.max(MIN_KEEPALIVE_INTERVAL);
        self
    }

    /// Set local content server shutdown grace period
    #[must_use]
    pub fn server_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.server_shutdown_timeout = timeout;
        self
    }

    /// Set device event channel capacity
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity.max(1);
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> AirPlayConfig {
        self.config
    }
}
