use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Protocol identity used to key services, registrations and front-ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Protocol {
    /// Digital Media Access Protocol
    Dmap,
    /// Media Remote Protocol
    Mrp,
    /// `AirPlay`
    AirPlay,
    /// Companion link
    Companion,
    /// Remote Audio Output Protocol (`AirPlay` 1 audio)
    Raop,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Dmap => "DMAP",
            Self::Mrp => "MRP",
            Self::AirPlay => "AirPlay",
            Self::Companion => "Companion",
            Self::Raop => "RAOP",
        };
        f.write_str(name)
    }
}

/// A protocol service exposed by a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceService {
    /// Unique identifier (from TXT record), unknown for tunneled services
    pub identifier: Option<String>,

    /// Protocol served on this endpoint
    pub protocol: Protocol,

    /// Service port, 0 when the service has no endpoint of its own
    pub port: u16,

    /// Raw TXT record properties
    #[serde(default)]
    pub properties: HashMap<String, String>,

    /// Opaque credential material from a previous pairing
    #[serde(default)]
    pub credentials: Option<String>,
}

impl DeviceService {
    /// Create a service without properties or credentials
    #[must_use]
    pub fn new(identifier: Option<String>, protocol: Protocol, port: u16) -> Self {
        Self {
            identifier,
            protocol,
            port,
            properties: HashMap::new(),
            credentials: None,
        }
    }

    /// Attach discovered TXT properties
    #[must_use]
    pub fn with_properties(mut self, properties: HashMap<String, String>) -> Self {
        self.properties = properties;
        self
    }

    /// Attach stored credentials
    #[must_use]
    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }

    /// Whether the service carries a non-empty credential blob
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.credentials.as_deref().is_some_and(|c| !c.is_empty())
    }

    /// Fill in anything this service lacks from `other`
    fn merge(&mut self, other: DeviceService) {
        if self.identifier.is_none() {
            self.identifier = other.identifier;
        }
        if self.port == 0 {
            self.port = other.port;
        }
        if other.credentials.is_some() {
            self.credentials = other.credentials;
        }
        self.properties.extend(other.properties);
    }
}

/// Configuration of one device: its address and every service it exposes
///
/// Shared read-only by the front-ends, except for the remote control bridge
/// which adds the tunneled protocol's placeholder service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device address
    pub address: IpAddr,

    /// Human-readable device name
    pub name: String,

    services: BTreeMap<Protocol, DeviceService>,
}

impl DeviceConfig {
    /// Create a configuration with no services
    #[must_use]
    pub fn new(address: IpAddr, name: impl Into<String>) -> Self {
        Self {
            address,
            name: name.into(),
            services: BTreeMap::new(),
        }
    }

    /// Add a service, merging into an existing one of the same protocol
    pub fn add_service(&mut self, service: DeviceService) {
        if let Some(existing) = self.services.get_mut(&service.protocol) {
            existing.merge(service);
        } else {
            self.services.insert(service.protocol, service);
        }
    }

    /// Look up the service for a protocol
    #[must_use]
    pub fn get_service(&self, protocol: Protocol) -> Option<&DeviceService> {
        self.services.get(&protocol)
    }

    /// All configured services
    pub fn services(&self) -> impl Iterator<Item = &DeviceService> {
        self.services.values()
    }

    /// Device identifier, taken from the first service that has one
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        self.services
            .values()
            .find_map(|service| service.identifier.as_deref())
    }
}
