//! Discovery glue: turns `AirPlay` mDNS records into device services
//!
//! Browsing the network is left to the caller; this module only maps what
//! was found.

pub mod parser;


pub use parser::parse_txt_records;

use std::collections::HashMap;

use crate::types::{DeviceService, Protocol};

/// Service type for `AirPlay` discovery
pub const AIRPLAY_SERVICE_TYPE: &str = "_airplay._tcp.local";

/// A resolved mDNS service record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdnsService {
    /// Service type, without trailing dot
    pub service_type: String,
    /// Instance name
    pub name: String,
    /// Service port
    pub port: u16,
    /// TXT properties
    pub properties: HashMap<String, String>,
}

impl From<&mdns_sd::ServiceInfo> for MdnsService {
    fn from(info: &mdns_sd::ServiceInfo) -> Self {
        let service_type = info.get_type().trim_end_matches('.').to_string();
        let name = info
            .get_fullname()
            .strip_suffix(info.get_type())
            .unwrap_or(info.get_fullname())
            .trim_end_matches('.')
            .to_string();
        let properties = info
            .get_properties()
            .iter()
            .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
            .collect();

        Self {
            service_type,
            name,
            port: info.get_port(),
            properties,
        }
    }
}

/// Maps a discovered record to a display name and service
pub type ScanHandler = fn(&MdnsService) -> (String, DeviceService);

/// Unique identifier of a discovered service, if it advertises one
#[must_use]
pub fn unique_id(service: &MdnsService) -> Option<String> {
    if service.service_type == AIRPLAY_SERVICE_TYPE {
        service.properties.get(parser::txt_keys::DEVICE_ID).cloned()
    } else {
        None
    }
}

/// Parse an `AirPlay` record into a service
#[must_use]
pub fn airplay_service_handler(service: &MdnsService) -> (String, DeviceService) {
    let device_service = DeviceService::new(unique_id(service), Protocol::AirPlay, service.port)
        .with_properties(service.properties.clone());
    (service.name.clone(), device_service)
}

/// Handlers used for scanning, keyed by service type
#[must_use]
pub fn scan() -> HashMap<&'static str, ScanHandler> {
    let mut handlers: HashMap<&'static str, ScanHandler> = HashMap::new();
    handlers.insert(AIRPLAY_SERVICE_TYPE, airplay_service_handler);
    handlers
}
