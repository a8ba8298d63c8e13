//! Parser for `AirPlay` TXT record data

use std::collections::HashMap;

/// Parse TXT records from mDNS response
#[must_use]
pub fn parse_txt_records(records: &[String]) -> HashMap<String, String> {
    records
        .iter()
        .filter_map(|record| {
            let mut parts = record.splitn(2, '=');
            let key = parts.next()?.to_string();
            let value = parts.next().unwrap_or("").to_string();
            Some((key, value))
        })
        .collect()
}

/// Parse features flags from TXT record
///
/// The features value can be in hex format: "0x1234567890ABCDEF"
/// or comma-separated: "0x1234,0x5678" (low word first)
#[must_use]
pub fn parse_features_bits(features_str: &str) -> Option<u64> {
    match features_str.split_once(',') {
        Some((lo, hi)) => Some((parse_hex(hi)? << 32) | parse_hex(lo)?),
        None => parse_hex(features_str),
    }
}

/// Parse hex string to u64
fn parse_hex(s: &str) -> Option<u64> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u64::from_str_radix(s, 16).ok()
}

/// Major component of a dotted OS version ("15.4.1" -> 15)
#[must_use]
pub fn parse_os_major_version(version: &str) -> Option<u32> {
    version.split('.').next()?.trim().parse().ok()
}

/// Known TXT record keys for `AirPlay`
pub mod txt_keys {
    /// Device ID (MAC address format)
    pub const DEVICE_ID: &str = "deviceid";
    /// Features bitmask
    pub const FEATURES: &str = "features";
    /// Model identifier
    pub const MODEL: &str = "model";
    /// Operating system version
    pub const OS_VERSION: &str = "osvers";
    /// Public key (for pairing)
    pub const PUBLIC_KEY: &str = "pk";
}

/// `AirPlay` feature bits
///
/// Reference: <https://emanuelecozzi.net/docs/airplay2/features>
pub mod feature_bits {
    /// Video supported
    pub const VIDEO: u64 = 1 << 0;
    /// Audio supported
    pub const AUDIO: u64 = 1 << 9;
    /// Supports legacy pairing
    pub const LEGACY_PAIRING: u64 = 1 << 27;
    /// System pairing
    pub const SYSTEM_PAIRING: u64 = 1 << 43;
    /// Supports `AirPlay` 2 / APv2.5
    pub const AIRPLAY_2: u64 = 1 << 48;
    /// Supports `CoreUtils` pairing and encryption
    pub const COREUTILS_PAIRING: u64 = 1 << 51;
    /// Supports transient pairing
    pub const TRANSIENT_PAIRING: u64 = 1 << 52;
}
