//! Stored credential parsing

use std::fmt;

use crate::discovery::parser::{feature_bits, parse_features_bits, txt_keys};
use crate::types::DeviceService;

/// Kind of authentication a set of credentials allows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthenticationType {
    /// No credentials, cannot authenticate
    Null,
    /// Legacy `AirPlay` pairing (seed and identifier only)
    Legacy,
    /// Persistent HAP pairing
    Hap,
    /// Transient HAP pairing, no stored keys needed
    Transient,
}

/// Typed credential material derived from a stored credential blob
#[derive(Clone, PartialEq, Eq)]
pub struct HapCredentials {
    /// Device long-term public key
    pub ltpk: Vec<u8>,
    /// Our long-term secret key (or legacy seed)
    pub ltsk: Vec<u8>,
    /// Device identifier
    pub atv_id: Vec<u8>,
    /// Our client identifier
    pub client_id: Vec<u8>,
    kind: AuthenticationType,
}

impl HapCredentials {
    /// Build credentials from raw fields, deriving the authentication type
    #[must_use]
    pub fn new(ltpk: Vec<u8>, ltsk: Vec<u8>, atv_id: Vec<u8>, client_id: Vec<u8>) -> Self {
        let kind = if ltpk.is_empty() && ltsk.is_empty() && atv_id.is_empty() && client_id.is_empty()
        {
            AuthenticationType::Null
        } else if ltpk.is_empty() && atv_id.is_empty() {
            AuthenticationType::Legacy
        } else {
            AuthenticationType::Hap
        };

        Self {
            ltpk,
            ltsk,
            atv_id,
            client_id,
            kind,
        }
    }

    /// Credentials that cannot authenticate anything
    #[must_use]
    pub fn none() -> Self {
        Self::new(Vec::new(), Vec::new(), Vec::new(), Vec::new())
    }

    /// Credentials for transient pairing
    #[must_use]
    pub fn transient() -> Self {
        Self {
            kind: AuthenticationType::Transient,
            ..Self::none()
        }
    }

    /// Authentication type these credentials allow
    #[must_use]
    pub fn auth_type(&self) -> AuthenticationType {
        self.kind
    }
}

impl Default for HapCredentials {
    fn default() -> Self {
        Self::none()
    }
}

// Key material stays out of logs
impl fmt::Debug for HapCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HapCredentials")
            .field("kind", &self.kind)
            .field("atv_id", &hex::encode(&self.atv_id))
            .field("client_id", &hex::encode(&self.client_id))
            .finish_non_exhaustive()
    }
}

/// Renders the storage format accepted by [`parse_credentials`]
impl fmt::Display for HapCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AuthenticationType::Null | AuthenticationType::Transient => Ok(()),
            AuthenticationType::Legacy => write!(
                f,
                "{}:{}",
                hex::encode(&self.client_id),
                hex::encode(&self.ltsk)
            ),
            AuthenticationType::Hap => write!(
                f,
                "{}:{}:{}:{}",
                hex::encode(&self.ltpk),
                hex::encode(&self.ltsk),
                hex::encode(&self.atv_id),
                hex::encode(&self.client_id)
            ),
        }
    }
}

/// Parse a stored credential blob
///
/// Accepts `ltpk:ltsk:atv_id:client_id` (HAP) and `client_id:seed` (legacy),
/// every field hex encoded. Absent or unparsable input yields credentials of
/// type [`AuthenticationType::Null`].
#[must_use]
pub fn parse_credentials(blob: Option<&str>) -> HapCredentials {
    let Some(blob) = blob.map(str::trim).filter(|b| !b.is_empty()) else {
        return HapCredentials::none();
    };

    let fields: Result<Vec<Vec<u8>>, _> = blob.split(':').map(hex::decode).collect();
    match fields.as_deref() {
        Ok([client_id, seed]) => {
            HapCredentials::new(Vec::new(), seed.clone(), Vec::new(), client_id.clone())
        }
        Ok([ltpk, ltsk, atv_id, client_id]) => {
            HapCredentials::new(ltpk.clone(), ltsk.clone(), atv_id.clone(), client_id.clone())
        }
        Ok(fields) => {
            tracing::debug!("Ignoring credentials with {} fields", fields.len());
            HapCredentials::none()
        }
        Err(e) => {
            tracing::debug!("Ignoring malformed credentials: {}", e);
            HapCredentials::none()
        }
    }
}

/// Credentials to use for a service
///
/// Stored credentials win. Without them, devices advertising system or
/// `CoreUtils` pairing accept transient pairing.
#[must_use]
pub fn extract_credentials(service: &DeviceService) -> HapCredentials {
    if service.has_credentials() {
        return parse_credentials(service.credentials.as_deref());
    }

    let flags = service
        .properties
        .get(txt_keys::FEATURES)
        .and_then(|features| parse_features_bits(features))
        .unwrap_or(0);

    if flags & (feature_bits::SYSTEM_PAIRING | feature_bits::COREUTILS_PAIRING) != 0 {
        HapCredentials::transient()
    } else {
        HapCredentials::none()
    }
}
