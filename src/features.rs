//! Feature availability of the `AirPlay` front-end

use crate::interface::Features;
use crate::types::{DeviceService, FeatureInfo, FeatureName, FeatureState};

/// Features provided over `AirPlay`
///
/// Only URL playback is offered, and only once the service holds
/// credentials from a previous pairing.
#[derive(Debug, Clone)]
pub struct AirPlayFeatures {
    service: DeviceService,
}

impl AirPlayFeatures {
    /// Feature registry for `service`
    #[must_use]
    pub fn new(service: DeviceService) -> Self {
        Self { service }
    }
}

impl Features for AirPlayFeatures {
    fn get_feature(&self, feature: FeatureName) -> FeatureInfo {
        let state = match feature {
            FeatureName::PlayUrl if self.service.has_credentials() => FeatureState::Available,
            _ => FeatureState::Unavailable,
        };
        FeatureInfo::new(state)
    }
}
