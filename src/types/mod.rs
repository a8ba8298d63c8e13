//! Core types

mod config;
mod device;
mod features;


pub use config::{AirPlayConfig, AirPlayConfigBuilder, MIN_KEEPALIVE_INTERVAL};
pub use device::{DeviceConfig, DeviceService, Protocol};
pub use features::{FeatureInfo, FeatureName, FeatureState};
