use serde::{Deserialize, Serialize};

/// Features a protocol front-end may provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureName {
    /// Start playback
    Play,
    /// Pause playback
    Pause,
    /// Toggle between play and pause
    PlayPause,
    /// Stop playback
    Stop,
    /// Skip to next item
    Next,
    /// Skip to previous item
    Previous,
    /// Seek to absolute position
    SetPosition,
    /// Set absolute volume
    SetVolume,
    /// Step volume up
    VolumeUp,
    /// Step volume down
    VolumeDown,
    /// Push notifications of playing state
    PushUpdates,
    /// Artwork of what is playing
    Artwork,
    /// Play media from a URL
    PlayUrl,
}

/// Availability of a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureState {
    /// Support is not known
    Unknown,
    /// Not supported by the device
    Unsupported,
    /// Supported but not usable right now
    Unavailable,
    /// Supported and usable
    Available,
}

/// State of a single feature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureInfo {
    /// Current state
    pub state: FeatureState,
}

impl FeatureInfo {
    /// Create feature info with the given state
    #[must_use]
    pub fn new(state: FeatureState) -> Self {
        Self { state }
    }

    /// Whether the feature can be used right now
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.state == FeatureState::Available
    }
}
