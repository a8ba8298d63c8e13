use async_trait::async_trait;

use crate::error::AirPlayError;
use crate::net::HttpConnection;

/// Drives playback of a URL over a verified connection
///
/// The request/response exchange with the device lives behind this trait.
#[async_trait]
pub trait MediaPlayer: Send + Sync {
    /// Play `url` from `position` seconds and wait until playback ends
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError` if the device rejects or aborts playback
    async fn play_url(
        &self,
        connection: &mut HttpConnection,
        url: &str,
        position: u32,
    ) -> Result<(), AirPlayError>;
}
