pub mod mock;
pub mod spotify;
pub mod spotify_auth;
pub mod token;

use crate::error::UpstreamError;
use crate::models::NowPlayingState;

/// Source of the current playback state, as seen by the proxy endpoint.
/// Implementations: spotify::SpotifyNowPlaying and mock::StaticSource.
#[async_trait::async_trait]
pub trait NowPlayingSource: Send + Sync {
    /// Fetch and normalize the current state. Anything that is merely
    /// "nothing to show" comes back as `Ok(NotPlaying)`.
    async fn fetch_now_playing(&self) -> Result<NowPlayingState, UpstreamError>;

    /// Return the source's name (for logging)
    fn name(&self) -> &str;
}
