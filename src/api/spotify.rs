use super::token::TokenCache;
use super::NowPlayingSource;
use crate::error::UpstreamError;
use crate::models::{CurrentlyPlaying, NowPlayingState};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use tracing::{debug, warn};

/// Spotify "currently playing" fetcher backed by the Web API.
/// The token cache is shared with every other user of the same account.
pub struct SpotifyNowPlaying {
    client: Client,
    tokens: Arc<TokenCache>,
    api_base: String,
}

impl SpotifyNowPlaying {
    pub fn new(client: Client, tokens: Arc<TokenCache>, api_base: &str) -> Self {
        Self {
            client,
            tokens,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/me/player/currently-playing", self.api_base)
    }
}

#[async_trait]
impl NowPlayingSource for SpotifyNowPlaying {
    async fn fetch_now_playing(&self) -> Result<NowPlayingState, UpstreamError> {
        let token = self.tokens.get_access_token().await?;
        let resp = self
            .client
            .get(self.endpoint())
            .header(AUTHORIZATION, format!("Bearer {}", token.value))
            .send()
            .await
            .map_err(UpstreamError::Transport)?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(UpstreamError::Status(status.as_u16()));
        }
        // 4xx covers both "nothing to show" and scope/auth problems; the
        // consumer renders nothing either way.
        if status == StatusCode::NO_CONTENT || status.is_client_error() {
            debug!("currently-playing returned {}; nothing playing", status);
            return Ok(NowPlayingState::NotPlaying);
        }

        let body = match resp.bytes().await {
            Ok(b) => b,
            Err(e) => return Err(UpstreamError::Transport(e)),
        };
        match serde_json::from_slice::<CurrentlyPlaying>(&body) {
            Ok(payload) => Ok(payload.into_state()),
            Err(e) => {
                warn!("unexpected currently-playing payload: {}", e);
                Ok(NowPlayingState::NotPlaying)
            }
        }
    }

    fn name(&self) -> &str {
        "spotify"
    }
}
