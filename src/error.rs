//! Error types for the now-playing pipeline.
//!
//! Shape mismatches in provider payloads are not errors: they normalize to
//! `NowPlayingState::NotPlaying`.

use std::time::Duration;
use thiserror::Error;

/// Refresh-token exchange failed. The token cache is left untouched.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("token endpoint unreachable: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Failed to refresh token: {status} - {body}")]
    Rejected { status: u16, body: String },

    #[error("token response could not be decoded: {0}")]
    Decode(String),
}

/// The now-playing call failed in a way worth reporting upstream.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("now-playing endpoint unreachable: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("now-playing endpoint returned {0}")]
    Status(u16),
}

/// One request from the polling client to the proxy failed.
#[derive(Error, Debug)]
pub enum PollError {
    #[error("proxy unreachable: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("proxy returned {0}")]
    Status(u16),

    #[error("rate_limited: retry_after={retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("proxy response could not be decoded: {0}")]
    Decode(String),
}
