//! HTTP boundary the display surface polls.
//!
//! Every provider failure is answered with `200 {"isPlaying":false}`: the
//! consumer renders nothing for both "provider down" and "nothing playing".

use crate::api::spotify::SpotifyNowPlaying;
use crate::api::token::TokenCache;
use crate::api::NowPlayingSource;
use crate::config::Config;
use crate::models::NowPlayingResponse;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{debug, error, info, warn};

pub const NOW_PLAYING_PATH: &str = "/api/now-playing";
pub const CACHE_CONTROL_VALUE: &str = "public, s-maxage=30, stale-while-revalidate=15";

/// Shared handler state. `source` is `None` when credentials were missing at startup.
#[derive(Clone)]
pub struct AppState {
    source: Option<Arc<dyn NowPlayingSource>>,
}

impl AppState {
    pub fn new(source: Arc<dyn NowPlayingSource>) -> Self {
        Self { source: Some(source) }
    }

    /// State for a process started without credentials; every request gets a 500.
    pub fn unconfigured() -> Self {
        Self { source: None }
    }

    /// Build the Spotify-backed state: one HTTP client and one token cache for the process.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let Some(credentials) = cfg.credentials() else {
            error!("Missing Spotify configuration (client id, client secret or refresh token)");
            return Ok(Self::unconfigured());
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .context("building HTTP client")?;
        let tokens = Arc::new(TokenCache::new(client.clone(), credentials, &cfg.auth_base));
        let fetcher = SpotifyNowPlaying::new(client, tokens, &cfg.api_base);
        Ok(Self::new(Arc::new(fetcher)))
    }

    pub fn is_configured(&self) -> bool {
        self.source.is_some()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(NOW_PLAYING_PATH, any(now_playing))
        .route("/health", get(health))
        .with_state(state)
}

async fn now_playing(method: Method, State(state): State<AppState>) -> Response {
    if method != Method::GET {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(NowPlayingResponse::error("Method not allowed")),
        )
            .into_response();
    }

    let Some(source) = state.source.as_ref() else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(NowPlayingResponse::error("Missing configuration")),
        )
            .into_response();
    };

    let body = match source.fetch_now_playing().await {
        Ok(now) => {
            debug!("{} now-playing: {:?}", source.name(), now);
            NowPlayingResponse::from(&now)
        }
        Err(e) => {
            error!("{} API error: {}", source.name(), e);
            NowPlayingResponse::not_playing()
        }
    };

    (
        [(header::CACHE_CONTROL, CACHE_CONTROL_VALUE)],
        Json(body),
    )
        .into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Bind the configured address and serve until Ctrl+C / SIGTERM.
pub async fn serve(cfg: &Config) -> Result<()> {
    let state = AppState::from_config(cfg)?;
    if !state.is_configured() {
        warn!("Serving without credentials; {} will answer 500", NOW_PLAYING_PATH);
    }
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    info!("Starting HTTP server on {}", cfg.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
