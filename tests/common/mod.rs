#![allow(dead_code)]

use axum::body::Body;
use axum::extract::State;
use axum::http::Response;
use axum::routing::any;
use axum::Router;
use now_playing_proxy::api::token::TokenCache;
use now_playing_proxy::config::Credentials;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// base64("test_id:test_secret")
pub const BASIC_AUTH: &str = "Basic dGVzdF9pZDp0ZXN0X3NlY3JldA==";

pub fn credentials() -> Credentials {
    Credentials {
        client_id: "test_id".into(),
        client_secret: "test_secret".into(),
        refresh_token: "refresh-spotify".into(),
    }
}

pub fn token_cache(auth_base: &str) -> Arc<TokenCache> {
    Arc::new(TokenCache::new(reqwest::Client::new(), credentials(), auth_base))
}

pub fn token_body(access_token: &str, expires_in: i64) -> String {
    json!({"access_token": access_token, "token_type": "Bearer", "expires_in": expires_in}).to_string()
}

/// The provider payload used throughout: one track, one image, one artist.
pub fn track_payload() -> Value {
    json!({
        "currently_playing_type": "track",
        "is_playing": true,
        "item": {
            "name": "Song",
            "album": {
                "name": "Album",
                "images": [{"url": "u"}],
                "artists": [{"name": "Art"}]
            },
            "external_urls": {"spotify": "s"}
        }
    })
}

pub fn playing_body() -> Value {
    json!({
        "isPlaying": true,
        "title": "Song",
        "artist": "Art",
        "album": "Album",
        "albumImageUrl": "u",
        "songUrl": "s"
    })
}

/// One canned answer of the scripted proxy.
#[derive(Clone)]
pub struct Reply {
    pub status: u16,
    pub retry_after: Option<&'static str>,
    pub body: Value,
    pub delay: Duration,
}

impl Reply {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, retry_after: None, body, delay: Duration::ZERO }
    }

    pub fn status(status: u16) -> Self {
        Self { status, retry_after: None, body: json!({}), delay: Duration::ZERO }
    }

    pub fn rate_limited(retry_after: Option<&'static str>) -> Self {
        Self { status: 429, retry_after, body: json!({}), delay: Duration::ZERO }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Answers requests with `replies` in order; the last reply repeats.
pub struct Scripted {
    replies: Vec<Reply>,
    hits: AtomicUsize,
    completed: AtomicUsize,
}

impl Scripted {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

async fn scripted_handler(State(script): State<Arc<Scripted>>) -> Response<Body> {
    let n = script.hits.fetch_add(1, Ordering::SeqCst);
    let reply = script
        .replies
        .get(n)
        .or_else(|| script.replies.last())
        .cloned()
        .expect("script has at least one reply");
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    script.completed.fetch_add(1, Ordering::SeqCst);
    let mut builder = Response::builder()
        .status(reply.status)
        .header("content-type", "application/json");
    if let Some(ra) = reply.retry_after {
        builder = builder.header("retry-after", ra);
    }
    builder.body(Body::from(reply.body.to_string())).expect("response")
}

/// Spawn a stand-in for the proxy endpoint; returns its URL.
pub async fn spawn_scripted(replies: Vec<Reply>) -> (String, Arc<Scripted>) {
    let script = Arc::new(Scripted {
        replies,
        hits: AtomicUsize::new(0),
        completed: AtomicUsize::new(0),
    });
    let app = Router::new()
        .route("/api/now-playing", any(scripted_handler))
        .with_state(script.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{}/api/now-playing", addr), script)
}
