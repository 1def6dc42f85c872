mod common;

use mockito::{Mock, Server, ServerGuard};
use now_playing_proxy::api::spotify::SpotifyNowPlaying;
use now_playing_proxy::api::NowPlayingSource;
use now_playing_proxy::error::UpstreamError;
use now_playing_proxy::models::NowPlayingState;
use serde_json::json;

async fn token_mock(server: &mut ServerGuard) -> Mock {
    server
        .mock("POST", "/api/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(common::token_body("T1", 3600))
        .create_async()
        .await
}

fn fetcher(server: &ServerGuard) -> SpotifyNowPlaying {
    SpotifyNowPlaying::new(
        reqwest::Client::new(),
        common::token_cache(&server.url()),
        &server.url(),
    )
}

async fn fetch_with_status(status: usize, body: &str) -> Result<NowPlayingState, UpstreamError> {
    let mut server = Server::new_async().await;
    let _t = token_mock(&mut server).await;
    let _m = server
        .mock("GET", "/me/player/currently-playing")
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await;
    fetcher(&server).fetch_now_playing().await
}

#[tokio::test]
async fn track_payload_becomes_playing() {
    let mut server = Server::new_async().await;
    let _t = token_mock(&mut server).await;
    let m = server
        .mock("GET", "/me/player/currently-playing")
        .match_header("authorization", "Bearer T1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(common::track_payload().to_string())
        .create_async()
        .await;

    let state = fetcher(&server).fetch_now_playing().await.expect("state");
    let track = state.track().expect("playing");
    assert_eq!(track.title, "Song");
    assert_eq!(track.artist, "Art");
    assert_eq!(track.album, "Album");
    assert_eq!(track.album_image_url.as_deref(), Some("u"));
    assert_eq!(track.song_url, "s");
    assert!(track.is_playing);
    m.assert_async().await;
}

#[tokio::test]
async fn token_is_shared_across_fetches() {
    let mut server = Server::new_async().await;
    let t = server
        .mock("POST", "/api/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(common::token_body("T1", 3600))
        .expect(1)
        .create_async()
        .await;
    let _m = server
        .mock("GET", "/me/player/currently-playing")
        .with_status(204)
        .expect(2)
        .create_async()
        .await;

    let f = fetcher(&server);
    f.fetch_now_playing().await.expect("first");
    f.fetch_now_playing().await.expect("second");
    t.assert_async().await;
}

#[tokio::test]
async fn no_content_is_not_playing() {
    let state = fetch_with_status(204, "").await.expect("state");
    assert_eq!(state, NowPlayingState::NotPlaying);
}

#[tokio::test]
async fn client_errors_are_not_playing() {
    for status in [400, 401, 403, 404, 429] {
        let state = fetch_with_status(status, r#"{"error":{"status":400}}"#)
            .await
            .unwrap_or_else(|e| panic!("status {} should not fail: {}", status, e));
        assert_eq!(state, NowPlayingState::NotPlaying, "status {}", status);
    }
}

#[tokio::test]
async fn server_errors_are_upstream_errors() {
    for status in [500, 502, 503] {
        let err = fetch_with_status(status, "{}").await.unwrap_err();
        assert!(
            matches!(err, UpstreamError::Status(s) if s as usize == status),
            "status {} gave {:?}",
            status,
            err
        );
    }
}

#[tokio::test]
async fn non_track_payload_is_not_playing() {
    let body = json!({
        "currently_playing_type": "ad",
        "is_playing": true,
        "item": null
    });
    let state = fetch_with_status(200, &body.to_string()).await.expect("state");
    assert_eq!(state, NowPlayingState::NotPlaying);
}

#[tokio::test]
async fn malformed_payload_is_not_playing() {
    let state = fetch_with_status(200, "not json at all").await.expect("state");
    assert_eq!(state, NowPlayingState::NotPlaying);
}

#[tokio::test]
async fn token_failure_is_upstream_auth_error() {
    let mut server = Server::new_async().await;
    let _t = server
        .mock("POST", "/api/token")
        .with_status(400)
        .with_body(r#"{"error":"invalid_grant"}"#)
        .create_async()
        .await;
    let m = server
        .mock("GET", "/me/player/currently-playing")
        .expect(0)
        .create_async()
        .await;

    let err = fetcher(&server).fetch_now_playing().await.unwrap_err();
    assert!(matches!(err, UpstreamError::Auth(_)));
    m.assert_async().await;
}

#[tokio::test]
async fn unreachable_api_is_transport_error() {
    let mut server = Server::new_async().await;
    let _t = token_mock(&mut server).await;
    let f = SpotifyNowPlaying::new(
        reqwest::Client::new(),
        common::token_cache(&server.url()),
        "http://127.0.0.1:1",
    );
    let err = f.fetch_now_playing().await.unwrap_err();
    assert!(matches!(err, UpstreamError::Transport(_)));
}
