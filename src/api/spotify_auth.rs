use crate::config::Config;
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use tracing::info;
use url::Url;

/// Manual OAuth helper that yields the long-lived refresh token the proxy needs:
/// 1. Build the Spotify authorization URL and print it.
/// 2. User opens it in a browser, approves and gets redirected to the redirect URI (which may fail if it's a dummy).
/// 3. User copies the full redirect URL and pastes it into this CLI.
/// 4. The CLI extracts the `code` param and exchanges it for an access_token + refresh_token.
/// 5. The refresh token is printed for SPOTIFY_REFRESH_TOKEN; nothing is stored.
#[derive(Deserialize)]
struct TokenResponse {
    refresh_token: Option<String>,
    scope: Option<String>,
}

pub const SCOPES: &[&str] = &["user-read-currently-playing", "user-read-playback-state"];

/// Build the authorize URL the user has to open.
pub fn authorize_url(auth_base: &str, client_id: &str, redirect_uri: &str) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/authorize", auth_base.trim_end_matches('/')))?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("scope", &SCOPES.join(" "))
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("show_dialog", "true");
    Ok(url)
}

/// Pull the `code` query parameter out of a pasted redirect URL.
pub fn extract_code(redirect: &str) -> Result<String> {
    let parsed = Url::parse(redirect.trim()).map_err(|e| anyhow!("invalid url pasted: {}", e))?;
    if let Some((_, err)) = parsed.query_pairs().find(|(k, _)| k == "error") {
        return Err(anyhow!("authorization denied: {}", err));
    }
    let code = parsed
        .query_pairs()
        .find(|(k, _)| k == "code")
        .ok_or_else(|| anyhow!("no code in redirect URL"))?
        .1
        .into_owned();
    Ok(code)
}

fn prompt(question: &str) -> Result<String> {
    println!("{}", question);
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

pub async fn run_spotify_auth(cfg: &Config) -> Result<()> {
    let client_id = match cfg.client_id.clone().filter(|s| !s.trim().is_empty()) {
        Some(id) => id,
        None => prompt("Enter your Spotify client_id:")?,
    };
    if client_id.is_empty() {
        return Err(anyhow!("no client_id provided"));
    }
    let client_secret = match cfg.client_secret.clone().filter(|s| !s.trim().is_empty()) {
        Some(s) => s,
        None => prompt("Enter your Spotify client_secret:")?,
    };
    if client_secret.is_empty() {
        return Err(anyhow!("no client_secret provided"));
    }

    let redirect_uri = {
        let answer = prompt("Enter your Spotify redirect URI (leave blank for http://127.0.0.1:8888/):")?;
        if answer.is_empty() {
            "http://127.0.0.1:8888/".to_string()
        } else {
            answer
        }
    };

    let url = authorize_url(&cfg.auth_base, &client_id, &redirect_uri)?;
    println!(
        "Open this URL in your browser and authorize the application:\n\n{}\n",
        url
    );
    println!("After authorizing, you'll be redirected to your redirect URI. Copy the full redirect URL and paste it here.");
    let code = extract_code(&prompt("Paste redirect URL:")?)?;

    // Exchange code for tokens
    let client = Client::new();
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("redirect_uri", redirect_uri.as_str()),
    ];
    let auth_header = format!(
        "Basic {}",
        general_purpose::STANDARD.encode(format!("{}:{}", client_id, client_secret))
    );
    let resp = client
        .post(format!("{}/api/token", cfg.auth_base.trim_end_matches('/')))
        .header("Authorization", auth_header)
        .form(&params)
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        let txt = resp.text().await.unwrap_or_default();
        return Err(anyhow!("token exchange failed: {} => {}", status, txt));
    }

    let tr: TokenResponse = resp.json().await?;
    let refresh_token = tr
        .refresh_token
        .ok_or_else(|| anyhow!("token response carried no refresh_token"))?;
    info!(
        "Spotify authorization complete (scope: {})",
        tr.scope.as_deref().unwrap_or("unknown")
    );
    println!("Add this to your environment or config file:\n");
    println!("SPOTIFY_REFRESH_TOKEN={}", refresh_token);

    Ok(())
}
