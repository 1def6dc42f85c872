use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_AUTH_BASE: &str = "https://accounts.spotify.com";
pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Spotify app + account credentials. Usually supplied through the
    // SPOTIFY_* environment variables rather than the file.
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_auth_base")]
    pub auth_base: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    // Polling client
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
}

/// Complete set of credentials needed to reach the provider.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

fn default_bind_addr() -> String { "127.0.0.1:3000".into() }
fn default_auth_base() -> String { DEFAULT_AUTH_BASE.into() }
fn default_api_base() -> String { DEFAULT_API_BASE.into() }
fn default_log_dir() -> PathBuf { "logs".into() }
fn default_request_timeout() -> u64 { 10 }
fn default_poll_interval() -> u64 { 5000 }
fn default_retry_count() -> u32 { 3 }

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            refresh_token: None,
            bind_addr: default_bind_addr(),
            auth_base: default_auth_base(),
            api_base: default_api_base(),
            log_dir: default_log_dir(),
            request_timeout_secs: default_request_timeout(),
            poll_interval_ms: default_poll_interval(),
            retry_count: default_retry_count(),
        }
    }
}

impl Config {
    pub fn from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&s)?;
        Ok(cfg)
    }

    /// Overlay values from the process environment. Environment wins over the file.
    pub fn apply_env(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SPOTIFY_CLIENT_ID") {
            self.client_id = Some(v);
        }
        if let Some(v) = lookup("SPOTIFY_CLIENT_SECRET") {
            self.client_secret = Some(v);
        }
        if let Some(v) = lookup("SPOTIFY_REFRESH_TOKEN") {
            self.refresh_token = Some(v);
        }
        if let Some(v) = lookup("NOW_PLAYING_BIND") {
            self.bind_addr = v;
        }
    }

    /// Returns `None` when any credential is absent or blank.
    pub fn credentials(&self) -> Option<Credentials> {
        fn present(v: &Option<String>) -> Option<String> {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        }
        Some(Credentials {
            client_id: present(&self.client_id)?,
            client_secret: present(&self.client_secret)?,
            refresh_token: present(&self.refresh_token)?,
        })
    }
}
