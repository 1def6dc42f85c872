use crate::config::Credentials;
use crate::error::AuthError;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Tokens closer than this to expiry are refreshed instead of reused.
pub const SAFETY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .checked_sub_signed(Duration::seconds(SAFETY_MARGIN_SECS))
            .map_or(false, |deadline| now < deadline)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// In-memory access-token cache backed by the refresh-token grant.
///
/// One instance per process, shared behind an `Arc`. Concurrent misses may
/// each hit the token endpoint; the last successful exchange wins.
pub struct TokenCache {
    client: Client,
    credentials: Credentials,
    token_url: String,
    token: Mutex<Option<AccessToken>>,
}

impl TokenCache {
    pub fn new(client: Client, credentials: Credentials, auth_base: &str) -> Self {
        Self {
            client,
            credentials,
            token_url: format!("{}/api/token", auth_base.trim_end_matches('/')),
            token: Mutex::new(None),
        }
    }

    /// Currently cached token, valid or not.
    pub fn cached(&self) -> Option<AccessToken> {
        self.token.lock().ok().and_then(|g| g.clone())
    }

    /// Drop the cached token so the next call refreshes.
    pub fn invalidate(&self) {
        if let Ok(mut g) = self.token.lock() {
            *g = None;
        }
    }

    pub async fn get_access_token(&self) -> Result<AccessToken, AuthError> {
        if let Some(tok) = self.cached() {
            if tok.is_valid_at(Utc::now()) {
                debug!("reusing cached access token (expires {})", tok.expires_at);
                return Ok(tok);
            }
            debug!("access token is near expiry, refreshing");
        }

        let tok = self.refresh().await.map_err(|e| {
            warn!("access token refresh failed: {}", e);
            e
        })?;
        if let Ok(mut g) = self.token.lock() {
            *g = Some(tok.clone());
        }
        Ok(tok)
    }

    async fn refresh(&self) -> Result<AccessToken, AuthError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", self.credentials.refresh_token.as_str()),
        ];
        let auth_header = format!(
            "Basic {}",
            general_purpose::STANDARD.encode(format!(
                "{}:{}",
                self.credentials.client_id, self.credentials.client_secret
            ))
        );
        let requested_at = Utc::now();
        let resp = self
            .client
            .post(&self.token_url)
            .header(AUTHORIZATION, auth_header)
            .form(&params)
            .send()
            .await
            .map_err(AuthError::Transport)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        let tr: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::Decode(e.to_string()))?;
        if tr.access_token.is_empty() {
            return Err(AuthError::Decode("empty access_token".into()));
        }
        let expires_at = Duration::try_seconds(tr.expires_in)
            .and_then(|d| requested_at.checked_add_signed(d))
            .ok_or_else(|| AuthError::Decode(format!("expires_in out of range: {}", tr.expires_in)))?;
        debug!("refreshed access token, expires in {}s", tr.expires_in);
        Ok(AccessToken {
            value: tr.access_token,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_honours_safety_margin() {
        let now = Utc::now();
        let tok = AccessToken {
            value: "t".into(),
            expires_at: now + Duration::seconds(61),
        };
        assert!(tok.is_valid_at(now));
        assert!(!tok.is_valid_at(now + Duration::seconds(1)));
    }
}
