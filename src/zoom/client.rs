use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::{OffsetDateTime, UtcOffset, macros::format_description};

use crate::{cache::Cache, config::ZoomConfig};

use super::CreatedMeeting;

const TOKEN_KEY: &str = "zoom_token";
/// Cached tokens are dropped this long before Zoom would expire them.
const TOKEN_MARGIN_SECS: u64 = 300;

#[derive(thiserror::Error, Debug)]
pub enum ZoomError {
    #[error("Zoom credentials are not configured")]
    NotConfigured,
    #[error("Token generation failed: {status} - {body}")]
    Token { status: u16, body: String },
    #[error("Meeting creation failed: {status} - {body}")]
    Create { status: u16, body: String },
    #[error("Connection test failed: {status} - {body}")]
    Api { status: u16, body: String },
    #[error("zoom request error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionSummary {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub account_id: Option<String>,
    pub read_scope: bool,
}

/// Server-to-server OAuth client for the Zoom REST API.
#[derive(Clone)]
pub struct ZoomClient {
    http: reqwest::Client,
    cache: Cache,
    config: ZoomConfig,
}

/// Zoom wants `yyyy-MM-ddTHH:mm:ssZ` in UTC.
pub fn zoom_time(at: OffsetDateTime) -> String {
    at.to_offset(UtcOffset::UTC)
        .format(format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z"))
        .unwrap_or_default()
}

fn settings_block() -> Value {
    json!({
        "host_video": true,
        "participant_video": true,
        "waiting_room": true,
        "join_before_host": false,
        "mute_upon_entry": true,
        "approval_type": 0,
        "audio": "both",
        "auto_recording": "none",
        "enforce_login": false,
        "meeting_authentication": false,
        "use_pmi": false,
    })
}

impl ZoomClient {
    pub fn new(http: reqwest::Client, cache: Cache, config: ZoomConfig) -> Self {
        Self { http, cache, config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.account_id.is_some() && self.config.client_id.is_some() && self.config.client_secret.is_some()
    }

    pub async fn clear_token(&self) {
        if let Err(e) = self.cache.delete(TOKEN_KEY).await {
            tracing::warn!(error = ?e, "could not clear cached zoom token");
        }
    }

    pub async fn access_token(&self, force_refresh: bool) -> Result<String, ZoomError> {
        let (Some(account_id), Some(client_id), Some(client_secret)) = (
            self.config.account_id.as_deref(),
            self.config.client_id.as_deref(),
            self.config.client_secret.as_deref(),
        ) else {
            return Err(ZoomError::NotConfigured);
        };

        if force_refresh {
            self.clear_token().await;
        } else {
            match self.cache.get(TOKEN_KEY).await {
                Ok(Some(token)) => return Ok(token),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = ?e, "could not read cached zoom token"),
            }
        }

        let res = self
            .http
            .post(format!("{}/oauth/token", self.config.oauth_url))
            .query(&[("grant_type", "account_credentials"), ("account_id", account_id)])
            .basic_auth(client_id, Some(client_secret))
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            tracing::error!(%status, body, "zoom token request failed");
            return Err(ZoomError::Token { status: status.as_u16(), body });
        }

        let token: TokenResponse = res.json().await?;
        let expires_in = token.expires_in.unwrap_or(3600);
        let ttl = Duration::from_secs(expires_in.saturating_sub(TOKEN_MARGIN_SECS).max(1));
        if let Err(e) = self.cache.set_ex(TOKEN_KEY, &token.access_token, ttl).await {
            tracing::warn!(error = ?e, "could not cache zoom token");
        }
        tracing::info!(expires_in, "new zoom token issued");
        Ok(token.access_token)
    }

    /// Creates a scheduled (type 2) meeting on the account's own user.
    ///
    /// A scope complaint usually means the cached token predates a scope change,
    /// so it is retried exactly once with a fresh token.
    pub async fn create_meeting(
        &self,
        topic: &str,
        duration: i64,
        start_time: OffsetDateTime,
        agenda: &str,
    ) -> Result<CreatedMeeting, ZoomError> {
        let payload = json!({
            "topic": topic,
            "type": 2,
            "duration": duration,
            "agenda": agenda,
            "start_time": zoom_time(start_time),
            "settings": settings_block(),
        });

        let mut force_refresh = false;
        loop {
            let token = self.access_token(force_refresh).await?;
            let res = self
                .http
                .post(format!("{}/v2/users/me/meetings", self.config.api_url))
                .bearer_auth(&token)
                .json(&payload)
                .timeout(Duration::from_secs(30))
                .send()
                .await?;

            let status = res.status();
            if status == reqwest::StatusCode::CREATED {
                let created: CreatedMeeting = res.json().await?;
                tracing::info!(zoom_id = created.zoom_id(), "zoom meeting created");
                return Ok(created);
            }

            let body = res.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::BAD_REQUEST
                && body.to_lowercase().contains("scopes")
                && !force_refresh
            {
                tracing::warn!("zoom scope error, retrying with a fresh token");
                force_refresh = true;
                continue;
            }

            tracing::error!(%status, body, "zoom meeting creation failed");
            return Err(ZoomError::Create { status: status.as_u16(), body });
        }
    }

    /// Fetches a fresh token and reads the account's own user.
    pub async fn test_connection(&self) -> Result<ConnectionSummary, ZoomError> {
        let token = self.access_token(true).await?;

        let res = self
            .http
            .get(format!("{}/v2/users/me", self.config.api_url))
            .bearer_auth(&token)
            .timeout(Duration::from_secs(30))
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ZoomError::Api { status: status.as_u16(), body });
        }
        let me: Value = res.json().await?;

        let read_scope = self
            .http
            .get(format!("{}/v2/users/me/meetings", self.config.api_url))
            .bearer_auth(&token)
            .send()
            .await
            .is_ok_and(|res| res.status().is_success());

        let field = |key: &str| match me.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        Ok(ConnectionSummary {
            user_id: field("id"),
            email: field("email"),
            account_id: field("account_id"),
            read_scope,
        })
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn start_times_are_utc() {
        assert_eq!(zoom_time(datetime!(2025-03-01 09:30:05 +02:00)), "2025-03-01T07:30:05Z");
    }

    #[tokio::test]
    async fn missing_credentials_are_reported() {
        let client = ZoomClient::new(reqwest::Client::new(), Cache::memory(), ZoomConfig::default());
        assert!(!client.is_configured());
        assert!(matches!(client.access_token(false).await, Err(ZoomError::NotConfigured)));
    }

    #[tokio::test]
    async fn cached_token_is_reused() {
        let cache = Cache::memory();
        cache.set(TOKEN_KEY, "cached").await.unwrap();
        let config = ZoomConfig {
            account_id: Some("acct".to_owned()),
            client_id: Some("id".to_owned()),
            client_secret: Some("secret".to_owned()),
            // unreachable; a cache hit must not touch the network
            oauth_url: "http://127.0.0.1:9".to_owned(),
            api_url: "http://127.0.0.1:9".to_owned(),
        };
        let client = ZoomClient::new(reqwest::Client::new(), cache, config);
        assert_eq!(client.access_token(false).await.unwrap(), "cached");
    }
}
