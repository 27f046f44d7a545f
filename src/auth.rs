//! OAuth2 client-credentials token management.
//!
//! The [`TokenManager`] owns the only cached bearer token. A cached token is
//! handed out without touching the network until it reaches its (buffered)
//! expiry, after which the next call performs a fresh grant.

use crate::config::SyncConfig;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};

/// Tokens are treated as expired this long before the server says so.
pub const EXPIRY_BUFFER_SECS: i64 = 60;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid token response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

/// Bearer token with its effective expiry
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Build a token from a grant issued at `issued_at`, applying the safety buffer.
    pub fn from_grant(value: String, expires_in_secs: u64, issued_at: DateTime<Utc>) -> Self {
        // Clamp absurd lifetimes so the arithmetic below cannot overflow.
        let lifetime = expires_in_secs.min(u64::from(u32::MAX)) as i64;
        let expires_at = issued_at
            .checked_add_signed(Duration::seconds(lifetime - EXPIRY_BUFFER_SECS))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { value, expires_at }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

// Keeps the secret out of logs.
impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Successful client-credentials grant body
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Obtains and caches the bearer token for the Classy API.
pub struct TokenManager {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    cached: Option<AccessToken>,
}

impl TokenManager {
    pub fn new(config: &SyncConfig) -> Result<Self, TokenError> {
        let client = reqwest::Client::builder()
            .timeout(config.http.token_timeout())
            .user_agent(concat!("classy-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            token_url: config.classy.token_url.clone(),
            client_id: config.classy.client_id.clone(),
            client_secret: config.classy.client_secret.clone(),
            cached: None,
        })
    }

    /// Replace the cached token (used when a token is obtained out of band).
    pub fn with_cached_token(mut self, token: AccessToken) -> Self {
        self.cached = Some(token);
        self
    }

    pub fn cached_token(&self) -> Option<&AccessToken> {
        self.cached.as_ref()
    }

    /// Return a valid token, requesting a new one only if the cache is stale.
    pub async fn get_token(&mut self) -> Result<AccessToken, TokenError> {
        if let Some(token) = &self.cached {
            if token.is_valid_at(Utc::now()) {
                debug!("Reusing cached access token (expires {})", token.expires_at);
                return Ok(token.clone());
            }
        }

        match self.request_token().await {
            Ok(token) => {
                info!("Successfully obtained new access token");
                self.cached = Some(token.clone());
                Ok(token)
            }
            Err(e) => {
                error!("Failed to get access token: {}", e);
                Err(e)
            }
        }
    }

    async fn request_token(&self) -> Result<AccessToken, TokenError> {
        let issued_at = Utc::now();
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self.client.post(&self.token_url).form(&form).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TokenError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_token_response(&body, issued_at)
    }
}

fn parse_token_response(body: &str, issued_at: DateTime<Utc>) -> Result<AccessToken, TokenError> {
    let grant: TokenResponse = serde_json::from_str(body)?;
    Ok(AccessToken::from_grant(
        grant.access_token,
        grant.expires_in,
        issued_at,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub_http::StubServer;

    fn test_config(token_url: &str) -> SyncConfig {
        let mut config = SyncConfig::from_toml_str(
            r#"
            [classy]
            client_id = "id"
            client_secret = "secret"
            campaign_id = "1"
            [http]
            token_timeout_secs = 2
            "#,
        )
        .unwrap();
        config.classy.token_url = token_url.to_string();
        config
    }

    // Nothing listens on the discard port, so any grant attempt fails fast.
    const UNREACHABLE: &str = "http://127.0.0.1:9/oauth2/auth";

    #[test]
    fn test_expiry_applies_buffer() {
        let issued = Utc::now();
        let token = AccessToken::from_grant("abc".into(), 3600, issued);
        assert_eq!(token.expires_at(), issued + Duration::seconds(3540));
    }

    #[test]
    fn test_token_valid_until_buffered_expiry() {
        let issued = Utc::now();
        let token = AccessToken::from_grant("abc".into(), 3600, issued);
        let expiry = issued + Duration::seconds(3600 - EXPIRY_BUFFER_SECS);

        assert!(token.is_valid_at(issued));
        assert!(token.is_valid_at(expiry - Duration::milliseconds(1)));
        assert!(!token.is_valid_at(expiry));
        assert!(!token.is_valid_at(expiry + Duration::seconds(1)));
    }

    #[test]
    fn test_short_lived_token_is_immediately_stale() {
        let issued = Utc::now();
        let token = AccessToken::from_grant("abc".into(), 30, issued);
        assert!(!token.is_valid_at(issued));
    }

    #[test]
    fn test_parse_token_response() {
        let issued = Utc::now();
        let token = parse_token_response(
            r#"{"access_token":"tok","token_type":"bearer","expires_in":3600}"#,
            issued,
        )
        .unwrap();
        assert_eq!(token.value(), "tok");
        assert_eq!(token.expires_at(), issued + Duration::seconds(3540));
    }

    #[test]
    fn test_parse_token_response_rejects_missing_fields() {
        let issued = Utc::now();
        assert!(matches!(
            parse_token_response(r#"{"access_token":"tok"}"#, issued),
            Err(TokenError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_token_response(r#"{"expires_in":3600}"#, issued),
            Err(TokenError::InvalidResponse(_))
        ));
        assert!(parse_token_response("not json", issued).is_err());
    }

    #[test]
    fn test_debug_redacts_value() {
        let token = AccessToken::from_grant("super-secret".into(), 3600, Utc::now());
        assert!(!format!("{:?}", token).contains("super-secret"));
    }

    #[tokio::test]
    async fn test_cached_token_skips_network() {
        let token = AccessToken::from_grant("cached".into(), 3600, Utc::now());
        let mut manager = TokenManager::new(&test_config(UNREACHABLE))
            .unwrap()
            .with_cached_token(token.clone());

        let first = manager.get_token().await.unwrap();
        let second = manager.get_token().await.unwrap();
        assert_eq!(first, token);
        assert_eq!(second, token);
    }

    #[tokio::test]
    async fn test_stale_token_triggers_new_grant() {
        let stale = AccessToken::from_grant(
            "stale".into(),
            3600,
            Utc::now() - Duration::seconds(3600),
        );
        let mut manager = TokenManager::new(&test_config(UNREACHABLE))
            .unwrap()
            .with_cached_token(stale.clone());

        // The refresh attempt hits the network and fails; the stale token is kept
        // but never handed out.
        let result = manager.get_token().await;
        assert!(matches!(result, Err(TokenError::Http(_))));
        assert_eq!(manager.cached_token(), Some(&stale));
    }

    #[tokio::test]
    async fn test_grant_is_requested_once_then_cached() {
        let server = StubServer::start(vec![(
            200,
            r#"{"access_token":"tok123","token_type":"bearer","expires_in":3600}"#,
        )])
        .await;
        let mut manager =
            TokenManager::new(&test_config(&format!("{}/oauth2/auth", server.url))).unwrap();

        let first = manager.get_token().await.unwrap();
        let second = manager.get_token().await.unwrap();

        assert_eq!(first.value(), "tok123");
        assert_eq!(second, first);
        assert!(first.expires_at() > Utc::now() + Duration::seconds(3400));

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].target, "/oauth2/auth");
        assert_eq!(
            requests[0].header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(
            requests[0].body,
            "grant_type=client_credentials&client_id=id&client_secret=secret"
        );
    }

    #[tokio::test]
    async fn test_rejected_grant_is_status_error() {
        let server = StubServer::start(vec![(401, r#"{"error":"invalid_client"}"#)]).await;
        let mut manager =
            TokenManager::new(&test_config(&format!("{}/oauth2/auth", server.url))).unwrap();

        match manager.get_token().await {
            Err(TokenError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("invalid_client"));
            }
            other => panic!("expected status error, got {:?}", other),
        }
        assert!(manager.cached_token().is_none());
    }

    #[tokio::test]
    async fn test_malformed_grant_body_is_rejected() {
        let server = StubServer::start(vec![(200, r#"{"token_type":"bearer"}"#)]).await;
        let mut manager =
            TokenManager::new(&test_config(&format!("{}/oauth2/auth", server.url))).unwrap();

        assert!(matches!(
            manager.get_token().await,
            Err(TokenError::InvalidResponse(_))
        ));
        assert!(manager.cached_token().is_none());
    }
}
