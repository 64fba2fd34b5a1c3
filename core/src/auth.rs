use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;

pub const ACCESS_TOKEN_ENV_VAR: &str = "IMAGESEARCH_ACCESS_TOKEN";
pub const REFRESH_TOKEN_ENV_VAR: &str = "IMAGESEARCH_REFRESH_TOKEN";

const REFRESH_TIMEOUT: Duration = Duration::from_secs(60);

/// Opaque bearer token. Replaced wholesale on refresh, never edited in place.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no credential provider is configured")]
    NoProvider,
    #[error("{0}")]
    Refresh(String),
    #[error("token refresh request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Issues a fresh access token. The login flow that backs it lives outside
/// this crate.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn refresh_access_token(&self) -> Result<AccessToken, AuthError>;
}

/// Owner of the current access token.
///
/// The token lives in a `watch` channel so every reader observes either a
/// complete token or none, and so subscribers learn about each replacement in
/// publication order. Concurrent refreshes are not deduplicated: the last one
/// to complete wins.
pub struct AuthManager {
    state: watch::Sender<Option<AccessToken>>,
    provider: Option<Arc<dyn CredentialProvider>>,
}

impl fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthManager")
            .field("has_token", &self.current_token().is_some())
            .field("has_provider", &self.provider.is_some())
            .finish()
    }
}

impl AuthManager {
    pub fn new(
        initial: Option<AccessToken>,
        provider: Option<Arc<dyn CredentialProvider>>,
    ) -> Self {
        let (state, _) = watch::channel(initial);
        Self { state, provider }
    }

    pub fn shared(
        initial: Option<AccessToken>,
        provider: Option<Arc<dyn CredentialProvider>>,
    ) -> Arc<Self> {
        Arc::new(Self::new(initial, provider))
    }

    /// Seeds the token from `IMAGESEARCH_ACCESS_TOKEN` when it is set.
    pub fn from_env(provider: Option<Arc<dyn CredentialProvider>>) -> Arc<Self> {
        Self::shared(read_access_token_from_env(), provider)
    }

    pub fn current_token(&self) -> Option<AccessToken> {
        self.state.borrow().clone()
    }

    /// Stream of token replacements, including `None` on logout.
    pub fn subscribe(&self) -> watch::Receiver<Option<AccessToken>> {
        self.state.subscribe()
    }

    pub async fn refresh(&self) -> Result<AccessToken, AuthError> {
        let provider = self.provider.as_ref().ok_or(AuthError::NoProvider)?;
        debug!("refreshing access token");
        let token = provider.refresh_access_token().await?;
        self.set_token(token.clone());
        info!("access token refreshed");
        Ok(token)
    }

    pub fn set_token(&self, token: AccessToken) {
        self.state.send_replace(Some(token));
    }

    /// Drops the current token. Returns whether one was present.
    pub fn logout(&self) -> bool {
        self.state.send_replace(None).is_some()
    }
}

pub fn read_access_token_from_env() -> Option<AccessToken> {
    read_non_empty_env(ACCESS_TOKEN_ENV_VAR).map(AccessToken::new)
}

pub fn read_refresh_token_from_env() -> Option<String> {
    read_non_empty_env(REFRESH_TOKEN_ENV_VAR)
}

fn read_non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Refresh-token exchange against an OAuth-style token endpoint.
#[derive(Clone, Debug)]
pub struct HttpCredentialProvider {
    client: reqwest::Client,
    token_endpoint: String,
    refresh_token: String,
}

impl HttpCredentialProvider {
    pub fn new(token_endpoint: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), token_endpoint, refresh_token)
    }

    pub fn with_client(
        client: reqwest::Client,
        token_endpoint: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token_endpoint: token_endpoint.into(),
            refresh_token: refresh_token.into(),
        }
    }

    async fn exchange(&self) -> Result<AccessToken, AuthError> {
        let request = RefreshRequest {
            grant_type: "refresh_token",
            refresh_token: &self.refresh_token,
        };
        let response = self
            .client
            .post(&self.token_endpoint)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::Refresh(format!(
                "failed to refresh token: {}",
                response.status()
            )));
        }
        let body = response.json::<RefreshResponse>().await?;
        Ok(AccessToken::new(body.access_token))
    }
}

#[async_trait]
impl CredentialProvider for HttpCredentialProvider {
    async fn refresh_access_token(&self) -> Result<AccessToken, AuthError> {
        tokio::time::timeout(REFRESH_TIMEOUT, self.exchange())
            .await
            .map_err(|_| AuthError::Refresh("timed out while refreshing access token".into()))?
    }
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
}
