use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use tokio::time::Instant;
use tracing::warn;

use crate::auth::AuthManager;

/// Per-attempt call metadata. Built fresh for every attempt so a retry after a
/// refresh carries the new token and a new deadline.
///
/// `Authorization` is present when a token is current and forms a valid
/// header value. A token that cannot be encoded is logged and the attempt goes
/// out without it; the backend then answers `Unauthenticated`, which sends the
/// executor down the refresh path.
#[derive(Clone, Debug)]
pub struct CallMetadata {
    pub headers: HeaderMap,
    pub deadline: Instant,
}

impl CallMetadata {
    pub fn build(auth: &AuthManager, timeout: Duration) -> Self {
        let mut headers = HeaderMap::new();
        if let Some(token) = auth.current_token() {
            match HeaderValue::from_str(&format!("Bearer {}", token.as_str())) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(err) => warn!("access token is not a valid header value: {err}"),
            }
        }
        Self {
            headers,
            deadline: Instant::now() + timeout,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
    }
}
