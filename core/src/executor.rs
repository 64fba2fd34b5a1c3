use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use imagesearch_protocol::RpcError;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::auth::AuthManager;
use crate::metadata::CallMetadata;

pub const DEFAULT_RETRY_LIMIT: u32 = 2;
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptChoice {
    Retry,
    Cancel,
}

/// What the operator is asked after a failed attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPrompt {
    pub description: String,
    pub message: String,
    pub remaining_attempts: u32,
}

impl RetryPrompt {
    pub fn text(&self) -> String {
        format!(
            "{} failed: {} ({} attempts remaining)",
            self.description, self.message, self.remaining_attempts
        )
    }
}

/// Interactive Retry/Cancel question. `None` means the prompt was dismissed.
#[async_trait]
pub trait UserPrompt: Send + Sync {
    async fn ask(&self, prompt: RetryPrompt) -> Option<PromptChoice>;
}

/// Prompt that is never answered, which makes every non-auth failure
/// terminal. Used for non-interactive invocations.
#[derive(Clone, Copy, Debug, Default)]
pub struct DismissedPrompt;

#[async_trait]
impl UserPrompt for DismissedPrompt {
    async fn ask(&self, _prompt: RetryPrompt) -> Option<PromptChoice> {
        None
    }
}

/// User-visible notifications raised by the executor.
pub trait Notifier: Send + Sync {
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn warn(&self, message: &str) {
        warn!("{message}");
    }

    fn error(&self, message: &str) {
        error!("{message}");
    }
}

/// Bookkeeping for one logical call; lives only as long as `execute`.
struct CallAttempt<'a> {
    description: &'a str,
    remaining: u32,
    deadline: Option<Instant>,
}

impl CallAttempt<'_> {
    fn consume(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }
}

/// Runs unary calls with bounded, operator-visible retries.
///
/// Every attempt rebuilds [`CallMetadata`]. An `Unauthenticated` failure
/// triggers one credential refresh and a silent retry; any other failure (or
/// a failed refresh) asks the operator whether to retry. Each retry, silent
/// or prompted, consumes one unit of the budget, so a call is invoked at most
/// `retry_limit + 1` times.
#[derive(Clone)]
pub struct CallExecutor {
    auth: Arc<AuthManager>,
    prompt: Arc<dyn UserPrompt>,
    notifier: Arc<dyn Notifier>,
    retry_limit: u32,
    call_timeout: Duration,
}

impl CallExecutor {
    pub fn new(
        auth: Arc<AuthManager>,
        prompt: Arc<dyn UserPrompt>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            auth,
            prompt,
            notifier,
            retry_limit: DEFAULT_RETRY_LIMIT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn auth(&self) -> &Arc<AuthManager> {
        &self.auth
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    pub async fn execute<T, F, Fut>(&self, description: &str, mut call: F) -> Result<T, RpcError>
    where
        F: FnMut(CallMetadata) -> Fut + Send,
        Fut: Future<Output = Result<T, RpcError>> + Send,
        T: Send,
    {
        let mut attempt = CallAttempt {
            description,
            remaining: self.retry_limit,
            deadline: None,
        };

        loop {
            let metadata = CallMetadata::build(&self.auth, self.call_timeout);
            attempt.deadline = Some(metadata.deadline);
            debug!(
                description = attempt.description,
                remaining = attempt.remaining,
                "invoking remote call"
            );

            let err = match call(metadata).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            warn!(
                description = attempt.description,
                code = %err.code,
                remaining = attempt.remaining,
                deadline_passed = attempt.deadline.is_some_and(|d| d <= Instant::now()),
                "remote call failed: {}",
                err.message
            );

            if attempt.remaining == 0 {
                self.notifier.error(&format!(
                    "{}: {} (operation will not be retried)",
                    attempt.description, err.message
                ));
                return Err(err);
            }

            if err.is_unauthenticated() {
                match self.auth.refresh().await {
                    Ok(_) => {
                        attempt.consume();
                        continue;
                    }
                    Err(refresh_err) => {
                        self.notifier
                            .warn(&format!("Failed to refresh access token: {refresh_err}"));
                    }
                }
            }

            let prompt = RetryPrompt {
                description: attempt.description.to_string(),
                message: err.message.clone(),
                remaining_attempts: attempt.remaining,
            };
            match self.prompt.ask(prompt).await {
                Some(PromptChoice::Retry) => attempt.consume(),
                Some(PromptChoice::Cancel) | None => {
                    debug!(description = attempt.description, "retry declined");
                    return Err(err);
                }
            }
        }
    }
}
