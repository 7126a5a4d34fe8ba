use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use helplane_core::domain::message::MessageRole;

/// One prior exchange handed to the model as context.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatTurn {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReplyRequest {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub system_prompt: String,
    pub history: Vec<ChatTurn>,
    pub user_message: String,
    /// Knowledge-base snippets, already ranked. May be empty.
    pub context_snippets: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedReply {
    pub text: String,
    /// Provider self-assessment in `0.0..=1.0`; drives the low-confidence
    /// escalation rule.
    pub confidence: f64,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, request: &ReplyRequest) -> Result<GeneratedReply>;
}

/// Timeout-and-retry wrapper around any [`LlmClient`]. Retries transient
/// failures with linear backoff; the caller sees one error only after the
/// whole budget is spent.
pub struct RetryingLlm<C> {
    inner: C,
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl<C: LlmClient> RetryingLlm<C> {
    pub fn new(inner: C, timeout: Duration, max_retries: u32) -> Self {
        Self { inner, timeout, max_retries, backoff: Duration::from_millis(250) }
    }

    #[cfg(test)]
    fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl<C: LlmClient> LlmClient for RetryingLlm<C> {
    async fn generate(&self, request: &ReplyRequest) -> Result<GeneratedReply> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.backoff * attempt).await;
            }

            match tokio::time::timeout(self.timeout, self.inner.generate(request)).await {
                Ok(Ok(reply)) => return Ok(reply),
                Ok(Err(error)) => {
                    tracing::warn!(
                        event_name = "llm.attempt_failed",
                        attempt,
                        error = %error,
                        "llm call failed"
                    );
                    last_error = Some(error);
                }
                Err(_) => {
                    tracing::warn!(
                        event_name = "llm.attempt_timeout",
                        attempt,
                        timeout_secs = self.timeout.as_secs(),
                        "llm call timed out"
                    );
                    last_error = Some(anyhow::anyhow!(
                        "llm call timed out after {}s",
                        self.timeout.as_secs()
                    ));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("llm call failed")))
    }
}
