//! Outbound HTTP integrations: the LLM providers, the knowledge-base
//! search service, and the escalation notifier used when no staff channel
//! is wired up.
//!
//! Providers return text only; the confidence the escalation rules consume
//! is estimated here from the reply itself.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};

use helplane_agent::llm::{GeneratedReply, LlmClient, ReplyRequest};
use helplane_agent::notify::{EscalationNotice, EscalationNotifier};
use helplane_agent::retrieval::{RetrievalClient, Snippet};
use helplane_core::config::{LlmConfig, LlmProvider, RetrievalConfig};

const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com";
const ANTHROPIC_DEFAULT_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct HttpLlmClient {
    client: reqwest::Client,
    provider: LlmProvider,
    api_key: Option<SecretString>,
    base_url: String,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("building llm http client")?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| match config.provider {
                LlmProvider::OpenAi => OPENAI_DEFAULT_BASE.to_string(),
                LlmProvider::Anthropic => ANTHROPIC_DEFAULT_BASE.to_string(),
                // Config validation requires an explicit base_url for ollama.
                LlmProvider::Ollama => String::new(),
            })
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            provider: config.provider,
            api_key: config.api_key.clone(),
            base_url,
        })
    }

    fn key(&self) -> Result<&str> {
        self.api_key
            .as_ref()
            .map(ExposeSecret::expose_secret)
            .context("llm api key is not configured")
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn generate(&self, request: &ReplyRequest) -> Result<GeneratedReply> {
        let text = match self.provider {
            LlmProvider::OpenAi => {
                let response = self
                    .client
                    .post(format!("{}/v1/chat/completions", self.base_url))
                    .bearer_auth(self.key()?)
                    .json(&json!({
                        "model": request.model,
                        "temperature": request.temperature,
                        "max_tokens": request.max_tokens,
                        "messages": chat_messages(request, true),
                    }))
                    .send()
                    .await
                    .context("openai request failed")?;
                extract_openai(&read_json(response).await?)?
            }
            LlmProvider::Anthropic => {
                let response = self
                    .client
                    .post(format!("{}/v1/messages", self.base_url))
                    .header("x-api-key", self.key()?)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&json!({
                        "model": request.model,
                        "temperature": request.temperature,
                        "max_tokens": request.max_tokens,
                        "system": system_prompt(request),
                        "messages": chat_messages(request, false),
                    }))
                    .send()
                    .await
                    .context("anthropic request failed")?;
                extract_anthropic(&read_json(response).await?)?
            }
            LlmProvider::Ollama => {
                let response = self
                    .client
                    .post(format!("{}/api/chat", self.base_url))
                    .json(&json!({
                        "model": request.model,
                        "stream": false,
                        "options": {
                            "temperature": request.temperature,
                            "num_predict": request.max_tokens,
                        },
                        "messages": chat_messages(request, true),
                    }))
                    .send()
                    .await
                    .context("ollama request failed")?;
                extract_ollama(&read_json(response).await?)?
            }
        };

        let confidence = estimate_confidence(&text);
        Ok(GeneratedReply { text, confidence })
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("provider returned {status}: {body}");
    }
    response.json().await.context("provider returned invalid json")
}

/// The system prompt with the ranked knowledge snippets folded in.
fn system_prompt(request: &ReplyRequest) -> String {
    if request.context_snippets.is_empty() {
        return request.system_prompt.clone();
    }

    let mut prompt = request.system_prompt.clone();
    prompt.push_str("\n\nRelevant knowledge:\n");
    for snippet in &request.context_snippets {
        prompt.push_str("- ");
        prompt.push_str(snippet);
        prompt.push('\n');
    }
    prompt
}

/// OpenAI and Ollama take the system prompt as a leading message; Anthropic
/// takes it as a top-level field.
fn chat_messages(request: &ReplyRequest, inline_system: bool) -> Vec<Value> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    if inline_system {
        messages.push(json!({ "role": "system", "content": system_prompt(request) }));
    }
    for turn in &request.history {
        messages.push(json!({ "role": turn.role.as_str(), "content": turn.content }));
    }
    messages.push(json!({ "role": "user", "content": request.user_message }));
    messages
}

fn extract_openai(body: &Value) -> Result<String> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(|text| text.trim().to_string())
        .context("openai response missing choices[0].message.content")
}

fn extract_anthropic(body: &Value) -> Result<String> {
    body["content"][0]["text"]
        .as_str()
        .map(|text| text.trim().to_string())
        .context("anthropic response missing content[0].text")
}

fn extract_ollama(body: &Value) -> Result<String> {
    body["message"]["content"]
        .as_str()
        .map(|text| text.trim().to_string())
        .context("ollama response missing message.content")
}

const HEDGE_PHRASES: [&str; 5] = [
    "i'm not sure",
    "i am not sure",
    "i don't know",
    "i do not know",
    "i can't help with that",
];

/// Chat APIs return no confidence signal, so it is estimated from the reply
/// text: hedging answers score low enough to trip a typical low-confidence
/// escalation threshold, empty ones lower still.
pub fn estimate_confidence(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    let lowered = trimmed.to_lowercase();
    if HEDGE_PHRASES.iter().any(|phrase| lowered.contains(phrase)) {
        return 0.3;
    }
    0.9
}

pub struct HttpRetrievalClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRetrievalClient {
    pub fn from_config(config: &RetrievalConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .context("retrieval.base_url is not configured")?
            .trim_end_matches('/')
            .to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("building retrieval http client")?;
        Ok(Self { client, base_url })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    content: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[async_trait]
impl RetrievalClient for HttpRetrievalClient {
    async fn search(&self, tenant_slug: &str, query: &str, top_k: u32) -> Result<Vec<Snippet>> {
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&json!({ "tenant": tenant_slug, "query": query, "top_k": top_k }))
            .send()
            .await
            .context("retrieval request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("retrieval service returned {status}");
        }

        let parsed: SearchResponse =
            response.json().await.context("retrieval service returned invalid json")?;
        Ok(parsed
            .results
            .into_iter()
            .map(|result| Snippet {
                title: result.title,
                content: result.content,
                score: result.score,
            })
            .collect())
    }
}

/// Fallback notifier: escalations land in the structured log where an
/// operator's alerting picks them up. Replaced per deployment once a real
/// staff channel (email, Slack) is configured.
pub struct LogNotifier;

#[async_trait]
impl EscalationNotifier for LogNotifier {
    async fn notify(&self, notice: EscalationNotice) -> Result<()> {
        tracing::warn!(
            event_name = "escalation.notice",
            tenant = %notice.tenant_slug,
            conversation_id = %notice.conversation_id.0,
            reason = notice.reason.as_str(),
            matched = notice.matched.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(","),
            user_message = %notice.user_message,
            "conversation escalated to human follow-up"
        );
        Ok(())
    }
}

/// Audit sink that writes events into the structured log. A deployment that
/// needs a queryable trail swaps in a store-backed sink here.
pub struct LogAuditSink;

impl helplane_core::audit::AuditSink for LogAuditSink {
    fn emit(&self, event: helplane_core::audit::AuditEvent) {
        tracing::info!(
            event_name = "audit.event",
            audit_event_type = %event.event_type,
            tenant = %event.tenant_slug,
            correlation_id = %event.correlation_id,
            conversation_id = event.conversation_id.as_ref().map(|id| id.0.as_str()),
            category = ?event.category,
            outcome = ?event.outcome,
            metadata = %serde_json::to_string(&event.metadata).unwrap_or_default(),
            "audit event"
        );
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use helplane_agent::llm::{ChatTurn, ReplyRequest};
    use helplane_core::domain::message::MessageRole;

    use super::{
        chat_messages, estimate_confidence, extract_anthropic, extract_ollama, extract_openai,
        system_prompt,
    };

    fn request() -> ReplyRequest {
        ReplyRequest {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 500,
            system_prompt: "You are Acme's assistant.".to_string(),
            history: vec![ChatTurn { role: MessageRole::User, content: "hi".to_string() }],
            user_message: "what are your hours?".to_string(),
            context_snippets: vec!["Open 9-5 weekdays.".to_string()],
        }
    }

    #[test]
    fn snippets_fold_into_the_system_prompt() {
        let prompt = system_prompt(&request());
        assert!(prompt.starts_with("You are Acme's assistant."));
        assert!(prompt.contains("- Open 9-5 weekdays."));
    }

    #[test]
    fn inline_system_prepends_a_system_message() {
        let with_system = chat_messages(&request(), true);
        assert_eq!(with_system[0]["role"], "system");
        assert_eq!(with_system.last().unwrap()["role"], "user");
        assert_eq!(with_system.len(), 3);

        let without = chat_messages(&request(), false);
        assert_eq!(without[0]["role"], "user");
        assert_eq!(without.len(), 2);
    }

    #[test]
    fn provider_response_extraction() {
        let openai = json!({
            "choices": [{ "message": { "content": "  Open 9-5.  " } }]
        });
        assert_eq!(extract_openai(&openai).unwrap(), "Open 9-5.");

        let anthropic = json!({ "content": [{ "type": "text", "text": "Open 9-5." }] });
        assert_eq!(extract_anthropic(&anthropic).unwrap(), "Open 9-5.");

        let ollama = json!({ "message": { "role": "assistant", "content": "Open 9-5." } });
        assert_eq!(extract_ollama(&ollama).unwrap(), "Open 9-5.");

        assert!(extract_openai(&json!({ "choices": [] })).is_err());
    }

    #[test]
    fn hedging_replies_score_below_a_typical_threshold() {
        assert_eq!(estimate_confidence("Our hours are 9-5."), 0.9);
        assert_eq!(estimate_confidence("I'm not sure about that."), 0.3);
        assert_eq!(estimate_confidence("   "), 0.0);
    }
}
