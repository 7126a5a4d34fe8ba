use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::json;

use helplane_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use helplane_core::domain::conversation::{Channel, ConversationId, ConversationStatus};
use helplane_core::domain::message::MessageRole;
use helplane_core::errors::RequestError;
use helplane_core::escalation::{EscalationContext, EscalationEngine, EscalationReason};
use helplane_core::tenant_config::TenantSnapshot;
use helplane_db::repositories::{ConversationRepository, RepositoryError};

use crate::llm::{ChatTurn, LlmClient, ReplyRequest};
use crate::notify::{EscalationNotice, EscalationNotifier};
use crate::retrieval::RetrievalClient;

const MAX_MESSAGE_CHARS: usize = 4_000;

#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub session_id: String,
    pub channel: Channel,
    pub message: String,
    /// Adapter leftovers (widget page URL, Twilio sids); stored on the user
    /// message as-is.
    pub metadata: serde_json::Value,
    pub correlation_id: String,
}

#[derive(Clone, Debug)]
pub struct ChatOutcome {
    pub conversation_id: ConversationId,
    pub reply: String,
    pub confidence: f64,
    /// True when THIS exchange triggered the escalation.
    pub escalated: bool,
    pub escalation_reason: Option<EscalationReason>,
    /// The reply is a canned fallback because the provider failed.
    pub degraded: bool,
    pub user_seq: i64,
    pub assistant_seq: i64,
}

/// End-to-end handling of one inbound message for one tenant.
pub struct ChatPipeline {
    conversations: Arc<dyn ConversationRepository>,
    llm: Arc<dyn LlmClient>,
    retrieval: Arc<dyn RetrievalClient>,
    notifier: Arc<dyn EscalationNotifier>,
    audit: Arc<dyn AuditSink>,
}

impl ChatPipeline {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        llm: Arc<dyn LlmClient>,
        retrieval: Arc<dyn RetrievalClient>,
        notifier: Arc<dyn EscalationNotifier>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { conversations, llm, retrieval, notifier, audit }
    }

    pub async fn process(
        &self,
        snapshot: &TenantSnapshot,
        request: ChatRequest,
    ) -> Result<ChatOutcome, RequestError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(RequestError::Validation("message must not be empty".to_string()));
        }
        if message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(RequestError::Validation(format!(
                "message exceeds {MAX_MESSAGE_CHARS} characters"
            )));
        }

        let tenant_id = &snapshot.tenant.id;
        let config = &snapshot.config;

        let conversation = self
            .conversations
            .get_or_create(tenant_id, &request.session_id, request.channel)
            .await
            .map_err(persistence)?;

        let user_message = self
            .conversations
            .append_message(
                tenant_id,
                &conversation.id,
                MessageRole::User,
                message,
                request.metadata.clone(),
            )
            .await
            .map_err(persistence)?;

        // History up to but not including the message we just appended.
        let mut history: Vec<ChatTurn> = self
            .conversations
            .history(
                tenant_id,
                &conversation.id,
                Some(config.ai.history_limit.saturating_add(1)),
            )
            .await
            .map_err(persistence)?
            .into_iter()
            .filter(|m| m.seq < user_message.seq)
            .map(|m| ChatTurn { role: m.role, content: m.content })
            .collect();
        if history.len() > config.ai.history_limit as usize {
            history.remove(0);
        }

        let snippets = match self
            .retrieval
            .search(snapshot.slug(), message, config.ai.retrieval_top_k)
            .await
        {
            Ok(snippets) => snippets
                .into_iter()
                .filter(|s| s.score >= config.ai.retrieval_score_threshold)
                .map(|s| s.content)
                .collect(),
            Err(error) => {
                tracing::warn!(
                    event_name = "retrieval.failed",
                    tenant = snapshot.slug(),
                    correlation_id = %request.correlation_id,
                    error = %error,
                    "knowledge search failed, continuing without context"
                );
                Vec::new()
            }
        };

        let started = Instant::now();
        let generation = self
            .llm
            .generate(&ReplyRequest {
                model: config.ai.model.clone(),
                temperature: config.ai.temperature,
                max_tokens: config.ai.max_tokens,
                system_prompt: config.ai.system_prompt.clone(),
                history,
                user_message: message.to_string(),
                context_snippets: snippets,
            })
            .await;
        let response_time_ms = started.elapsed().as_millis() as f64;

        // Provider failure degrades to the canned fallback instead of
        // failing the request; confidence zero lets the low-confidence rule
        // see the trouble.
        let (reply_text, confidence, degraded) = match generation {
            Ok(reply) => (reply.text, reply.confidence.clamp(0.0, 1.0), false),
            Err(error) => {
                tracing::warn!(
                    event_name = "llm.degraded_to_fallback",
                    tenant = snapshot.slug(),
                    correlation_id = %request.correlation_id,
                    error = %error,
                    "provider failed, serving fallback reply"
                );
                (config.ai.fallback_reply().to_string(), 0.0, true)
            }
        };

        let decision = EscalationEngine::evaluate(
            &config.escalation,
            config.business_hours.as_ref(),
            &EscalationContext {
                user_message: message,
                reply_confidence: confidence,
                message_count: user_message.seq,
                now: Utc::now(),
            },
        );

        let mut metadata = json!({
            "confidence": confidence,
            "response_time_ms": response_time_ms,
            "model": config.ai.model,
        });
        if degraded {
            metadata["upstream_failed"] = json!(true);
        }
        if let Some(reason) = decision.reason {
            metadata["escalation_reason"] = json!(reason.as_str());
        }

        let assistant_message = self
            .conversations
            .append_message(
                tenant_id,
                &conversation.id,
                MessageRole::Assistant,
                &reply_text,
                metadata,
            )
            .await
            .map_err(persistence)?;

        let mut escalated_now = false;
        if decision.escalate && conversation.status == ConversationStatus::Active {
            self.conversations
                .set_status(tenant_id, &conversation.id, ConversationStatus::Escalated)
                .await
                .map_err(persistence)?;
            escalated_now = true;

            let reason = decision.reason.unwrap_or(EscalationReason::KeywordMatch);
            if let Err(error) = self
                .notifier
                .notify(EscalationNotice {
                    tenant_slug: snapshot.slug().to_string(),
                    conversation_id: conversation.id.clone(),
                    reason,
                    matched: decision.matched.clone(),
                    user_message: message.to_string(),
                    occurred_at: Utc::now(),
                })
                .await
            {
                // The escalation is recorded either way; delivery gets
                // retried by staff tooling, not by this request.
                tracing::warn!(
                    event_name = "escalation.notify_failed",
                    tenant = snapshot.slug(),
                    correlation_id = %request.correlation_id,
                    error = %error,
                    "escalation notification failed"
                );
            }

            self.audit.emit(
                AuditEvent::new(
                    snapshot.slug(),
                    Some(conversation.id.clone()),
                    request.correlation_id.clone(),
                    "escalation.triggered",
                    AuditCategory::Escalation,
                    AuditOutcome::Success,
                )
                .with_metadata("reason", reason.as_str())
                .with_metadata(
                    "matched",
                    decision
                        .matched
                        .iter()
                        .map(|r| r.as_str())
                        .collect::<Vec<_>>()
                        .join(","),
                ),
            );
        }

        tracing::info!(
            event_name = "chat.message_processed",
            tenant = snapshot.slug(),
            correlation_id = %request.correlation_id,
            conversation_id = %conversation.id.0,
            channel = request.channel.as_str(),
            seq = assistant_message.seq,
            confidence,
            degraded,
            escalated = escalated_now,
            "processed inbound message"
        );

        Ok(ChatOutcome {
            conversation_id: conversation.id,
            reply: reply_text,
            confidence,
            escalated: escalated_now,
            escalation_reason: decision.reason,
            degraded,
            user_seq: user_message.seq,
            assistant_seq: assistant_message.seq,
        })
    }
}

fn persistence(error: RepositoryError) -> RequestError {
    RequestError::Persistence(error.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;

    use helplane_core::audit::InMemoryAuditSink;
    use helplane_core::domain::conversation::{Channel, ConversationStatus};
    use helplane_core::domain::tenant::{Tenant, TenantId, TenantRecord, TenantStatus};
    use helplane_core::errors::RequestError;
    use helplane_core::escalation::EscalationReason;
    use helplane_core::tenant_config::TenantSnapshot;
    use helplane_db::repositories::{ConversationRepository, InMemoryConversationRepository};

    use crate::llm::{GeneratedReply, LlmClient, ReplyRequest};
    use crate::notify::InMemoryNotifier;
    use crate::retrieval::NoopRetrieval;

    use super::{ChatPipeline, ChatRequest};

    struct ScriptedLlm {
        reply: &'static str,
        confidence: f64,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn generate(&self, _request: &ReplyRequest) -> Result<GeneratedReply> {
            Ok(GeneratedReply { text: self.reply.to_string(), confidence: self.confidence })
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn generate(&self, _request: &ReplyRequest) -> Result<GeneratedReply> {
            anyhow::bail!("provider unavailable")
        }
    }

    fn snapshot() -> TenantSnapshot {
        let now = Utc::now();
        TenantSnapshot::from_record(TenantRecord {
            tenant: Tenant {
                id: TenantId("t-acme".to_string()),
                slug: "acme".to_string(),
                name: "Acme Dental".to_string(),
                domain: None,
                status: TenantStatus::Active,
                created_at: now,
                updated_at: now,
            },
            config_doc: json!({
                "branding": { "company_name": "Acme Dental" },
                "ai": {
                    "model": "gpt-4o-mini",
                    "fallback_replies": ["We hit a snag. Please try again."]
                },
                "escalation": {
                    "keywords": ["speak to a human"],
                    "confidence_threshold": 0.5
                }
            }),
            secrets_doc: json!({}),
        })
        .expect("valid snapshot")
    }

    struct Harness {
        pipeline: ChatPipeline,
        conversations: Arc<InMemoryConversationRepository>,
        notifier: InMemoryNotifier,
        audit: InMemoryAuditSink,
    }

    fn harness(llm: Arc<dyn LlmClient>) -> Harness {
        let conversations = Arc::new(InMemoryConversationRepository::new());
        let notifier = InMemoryNotifier::new();
        let audit = InMemoryAuditSink::default();
        let pipeline = ChatPipeline::new(
            conversations.clone(),
            llm,
            Arc::new(NoopRetrieval),
            Arc::new(notifier.clone()),
            Arc::new(audit.clone()),
        );
        Harness { pipeline, conversations, notifier, audit }
    }

    fn request(message: &str) -> ChatRequest {
        ChatRequest {
            session_id: "sess-1".to_string(),
            channel: Channel::Web,
            message: message.to_string(),
            metadata: json!({}),
            correlation_id: "req-1".to_string(),
        }
    }

    #[tokio::test]
    async fn normal_exchange_persists_both_messages_in_order() {
        let h = harness(Arc::new(ScriptedLlm { reply: "Happy to help!", confidence: 0.9 }));
        let snapshot = snapshot();

        let outcome = h.pipeline.process(&snapshot, request("what are your hours?")).await.unwrap();

        assert_eq!(outcome.reply, "Happy to help!");
        assert_eq!((outcome.user_seq, outcome.assistant_seq), (1, 2));
        assert!(!outcome.escalated);
        assert!(!outcome.degraded);

        let history = h
            .conversations
            .history(&snapshot.tenant.id, &outcome.conversation_id, None)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "what are your hours?");
        assert_eq!(history[1].content, "Happy to help!");
    }

    #[tokio::test]
    async fn channel_metadata_rides_on_the_user_message() {
        let h = harness(Arc::new(ScriptedLlm { reply: "Sure.", confidence: 0.9 }));
        let snapshot = snapshot();

        let mut request = request("do you take walk-ins?");
        request.metadata = json!({ "page_url": "https://acme.example/pricing" });
        let outcome = h.pipeline.process(&snapshot, request).await.unwrap();

        let history = h
            .conversations
            .history(&snapshot.tenant.id, &outcome.conversation_id, None)
            .await
            .unwrap();
        assert_eq!(history[0].metadata["page_url"], "https://acme.example/pricing");
        assert!(history[1].metadata.get("page_url").is_none());
    }

    #[tokio::test]
    async fn empty_message_is_rejected_before_any_write() {
        let h = harness(Arc::new(ScriptedLlm { reply: "x", confidence: 0.9 }));
        let snapshot = snapshot();

        let error = h.pipeline.process(&snapshot, request("   ")).await.unwrap_err();
        assert!(matches!(error, RequestError::Validation(_)));

        let recent = h.conversations.list_recent(&snapshot.tenant.id, None, 10, 0).await.unwrap();
        assert!(recent.is_empty(), "no conversation should be created for an invalid message");
    }

    #[tokio::test]
    async fn keyword_escalation_transitions_notifies_and_audits() {
        let h = harness(Arc::new(ScriptedLlm { reply: "Connecting you now.", confidence: 0.9 }));
        let snapshot = snapshot();

        let outcome = h
            .pipeline
            .process(&snapshot, request("I want to speak to a human"))
            .await
            .unwrap();

        assert!(outcome.escalated);
        assert_eq!(outcome.escalation_reason, Some(EscalationReason::KeywordMatch));

        let conversation = h
            .conversations
            .find_by_id(&snapshot.tenant.id, &outcome.conversation_id)
            .await
            .unwrap()
            .expect("present");
        assert_eq!(conversation.status, ConversationStatus::Escalated);

        let notices = h.notifier.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].reason, EscalationReason::KeywordMatch);

        let events = h.audit.events();
        assert!(events.iter().any(|e| e.event_type == "escalation.triggered"));
    }

    #[tokio::test]
    async fn escalated_conversation_keeps_answering_without_retriggering() {
        let h = harness(Arc::new(ScriptedLlm { reply: "Still here.", confidence: 0.9 }));
        let snapshot = snapshot();

        h.pipeline.process(&snapshot, request("speak to a human")).await.unwrap();
        let followup = h.pipeline.process(&snapshot, request("speak to a human again")).await.unwrap();

        assert!(!followup.escalated, "already-escalated conversation does not re-escalate");
        assert_eq!(h.notifier.notices().len(), 1);
        assert_eq!(followup.reply, "Still here.");
    }

    #[tokio::test]
    async fn provider_failure_serves_fallback_and_marks_degradation() {
        let h = harness(Arc::new(FailingLlm));
        let snapshot = snapshot();

        let outcome = h.pipeline.process(&snapshot, request("hello?")).await.unwrap();

        assert!(outcome.degraded);
        assert_eq!(outcome.reply, "We hit a snag. Please try again.");
        assert_eq!(outcome.confidence, 0.0);
        // Zero confidence trips the tenant's 0.5 threshold.
        assert_eq!(outcome.escalation_reason, Some(EscalationReason::LowConfidence));

        let history = h
            .conversations
            .history(&snapshot.tenant.id, &outcome.conversation_id, None)
            .await
            .unwrap();
        assert_eq!(history.len(), 2, "fallback exchange is still fully persisted");
        assert_eq!(history[1].metadata["upstream_failed"], json!(true));
        assert_eq!(history[1].metadata["confidence"], json!(0.0));
    }
}
