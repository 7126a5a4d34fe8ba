//! Telephony webhooks. These carry no API key header; the per-tenant URL
//! is provisioned on the provider side and acts as the credential.
//!
//! Twilio retries any non-2xx delivery, so once a request is admitted the
//! SMS handler answers 200 with empty TwiML on processing trouble rather
//! than inviting a retry storm.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Json, Router};
use serde::Serialize;
use uuid::Uuid;

use helplane_agent::pipeline::ChatRequest;
use helplane_channels::sms::{twiml_empty, twiml_reply, TwilioSmsPayload};
use helplane_channels::voice::{VoiceKnowledgeQuery, VoiceTranscriptPayload};
use helplane_core::errors::RequestError;

use crate::error::ApiError;
use crate::gate;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/{tenant}/sms/webhook", post(sms_webhook))
        .route("/api/{tenant}/voice/knowledge", post(voice_knowledge))
        .route("/api/{tenant}/voice/transcript", post(voice_transcript))
}

#[derive(Debug)]
pub struct Twiml(pub String);

impl IntoResponse for Twiml {
    fn into_response(self) -> Response {
        (StatusCode::OK, [(header::CONTENT_TYPE, "application/xml")], self.0).into_response()
    }
}

async fn sms_webhook(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Form(payload): Form<TwilioSmsPayload>,
) -> Result<Twiml, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let snapshot = gate::admit_webhook(&state, &slug, &correlation_id).await?;

    let canonical = match payload.canonicalize() {
        Ok(canonical) => canonical,
        Err(error) => {
            tracing::warn!(
                event_name = "sms.malformed_webhook",
                tenant = %slug,
                correlation_id = %correlation_id,
                error = %error,
                "discarding malformed sms webhook"
            );
            return Ok(Twiml(twiml_empty()));
        }
    };

    let outcome = state
        .pipeline
        .process(
            &snapshot,
            ChatRequest {
                session_id: canonical.session_id,
                channel: canonical.channel,
                message: canonical.text,
                metadata: canonical.metadata,
                correlation_id: correlation_id.clone(),
            },
        )
        .await;

    match outcome {
        Ok(outcome) => Ok(Twiml(twiml_reply(&outcome.reply))),
        Err(error) => {
            tracing::warn!(
                event_name = "sms.processing_failed",
                tenant = %slug,
                correlation_id = %correlation_id,
                error = %error,
                "sms exchange failed after admission, acknowledging without reply"
            );
            Ok(Twiml(twiml_empty()))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SnippetView {
    pub title: String,
    pub content: String,
    pub score: f64,
}

#[derive(Debug, Serialize)]
pub struct KnowledgeResponse {
    pub snippets: Vec<SnippetView>,
}

/// Mid-call knowledge lookup. The voice agent speaks the snippets itself;
/// nothing here touches the conversation log.
async fn voice_knowledge(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(query): Json<VoiceKnowledgeQuery>,
) -> Result<Json<KnowledgeResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let snapshot = gate::admit_webhook(&state, &slug, &correlation_id).await?;
    let ai = &snapshot.config.ai;

    let snippets = state
        .retrieval
        .search(snapshot.slug(), &query.query, ai.retrieval_top_k)
        .await
        .map_err(|error| ApiError::from(RequestError::Upstream(error.to_string())))?
        .into_iter()
        .filter(|snippet| snippet.score >= ai.retrieval_score_threshold)
        .map(|snippet| SnippetView {
            title: snippet.title,
            content: snippet.content,
            score: snippet.score,
        })
        .collect();

    Ok(Json(KnowledgeResponse { snippets }))
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub conversation_id: String,
    pub stored: usize,
}

/// Post-call transcript ingestion. The call already happened; turns are
/// replayed into the log verbatim, in order, with no reply generation.
async fn voice_transcript(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(payload): Json<VoiceTranscriptPayload>,
) -> Result<Json<TranscriptResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let snapshot = gate::admit_webhook(&state, &slug, &correlation_id).await?;

    let canonical = payload
        .canonical_session()
        .map_err(|error| ApiError::from(RequestError::Validation(error.to_string())))?;

    let tenant_id = &snapshot.tenant.id;
    let conversation = state
        .conversations
        .get_or_create(tenant_id, &canonical.session_id, canonical.channel)
        .await
        .map_err(persistence)?;

    let mut stored = 0;
    for turn in &payload.turns {
        if turn.text.trim().is_empty() {
            continue;
        }
        state
            .conversations
            .append_message(
                tenant_id,
                &conversation.id,
                turn.message_role(),
                &turn.text,
                canonical.metadata.clone(),
            )
            .await
            .map_err(persistence)?;
        stored += 1;
    }

    tracing::info!(
        event_name = "voice.transcript_stored",
        tenant = %slug,
        correlation_id = %correlation_id,
        conversation_id = %conversation.id.0,
        turns = stored,
        "stored voice transcript"
    );

    Ok(Json(TranscriptResponse { conversation_id: conversation.id.0, stored }))
}

fn persistence(error: helplane_db::repositories::RepositoryError) -> ApiError {
    ApiError::from(RequestError::Persistence(error.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use async_trait::async_trait;
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::{Form, Json};

    use helplane_agent::retrieval::{RetrievalClient, Snippet};
    use helplane_channels::sms::TwilioSmsPayload;
    use helplane_channels::voice::{TranscriptTurn, VoiceKnowledgeQuery, VoiceTranscriptPayload};
    use helplane_core::domain::conversation::{Channel, ConversationId};
    use helplane_core::domain::message::MessageRole;
    use helplane_core::domain::tenant::TenantId;

    use crate::test_support::{tenant_record, test_state};

    use super::{sms_webhook, voice_knowledge, voice_transcript};

    fn sms(from: &str, body: &str) -> TwilioSmsPayload {
        TwilioSmsPayload {
            from: from.to_string(),
            to: "+15550199".to_string(),
            body: body.to_string(),
            message_sid: Some("SM1".to_string()),
        }
    }

    #[tokio::test]
    async fn sms_replies_with_twiml_and_sticks_to_one_conversation() {
        let (state, _audit) = test_state(vec![tenant_record("acme", 60)]);

        let reply = sms_webhook(
            State(state.clone()),
            Path("acme".to_string()),
            Form(sms("+15550100", "hours?")),
        )
        .await
        .expect("twiml");
        assert!(reply.0.contains("<Message>Happy to help!</Message>"));

        sms_webhook(
            State(state.clone()),
            Path("acme".to_string()),
            Form(sms("+15550100", "thanks")),
        )
        .await
        .expect("second twiml");

        let tenant = TenantId("t-acme".to_string());
        let conversations =
            state.conversations.list_recent(&tenant, None, 10, 0).await.expect("list");
        assert_eq!(conversations.len(), 1, "same sender stays in one conversation");
        assert_eq!(conversations[0].channel, Channel::Sms);
        assert_eq!(conversations[0].message_count, 4);

        let messages = state
            .conversations
            .history(&tenant, &conversations[0].id, None)
            .await
            .expect("history");
        assert_eq!(messages[0].metadata["message_sid"], "SM1");
        assert_eq!(messages[0].metadata["from"], "+15550100");
    }

    #[tokio::test]
    async fn sms_for_unknown_tenant_is_rejected_with_status() {
        let (state, _audit) = test_state(vec![]);
        let error = sms_webhook(
            State(state),
            Path("ghost".to_string()),
            Form(sms("+15550100", "hi")),
        )
        .await
        .expect_err("unknown tenant");
        assert_eq!(error.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn empty_sms_body_is_acknowledged_without_a_message() {
        let (state, _audit) = test_state(vec![tenant_record("acme", 60)]);
        let reply = sms_webhook(
            State(state),
            Path("acme".to_string()),
            Form(sms("+15550100", "   ")),
        )
        .await
        .expect("ack");
        assert!(!reply.0.contains("<Message>"));
    }

    struct ScriptedRetrieval;

    #[async_trait]
    impl RetrievalClient for ScriptedRetrieval {
        async fn search(&self, _slug: &str, _query: &str, _top_k: u32) -> Result<Vec<Snippet>> {
            Ok(vec![
                Snippet { title: "Hours".to_string(), content: "9-5".to_string(), score: 0.92 },
                Snippet { title: "Junk".to_string(), content: "n/a".to_string(), score: 0.2 },
            ])
        }
    }

    #[tokio::test]
    async fn knowledge_lookup_filters_below_the_score_threshold() {
        let (mut state, _audit) = test_state(vec![tenant_record("acme", 60)]);
        state.retrieval = Arc::new(ScriptedRetrieval);

        let response = voice_knowledge(
            State(state),
            Path("acme".to_string()),
            Json(VoiceKnowledgeQuery {
                caller_id: "+15550100".to_string(),
                query: "opening hours".to_string(),
            }),
        )
        .await
        .expect("knowledge")
        .0;

        assert_eq!(response.snippets.len(), 1);
        assert_eq!(response.snippets[0].title, "Hours");
    }

    #[tokio::test]
    async fn transcript_replays_turns_in_order_with_roles() {
        let (state, _audit) = test_state(vec![tenant_record("acme", 60)]);

        let response = voice_transcript(
            State(state.clone()),
            Path("acme".to_string()),
            Json(VoiceTranscriptPayload {
                caller_id: "+15550100".to_string(),
                call_id: "call-7".to_string(),
                turns: vec![
                    TranscriptTurn { role: "caller".to_string(), text: "hi".to_string() },
                    TranscriptTurn { role: "agent".to_string(), text: "hello!".to_string() },
                    TranscriptTurn { role: "caller".to_string(), text: "  ".to_string() },
                ],
            }),
        )
        .await
        .expect("transcript")
        .0;

        assert_eq!(response.stored, 2, "blank turns are skipped");

        let tenant = TenantId("t-acme".to_string());
        let id = ConversationId(response.conversation_id);
        let messages = state.conversations.history(&tenant, &id, None).await.expect("history");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[0].metadata["call_id"], "call-7");
    }
}
