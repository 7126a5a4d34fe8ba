//! The tenant-scoped REST surface: widget chat, tenant configuration,
//! analytics, and the staff dashboard reads. The tenant slug rides in the
//! URL path; every handler passes through [`gate::admit`] except the
//! unauthenticated widget bootstrap, which only ever sees branding.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use helplane_channels::web::WebChatPayload;
use helplane_core::domain::analytics::DailyAnalytics;
use helplane_core::domain::conversation::{Conversation, ConversationId, ConversationStatus};
use helplane_core::domain::message::Message;
use helplane_core::errors::{AuthError, RequestError};
use helplane_core::tenant_config::{PublicView, WidgetView};
use helplane_db::repositories::TenantOverview;

use crate::error::ApiError;
use crate::gate;
use crate::state::AppState;

const DEFAULT_ANALYTICS_DAYS: u32 = 7;
const MAX_ANALYTICS_DAYS: u32 = 90;
const DEFAULT_CONVERSATION_PAGE: u32 = 20;
const MAX_CONVERSATION_PAGE: u32 = 100;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/{tenant}/chat", post(chat))
        .route("/api/{tenant}/config", get(tenant_config))
        .route("/api/{tenant}/widget/config", get(widget_config))
        .route("/api/{tenant}/analytics", get(analytics))
        .route("/api/{tenant}/dashboard/stats", get(dashboard_stats))
        .route("/api/{tenant}/dashboard/conversations", get(dashboard_conversations))
        .route("/api/{tenant}/dashboard/conversations/{id}", get(conversation_detail))
}

fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

fn persistence(error: helplane_db::repositories::RepositoryError) -> ApiError {
    ApiError::from(RequestError::Persistence(error.to_string()))
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub session_id: String,
    pub conversation_id: String,
    pub escalated: bool,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<&'static str>,
    pub degraded: bool,
}

async fn chat(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<WebChatPayload>,
) -> Result<Json<ChatResponse>, ApiError> {
    let correlation_id = new_correlation_id();
    let snapshot = gate::admit(&state, &tenant, &headers, &correlation_id).await?;
    let canonical = payload.canonicalize();
    let session_id = canonical.session_id.clone();

    let outcome = state
        .pipeline
        .process(
            &snapshot,
            helplane_agent::pipeline::ChatRequest {
                session_id: canonical.session_id,
                channel: canonical.channel,
                message: canonical.text,
                metadata: canonical.metadata,
                correlation_id,
            },
        )
        .await?;

    Ok(Json(ChatResponse {
        message: outcome.reply,
        session_id,
        conversation_id: outcome.conversation_id.0,
        escalated: outcome.escalated,
        confidence: outcome.confidence,
        escalation_reason: outcome.escalation_reason.map(|r| r.as_str()),
        degraded: outcome.degraded,
    }))
}

async fn tenant_config(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PublicView>, ApiError> {
    let snapshot = gate::admit(&state, &tenant, &headers, &new_correlation_id()).await?;
    Ok(Json(snapshot.config.public_view()))
}

/// Unauthenticated bootstrap for the embedded widget. Serves branding and
/// feature flags only; a suspended tenant's widget goes dark.
async fn widget_config(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Result<Json<WidgetView>, ApiError> {
    let snapshot = gate::resolve_tenant(&state, &tenant).await?;
    if snapshot.tenant.status == helplane_core::domain::tenant::TenantStatus::Suspended {
        return Err(ApiError::from(RequestError::Auth(AuthError::TenantSuspended {
            slug: tenant,
        })));
    }
    Ok(Json(snapshot.config.widget_view()))
}

#[derive(Debug, Deserialize)]
struct AnalyticsParams {
    days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct DayView {
    #[serde(flatten)]
    pub rollup: DailyAnalytics,
    pub escalation_rate_pct: f64,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub days: Vec<DayView>,
}

/// Rolling daily metrics, recomputed on read for every day in the window
/// so the response always covers the full range, quiet days included.
async fn analytics(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
    Query(params): Query<AnalyticsParams>,
) -> Result<Json<AnalyticsResponse>, ApiError> {
    let snapshot = gate::admit(&state, &tenant, &headers, &new_correlation_id()).await?;
    let days = params.days.unwrap_or(DEFAULT_ANALYTICS_DAYS).clamp(1, MAX_ANALYTICS_DAYS);

    let today = Utc::now().date_naive();
    let from = today - Duration::days(i64::from(days) - 1);

    let mut day = from;
    while day <= today {
        state.analytics.recompute_day(&snapshot.tenant.id, day).await.map_err(persistence)?;
        day = day + Duration::days(1);
    }
    let rows = state
        .analytics
        .range(&snapshot.tenant.id, from, today)
        .await
        .map_err(persistence)?;

    let days = rows
        .into_iter()
        .map(|rollup| DayView { escalation_rate_pct: rollup.escalation_rate_pct(), rollup })
        .collect();
    Ok(Json(AnalyticsResponse { days }))
}

async fn dashboard_stats(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TenantOverview>, ApiError> {
    let snapshot = gate::admit(&state, &tenant, &headers, &new_correlation_id()).await?;
    let overview =
        state.analytics.overview(&snapshot.tenant.id).await.map_err(persistence)?;
    Ok(Json(overview))
}

#[derive(Debug, Deserialize)]
struct ConversationPage {
    status: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ConversationList {
    pub conversations: Vec<Conversation>,
}

fn parse_status_filter(raw: Option<&str>) -> Result<Option<ConversationStatus>, ApiError> {
    match raw {
        None => Ok(None),
        Some("active") => Ok(Some(ConversationStatus::Active)),
        Some("resolved") => Ok(Some(ConversationStatus::Resolved)),
        Some("escalated") => Ok(Some(ConversationStatus::Escalated)),
        Some(other) => Err(ApiError::from(RequestError::Validation(format!(
            "unknown status filter `{other}`"
        )))),
    }
}

async fn dashboard_conversations(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
    Query(page): Query<ConversationPage>,
) -> Result<Json<ConversationList>, ApiError> {
    let snapshot = gate::admit(&state, &tenant, &headers, &new_correlation_id()).await?;
    let status = parse_status_filter(page.status.as_deref())?;
    let limit = page.limit.unwrap_or(DEFAULT_CONVERSATION_PAGE).clamp(1, MAX_CONVERSATION_PAGE);
    let offset = page.offset.unwrap_or(0);

    let conversations = state
        .conversations
        .list_recent(&snapshot.tenant.id, status, limit, offset)
        .await
        .map_err(persistence)?;
    Ok(Json(ConversationList { conversations }))
}

#[derive(Debug, Serialize)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

async fn conversation_detail(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<ConversationDetail>, ApiError> {
    let snapshot = gate::admit(&state, &tenant, &headers, &new_correlation_id()).await?;
    let id = ConversationId(id);

    let conversation = state
        .conversations
        .find_by_id(&snapshot.tenant.id, &id)
        .await
        .map_err(persistence)?
        .ok_or(ApiError::NotFound("conversation"))?;
    let messages = state
        .conversations
        .history(&snapshot.tenant.id, &id, None)
        .await
        .map_err(persistence)?;

    Ok(Json(ConversationDetail { conversation, messages }))
}
