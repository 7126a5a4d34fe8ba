//! Shared fixtures for handler tests: an [`AppState`] wired to in-memory
//! backends and a scripted model, so routing and policy can be exercised
//! without a database or a provider.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use chrono::{NaiveDate, Utc};
use serde_json::json;

use helplane_agent::llm::{GeneratedReply, LlmClient, ReplyRequest};
use helplane_agent::notify::InMemoryNotifier;
use helplane_agent::pipeline::ChatPipeline;
use helplane_agent::retrieval::NoopRetrieval;
use helplane_core::audit::InMemoryAuditSink;
use helplane_core::auth::hash_api_key;
use helplane_core::domain::analytics::DailyAnalytics;
use helplane_core::domain::tenant::{Tenant, TenantId, TenantRecord, TenantStatus};
use helplane_core::ratelimit::RateLimiter;
use helplane_db::repositories::{
    AnalyticsRepository, InMemoryConversationRepository, InMemoryTenantRepository,
    RepositoryError, TenantOverview,
};
use helplane_db::TenantConfigLoader;

use crate::gate::API_KEY_HEADER;
use crate::state::AppState;

pub const TEST_API_KEY: &str = "acme_live_fixture_key";

/// Fixture keys are minted per slug so cross-tenant key reuse fails the way
/// it does in production. [`TEST_API_KEY`] is the "acme" key.
pub fn api_key_for(slug: &str) -> String {
    format!("{}_live_fixture_key", slug.replace('-', "_"))
}

pub fn tenant_record(slug: &str, per_minute: u32) -> TenantRecord {
    let now = Utc::now();
    TenantRecord {
        tenant: Tenant {
            id: TenantId(format!("t-{slug}")),
            slug: slug.to_string(),
            name: "Acme Dental".to_string(),
            domain: None,
            status: TenantStatus::Active,
            created_at: now,
            updated_at: now,
        },
        config_doc: json!({
            "branding": { "company_name": "Acme Dental" },
            "ai": { "model": "gpt-4o-mini" },
            "escalation": { "keywords": ["speak to a human"] },
            "rate_limits": { "per_minute": per_minute },
            "business": { "phone": "+1 555 0100" }
        }),
        secrets_doc: json!({ "api_key_hash": hash_api_key(&api_key_for(slug)) }),
    }
}

pub fn api_key_headers(key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static(API_KEY_HEADER),
        HeaderValue::from_str(key).expect("header value"),
    );
    headers
}

pub struct ScriptedLlm {
    pub reply: &'static str,
    pub confidence: f64,
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(&self, _request: &ReplyRequest) -> Result<GeneratedReply> {
        Ok(GeneratedReply { text: self.reply.to_string(), confidence: self.confidence })
    }
}

/// Analytics fake: recompute inserts an empty rollup, range filters stored
/// rows, overview echoes a preset.
#[derive(Default)]
pub struct FakeAnalytics {
    rows: Mutex<Vec<DailyAnalytics>>,
    overview: TenantOverview,
}

impl FakeAnalytics {
    pub fn with_rows(rows: Vec<DailyAnalytics>, overview: TenantOverview) -> Self {
        Self { rows: Mutex::new(rows), overview }
    }
}

#[async_trait]
impl AnalyticsRepository for FakeAnalytics {
    async fn recompute_day(
        &self,
        tenant_id: &TenantId,
        date: NaiveDate,
    ) -> Result<DailyAnalytics, RepositoryError> {
        let mut rows = self.rows.lock().expect("rows lock");
        if let Some(row) = rows.iter().find(|r| r.tenant_id == *tenant_id && r.date == date) {
            return Ok(row.clone());
        }
        let row = DailyAnalytics::empty(tenant_id.clone(), date, Utc::now());
        rows.push(row.clone());
        Ok(row)
    }

    async fn range(
        &self,
        tenant_id: &TenantId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyAnalytics>, RepositoryError> {
        let mut rows: Vec<DailyAnalytics> = self
            .rows
            .lock()
            .expect("rows lock")
            .iter()
            .filter(|r| r.tenant_id == *tenant_id && r.date >= from && r.date <= to)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.date);
        Ok(rows)
    }

    async fn overview(&self, tenant_id: &TenantId) -> Result<TenantOverview, RepositoryError> {
        let _ = tenant_id;
        Ok(self.overview.clone())
    }
}

pub fn test_state(records: Vec<TenantRecord>) -> (AppState, InMemoryAuditSink) {
    test_state_with(records, FakeAnalytics::default())
}

pub fn test_state_with(
    records: Vec<TenantRecord>,
    analytics: FakeAnalytics,
) -> (AppState, InMemoryAuditSink) {
    let tenants = Arc::new(InMemoryTenantRepository::with_records(records));
    let conversations = Arc::new(InMemoryConversationRepository::new());
    let audit = InMemoryAuditSink::default();
    let retrieval = Arc::new(NoopRetrieval);

    let pipeline = Arc::new(ChatPipeline::new(
        conversations.clone(),
        Arc::new(ScriptedLlm { reply: "Happy to help!", confidence: 0.9 }),
        retrieval.clone(),
        Arc::new(InMemoryNotifier::new()),
        Arc::new(audit.clone()),
    ));

    let state = AppState {
        loader: Arc::new(TenantConfigLoader::new(tenants)),
        limiter: Arc::new(RateLimiter::new()),
        pipeline,
        conversations,
        analytics: Arc::new(analytics),
        retrieval,
        audit: Arc::new(audit.clone()),
    };
    (state, audit)
}
