use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use helplane_core::domain::analytics::DailyAnalytics;
use helplane_core::domain::conversation::{
    Channel, Conversation, ConversationId, ConversationStatus,
};
use helplane_core::domain::message::{Message, MessageRole};
use helplane_core::domain::tenant::{TenantId, TenantRecord, TenantStatus};
use helplane_core::errors::DomainError;

pub mod analytics;
pub mod conversation;
pub mod memory;
pub mod tenant;

pub use analytics::SqlAnalyticsRepository;
pub use conversation::SqlConversationRepository;
pub use memory::{InMemoryConversationRepository, InMemoryTenantRepository};
pub use tenant::SqlTenantRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("conversation not found")]
    ConversationNotFound,
}

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<TenantRecord>, RepositoryError>;
    async fn save(&self, record: TenantRecord) -> Result<(), RepositoryError>;
    async fn set_status(&self, slug: &str, status: TenantStatus)
        -> Result<bool, RepositoryError>;
    async fn list_slugs(&self) -> Result<Vec<String>, RepositoryError>;
}

/// Append-only conversation store. Every method takes the tenant id and
/// every SQL statement filters on it; a conversation id from another tenant
/// behaves exactly like a missing one.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Exactly-once per (tenant, session, channel): concurrent first
    /// messages converge on one conversation row.
    async fn get_or_create(
        &self,
        tenant_id: &TenantId,
        session_id: &str,
        channel: Channel,
    ) -> Result<Conversation, RepositoryError>;

    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError>;

    /// Assigns the next `seq` and bumps the conversation's activity counters
    /// in one transaction.
    async fn append_message(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        role: MessageRole,
        content: &str,
        metadata: serde_json::Value,
    ) -> Result<Message, RepositoryError>;

    /// Messages in `seq` order. With a limit, the *last* `limit` messages,
    /// still ascending.
    async fn history(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, RepositoryError>;

    /// Applies the domain transition rules; an illegal transition surfaces
    /// as [`RepositoryError::Domain`] and writes nothing.
    async fn set_status(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        status: ConversationStatus,
    ) -> Result<Conversation, RepositoryError>;

    /// Most recently active first, optionally narrowed to one status.
    async fn list_recent(
        &self,
        tenant_id: &TenantId,
        status: Option<ConversationStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Conversation>, RepositoryError>;
}

/// Live counters for the dashboard, computed straight from the conversation
/// and message tables rather than the daily rollups.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TenantOverview {
    pub total_conversations: i64,
    pub active_conversations: i64,
    pub resolved_conversations: i64,
    pub escalated_conversations: i64,
    pub total_messages: i64,
}

#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    /// Recompute the rollup for one (tenant, day) from scratch and upsert
    /// it. Safe to rerun; the same inputs always produce the same row.
    async fn recompute_day(
        &self,
        tenant_id: &TenantId,
        date: NaiveDate,
    ) -> Result<DailyAnalytics, RepositoryError>;

    /// Stored rollups for `from..=to`, ascending by date. Days with no
    /// stored row are absent, not zero-filled.
    async fn range(
        &self,
        tenant_id: &TenantId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyAnalytics>, RepositoryError>;

    async fn overview(&self, tenant_id: &TenantId) -> Result<TenantOverview, RepositoryError>;
}
