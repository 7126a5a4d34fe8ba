use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use helplane_core::domain::conversation::{
    Channel, Conversation, ConversationId, ConversationStatus,
};
use helplane_core::domain::message::{Message, MessageId, MessageRole};
use helplane_core::domain::tenant::TenantId;

use super::{ConversationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("bad timestamp `{raw}`: {e}")))
}

fn parse_metadata(raw: &str) -> Result<serde_json::Value, RepositoryError> {
    serde_json::from_str(raw).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> Result<Conversation, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tenant_id: String =
        row.try_get("tenant_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let session_id: String =
        row.try_get("session_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let channel: String =
        row.try_get("channel").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let escalated: i64 =
        row.try_get("escalated").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let started_at: String =
        row.try_get("started_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let last_activity_at: String =
        row.try_get("last_activity_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let message_count: i64 =
        row.try_get("message_count").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let metadata: String =
        row.try_get("metadata").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Conversation {
        id: ConversationId(id),
        tenant_id: TenantId(tenant_id),
        session_id,
        channel: Channel::parse(&channel).map_err(RepositoryError::Domain)?,
        status: ConversationStatus::parse(&status),
        escalated: escalated != 0,
        started_at: parse_timestamp(&started_at)?,
        last_activity_at: parse_timestamp(&last_activity_at)?,
        message_count,
        metadata: parse_metadata(&metadata)?,
    })
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let conversation_id: String =
        row.try_get("conversation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tenant_id: String =
        row.try_get("tenant_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let seq: i64 = row.try_get("seq").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role: String = row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let content: String =
        row.try_get("content").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let metadata: String =
        row.try_get("metadata").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Message {
        id: MessageId(id),
        conversation_id: ConversationId(conversation_id),
        tenant_id: TenantId(tenant_id),
        seq,
        role: MessageRole::parse(&role).map_err(RepositoryError::Domain)?,
        content,
        metadata: parse_metadata(&metadata)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

const CONVERSATION_COLUMNS: &str = "id, tenant_id, session_id, channel, status, escalated,
             started_at, last_activity_at, message_count, metadata";

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn get_or_create(
        &self,
        tenant_id: &TenantId,
        session_id: &str,
        channel: Channel,
    ) -> Result<Conversation, RepositoryError> {
        let now = Utc::now().to_rfc3339();

        // Losing the insert race is fine; the unique constraint guarantees
        // the reselect sees exactly one winner.
        sqlx::query(
            "INSERT INTO conversations
                 (id, tenant_id, session_id, channel, status, escalated,
                  started_at, last_activity_at, message_count, metadata)
             VALUES (?, ?, ?, ?, 'active', 0, ?, ?, 0, '{}')
             ON CONFLICT(tenant_id, session_id, channel) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&tenant_id.0)
        .bind(session_id)
        .bind(channel.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE tenant_id = ? AND session_id = ? AND channel = ?"
        ))
        .bind(&tenant_id.0)
        .bind(session_id)
        .bind(channel.as_str())
        .fetch_one(&self.pool)
        .await?;

        row_to_conversation(&row)
    }

    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ? AND tenant_id = ?"
        ))
        .bind(&id.0)
        .bind(&tenant_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_conversation(r)?)),
            None => Ok(None),
        }
    }

    async fn append_message(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        role: MessageRole,
        content: &str,
        metadata: serde_json::Value,
    ) -> Result<Message, RepositoryError> {
        // Immediate transaction: the seq read below must hold the write
        // lock, or a concurrent append would fail the lock upgrade.
        let mut tx = crate::connection::begin_write(&self.pool).await?;

        let exists = sqlx::query("SELECT id FROM conversations WHERE id = ? AND tenant_id = ?")
            .bind(&conversation_id.0)
            .bind(&tenant_id.0)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(RepositoryError::ConversationNotFound);
        }

        let seq: i64 = sqlx::query(
            "SELECT COALESCE(MAX(seq), 0) + 1 AS next_seq FROM messages
             WHERE conversation_id = ?",
        )
        .bind(&conversation_id.0)
        .fetch_one(&mut *tx)
        .await?
        .try_get("next_seq")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        let message = Message {
            id: MessageId(Uuid::new_v4().to_string()),
            conversation_id: conversation_id.clone(),
            tenant_id: tenant_id.clone(),
            seq,
            role,
            content: content.to_string(),
            metadata,
            created_at: Utc::now(),
        };

        let metadata_raw = serde_json::to_string(&message.metadata)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO messages
                 (id, conversation_id, tenant_id, seq, role, content, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id.0)
        .bind(&message.conversation_id.0)
        .bind(&message.tenant_id.0)
        .bind(message.seq)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&metadata_raw)
        .bind(message.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE conversations
             SET message_count = message_count + 1, last_activity_at = ?
             WHERE id = ? AND tenant_id = ?",
        )
        .bind(message.created_at.to_rfc3339())
        .bind(&conversation_id.0)
        .bind(&tenant_id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(message)
    }

    async fn history(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, RepositoryError> {
        let rows = match limit {
            Some(limit) => {
                sqlx::query(
                    "SELECT * FROM (
                         SELECT id, conversation_id, tenant_id, seq, role, content,
                                metadata, created_at
                         FROM messages
                         WHERE conversation_id = ? AND tenant_id = ?
                         ORDER BY seq DESC LIMIT ?
                     ) ORDER BY seq ASC",
                )
                .bind(&conversation_id.0)
                .bind(&tenant_id.0)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, conversation_id, tenant_id, seq, role, content,
                            metadata, created_at
                     FROM messages
                     WHERE conversation_id = ? AND tenant_id = ?
                     ORDER BY seq ASC",
                )
                .bind(&conversation_id.0)
                .bind(&tenant_id.0)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_message).collect()
    }

    async fn set_status(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        status: ConversationStatus,
    ) -> Result<Conversation, RepositoryError> {
        let mut conversation = self
            .find_by_id(tenant_id, conversation_id)
            .await?
            .ok_or(RepositoryError::ConversationNotFound)?;

        conversation.transition_to(status)?;
        conversation.last_activity_at = Utc::now();

        sqlx::query(
            "UPDATE conversations SET status = ?, escalated = ?, last_activity_at = ?
             WHERE id = ? AND tenant_id = ?",
        )
        .bind(conversation.status.as_str())
        .bind(i64::from(conversation.escalated))
        .bind(conversation.last_activity_at.to_rfc3339())
        .bind(&conversation_id.0)
        .bind(&tenant_id.0)
        .execute(&self.pool)
        .await?;

        Ok(conversation)
    }

    async fn list_recent(
        &self,
        tenant_id: &TenantId,
        status: Option<ConversationStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE tenant_id = ? AND status = ?
                     ORDER BY last_activity_at DESC
                     LIMIT ? OFFSET ?"
                ))
                .bind(&tenant_id.0)
                .bind(status.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE tenant_id = ?
                     ORDER BY last_activity_at DESC
                     LIMIT ? OFFSET ?"
                ))
                .bind(&tenant_id.0)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_conversation).collect()
    }
}
