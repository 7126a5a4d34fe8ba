use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;
use uuid::Uuid;

use helplane_core::domain::analytics::DailyAnalytics;
use helplane_core::domain::tenant::TenantId;

use super::{AnalyticsRepository, RepositoryError, TenantOverview};
use crate::DbPool;

pub struct SqlAnalyticsRepository {
    pool: DbPool,
}

impl SqlAnalyticsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_rollup(row: &sqlx::sqlite::SqliteRow) -> Result<DailyAnalytics, RepositoryError> {
    let tenant_id: String =
        row.try_get("tenant_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let date: String = row.try_get("date").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let computed_at: String =
        row.try_get("computed_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(DailyAnalytics {
        tenant_id: TenantId(tenant_id),
        date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        total_conversations: row
            .try_get("total_conversations")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        resolved_conversations: row
            .try_get("resolved_conversations")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        escalated_conversations: row
            .try_get("escalated_conversations")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        total_messages: row
            .try_get("total_messages")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        avg_response_time_ms: row
            .try_get("avg_response_time_ms")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        avg_csat_score: row
            .try_get("avg_csat_score")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        computed_at: DateTime::parse_from_rfc3339(&computed_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| RepositoryError::Decode(format!("bad timestamp `{computed_at}`: {e}")))?,
    })
}

#[async_trait::async_trait]
impl AnalyticsRepository for SqlAnalyticsRepository {
    async fn recompute_day(
        &self,
        tenant_id: &TenantId,
        date: NaiveDate,
    ) -> Result<DailyAnalytics, RepositoryError> {
        // Timestamps are stored as UTC RFC 3339, so the date prefix is the
        // UTC calendar day.
        let day = date.format("%Y-%m-%d").to_string();

        let conversations = sqlx::query(
            "SELECT COUNT(*) AS total,
                    COALESCE(SUM(CASE WHEN status = 'resolved' THEN 1 ELSE 0 END), 0) AS resolved,
                    COALESCE(SUM(escalated), 0) AS escalated,
                    AVG(json_extract(metadata, '$.csat')) AS avg_csat
             FROM conversations
             WHERE tenant_id = ? AND substr(started_at, 1, 10) = ?",
        )
        .bind(&tenant_id.0)
        .bind(&day)
        .fetch_one(&self.pool)
        .await?;

        let messages = sqlx::query(
            "SELECT COUNT(*) AS total,
                    AVG(CASE WHEN role = 'assistant'
                        THEN json_extract(metadata, '$.response_time_ms') END) AS avg_rt
             FROM messages
             WHERE tenant_id = ? AND substr(created_at, 1, 10) = ?",
        )
        .bind(&tenant_id.0)
        .bind(&day)
        .fetch_one(&self.pool)
        .await?;

        let mut rollup = DailyAnalytics::empty(tenant_id.clone(), date, Utc::now());
        rollup.total_conversations =
            conversations.try_get("total").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        rollup.resolved_conversations = conversations
            .try_get("resolved")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        rollup.escalated_conversations = conversations
            .try_get("escalated")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        rollup.avg_csat_score = conversations
            .try_get("avg_csat")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        rollup.total_messages =
            messages.try_get("total").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        rollup.avg_response_time_ms =
            messages.try_get("avg_rt").map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO analytics
                 (id, tenant_id, date, total_conversations, resolved_conversations,
                  escalated_conversations, total_messages, avg_response_time_ms,
                  avg_csat_score, computed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(tenant_id, date) DO UPDATE SET
                 total_conversations = excluded.total_conversations,
                 resolved_conversations = excluded.resolved_conversations,
                 escalated_conversations = excluded.escalated_conversations,
                 total_messages = excluded.total_messages,
                 avg_response_time_ms = excluded.avg_response_time_ms,
                 avg_csat_score = excluded.avg_csat_score,
                 computed_at = excluded.computed_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&tenant_id.0)
        .bind(&day)
        .bind(rollup.total_conversations)
        .bind(rollup.resolved_conversations)
        .bind(rollup.escalated_conversations)
        .bind(rollup.total_messages)
        .bind(rollup.avg_response_time_ms)
        .bind(rollup.avg_csat_score)
        .bind(rollup.computed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(rollup)
    }

    async fn range(
        &self,
        tenant_id: &TenantId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyAnalytics>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT tenant_id, date, total_conversations, resolved_conversations,
                    escalated_conversations, total_messages, avg_response_time_ms,
                    avg_csat_score, computed_at
             FROM analytics
             WHERE tenant_id = ? AND date BETWEEN ? AND ?
             ORDER BY date ASC",
        )
        .bind(&tenant_id.0)
        .bind(from.format("%Y-%m-%d").to_string())
        .bind(to.format("%Y-%m-%d").to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_rollup).collect()
    }

    async fn overview(&self, tenant_id: &TenantId) -> Result<TenantOverview, RepositoryError> {
        let conversations = sqlx::query(
            "SELECT COUNT(*) AS total,
                    COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0) AS active,
                    COALESCE(SUM(CASE WHEN status = 'resolved' THEN 1 ELSE 0 END), 0) AS resolved,
                    COALESCE(SUM(CASE WHEN status = 'escalated' THEN 1 ELSE 0 END), 0) AS escalated
             FROM conversations WHERE tenant_id = ?",
        )
        .bind(&tenant_id.0)
        .fetch_one(&self.pool)
        .await?;

        let messages = sqlx::query("SELECT COUNT(*) AS total FROM messages WHERE tenant_id = ?")
            .bind(&tenant_id.0)
            .fetch_one(&self.pool)
            .await?;

        Ok(TenantOverview {
            total_conversations: conversations
                .try_get("total")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
            active_conversations: conversations
                .try_get("active")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
            resolved_conversations: conversations
                .try_get("resolved")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
            escalated_conversations: conversations
                .try_get("escalated")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
            total_messages: messages
                .try_get("total")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        })
    }
}
