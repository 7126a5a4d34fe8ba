use sqlx::migrate::{MigrateError, Migrator};
use sqlx::Row;

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Applies outstanding migrations and reports how many ran, so callers can
/// log "applied 0" on a warm database versus a real schema change.
pub async fn run_pending(pool: &DbPool) -> Result<u64, MigrateError> {
    let before = ledger_count(pool).await;
    MIGRATOR.run(pool).await?;
    let after = ledger_count(pool).await;
    Ok(after.saturating_sub(before))
}

// The ledger table is absent on a fresh database; that reads as zero.
async fn ledger_count(pool: &DbPool) -> u64 {
    match sqlx::query("SELECT COUNT(*) AS count FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
    {
        Ok(row) => row.try_get::<i64, _>("count").unwrap_or(0) as u64,
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::connect_with_settings;

    const MANAGED_TABLES: &[&str] = &["tenants", "conversations", "messages", "analytics"];

    #[tokio::test]
    async fn migrations_create_baseline_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for table in MANAGED_TABLES {
            let count = sqlx::query(
                "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .expect("check table")
            .get::<i64, _>("count");
            assert_eq!(count, 1, "table `{table}` should exist after migrations");
        }
    }

    #[tokio::test]
    async fn rerunning_migrations_applies_nothing_new() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");

        let first = run_pending(&pool).await.expect("first run");
        assert!(first > 0, "a fresh database applies the whole set");

        let second = run_pending(&pool).await.expect("second run");
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn conversation_identity_is_unique_per_tenant_session_channel() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query(
            "INSERT INTO tenants (id, slug, name, created_at, updated_at)
             VALUES ('t-1', 'acme', 'Acme', '2026-08-30T00:00:00Z', '2026-08-30T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert tenant");

        let insert = "INSERT INTO conversations
             (id, tenant_id, session_id, channel, started_at, last_activity_at)
             VALUES (?, 't-1', 's-1', 'web', '2026-08-30T00:00:00Z', '2026-08-30T00:00:00Z')";
        sqlx::query(insert).bind("c-1").execute(&pool).await.expect("first insert");
        let duplicate = sqlx::query(insert).bind("c-2").execute(&pool).await;
        assert!(duplicate.is_err(), "duplicate (tenant, session, channel) must be rejected");
    }
}
