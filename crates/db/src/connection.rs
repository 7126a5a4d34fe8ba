use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, Transaction};

pub type DbPool = sqlx::SqlitePool;

/// How long a connection waits on SQLite's write lock before giving up.
/// Concurrent appends from several channels serialize on that lock, so this
/// has to comfortably exceed one append transaction.
const BUSY_TIMEOUT_MS: u32 = 5_000;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA synchronous = NORMAL").execute(&mut *conn).await?;
                sqlx::query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}

/// Begin a transaction that takes the write lock up front.
///
/// Message appends read `max(seq)` before inserting. Under WAL a deferred
/// transaction that read first cannot upgrade to a writer once another
/// writer has committed; it fails with `SQLITE_BUSY_SNAPSHOT` instead of
/// waiting. Starting immediate makes concurrent writers queue on the busy
/// timeout and serialize.
pub async fn begin_write(pool: &DbPool) -> Result<Transaction<'_, Sqlite>, sqlx::Error> {
    pool.begin_with("BEGIN IMMEDIATE").await
}
