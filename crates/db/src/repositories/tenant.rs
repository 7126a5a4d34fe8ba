use chrono::{DateTime, Utc};
use sqlx::Row;

use helplane_core::domain::tenant::{Tenant, TenantId, TenantRecord, TenantStatus};

use super::{RepositoryError, TenantRepository};
use crate::DbPool;

pub struct SqlTenantRepository {
    pool: DbPool,
}

impl SqlTenantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("bad timestamp `{raw}`: {e}")))
}

fn parse_document(raw: &str) -> Result<serde_json::Value, RepositoryError> {
    serde_json::from_str(raw).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<TenantRecord, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let slug: String = row.try_get("slug").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let domain: Option<String> =
        row.try_get("domain").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let config: String =
        row.try_get("config").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let secrets: String =
        row.try_get("secrets").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(TenantRecord {
        tenant: Tenant {
            id: TenantId(id),
            slug,
            name,
            domain,
            status: TenantStatus::parse(&status),
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        },
        config_doc: parse_document(&config)?,
        secrets_doc: parse_document(&secrets)?,
    })
}

#[async_trait::async_trait]
impl TenantRepository for SqlTenantRepository {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<TenantRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, slug, name, domain, config, secrets, status, created_at, updated_at
             FROM tenants WHERE slug = ?",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_record(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, record: TenantRecord) -> Result<(), RepositoryError> {
        let config = serde_json::to_string(&record.config_doc)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let secrets = serde_json::to_string(&record.secrets_doc)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO tenants (id, slug, name, domain, config, secrets, status,
                                  created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(slug) DO UPDATE SET
                 name = excluded.name,
                 domain = excluded.domain,
                 config = excluded.config,
                 secrets = excluded.secrets,
                 status = excluded.status,
                 updated_at = excluded.updated_at",
        )
        .bind(&record.tenant.id.0)
        .bind(&record.tenant.slug)
        .bind(&record.tenant.name)
        .bind(&record.tenant.domain)
        .bind(&config)
        .bind(&secrets)
        .bind(record.tenant.status.as_str())
        .bind(record.tenant.created_at.to_rfc3339())
        .bind(record.tenant.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_status(
        &self,
        slug: &str,
        status: TenantStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE tenants SET status = ?, updated_at = ? WHERE slug = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(slug)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_slugs(&self) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query("SELECT slug FROM tenants ORDER BY slug")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get("slug").map_err(|e| RepositoryError::Decode(e.to_string())))
            .collect()
    }
}
