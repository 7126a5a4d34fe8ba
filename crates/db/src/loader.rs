//! Cached, validated tenant configuration.
//!
//! The loader resolves a slug to an immutable [`TenantSnapshot`] behind
//! `Arc`. Snapshots are parsed and validated once, then served from the
//! cache until invalidated, so per-request work is a read-locked map lookup
//! and a clone of the `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;

use helplane_core::tenant_config::{TenantConfigError, TenantSnapshot};

use crate::repositories::{RepositoryError, TenantRepository};

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error(transparent)]
    Config(#[from] TenantConfigError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct TenantConfigLoader {
    tenants: Arc<dyn TenantRepository>,
    cache: RwLock<HashMap<String, Arc<TenantSnapshot>>>,
}

impl TenantConfigLoader {
    pub fn new(tenants: Arc<dyn TenantRepository>) -> Self {
        Self { tenants, cache: RwLock::new(HashMap::new()) }
    }

    /// Cached resolve. A tenant whose stored document fails validation never
    /// enters the cache; every resolve re-reports the validation error until
    /// the document is fixed.
    pub async fn resolve(&self, slug: &str) -> Result<Arc<TenantSnapshot>, LoaderError> {
        if let Some(snapshot) = self.cache.read().await.get(slug) {
            return Ok(Arc::clone(snapshot));
        }
        self.reload(slug).await
    }

    /// Re-read from storage and replace whatever the cache held.
    pub async fn reload(&self, slug: &str) -> Result<Arc<TenantSnapshot>, LoaderError> {
        let record = self
            .tenants
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| TenantConfigError::NotFound { slug: slug.to_string() })?;

        let snapshot = Arc::new(TenantSnapshot::from_record(record)?);
        self.cache.write().await.insert(slug.to_string(), Arc::clone(&snapshot));
        Ok(snapshot)
    }

    pub async fn invalidate(&self, slug: &str) {
        self.cache.write().await.remove(slug);
    }

    pub async fn invalidate_all(&self) {
        self.cache.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::json;

    use helplane_core::domain::tenant::{Tenant, TenantId, TenantRecord, TenantStatus};
    use helplane_core::tenant_config::TenantConfigError;

    use super::{LoaderError, TenantConfigLoader};
    use crate::repositories::{InMemoryTenantRepository, TenantRepository};

    fn record(slug: &str, company: &str) -> TenantRecord {
        let now = Utc::now();
        TenantRecord {
            tenant: Tenant {
                id: TenantId(format!("t-{slug}")),
                slug: slug.to_string(),
                name: company.to_string(),
                domain: None,
                status: TenantStatus::Active,
                created_at: now,
                updated_at: now,
            },
            config_doc: json!({
                "branding": { "company_name": company },
                "ai": { "model": "gpt-4o-mini" }
            }),
            secrets_doc: json!({}),
        }
    }

    #[tokio::test]
    async fn resolve_serves_from_cache_until_invalidated() {
        let repo = Arc::new(InMemoryTenantRepository::with_records(vec![record("acme", "Acme")]));
        let loader = TenantConfigLoader::new(repo.clone());

        let first = loader.resolve("acme").await.expect("resolve");
        assert_eq!(first.config.branding.company_name, "Acme");

        repo.save(record("acme", "Acme Renamed")).await.expect("update");
        let cached = loader.resolve("acme").await.expect("resolve cached");
        assert_eq!(cached.config.branding.company_name, "Acme");

        loader.invalidate("acme").await;
        let fresh = loader.resolve("acme").await.expect("resolve fresh");
        assert_eq!(fresh.config.branding.company_name, "Acme Renamed");
    }

    #[tokio::test]
    async fn unknown_slug_is_not_found() {
        let loader = TenantConfigLoader::new(Arc::new(InMemoryTenantRepository::new()));
        let error = loader.resolve("ghost").await.expect_err("should fail");
        assert!(matches!(
            error,
            LoaderError::Config(TenantConfigError::NotFound { ref slug }) if slug == "ghost"
        ));
    }

    #[tokio::test]
    async fn invalid_documents_are_reported_and_never_cached() {
        let mut bad = record("acme", "Acme");
        bad.config_doc = json!({ "branding": {} });
        let repo = Arc::new(InMemoryTenantRepository::with_records(vec![bad]));
        let loader = TenantConfigLoader::new(repo.clone());

        let error = loader.resolve("acme").await.expect_err("should fail");
        assert!(matches!(error, LoaderError::Config(TenantConfigError::Invalid { .. })));

        // Fixing the stored document makes the next resolve succeed without
        // an explicit invalidate.
        repo.save(record("acme", "Acme")).await.expect("fix");
        assert!(loader.resolve("acme").await.is_ok());
    }
}
