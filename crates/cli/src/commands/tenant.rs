use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use helplane_core::auth::{generate_api_key, hash_api_key};
use helplane_core::config::{AppConfig, LoadOptions};
use helplane_core::domain::tenant::{Tenant, TenantId, TenantRecord, TenantStatus};
use helplane_core::tenant_config::TenantSnapshot;
use helplane_db::repositories::{SqlTenantRepository, TenantRepository};
use helplane_db::{connect_with_settings, migrations};

use crate::commands::CommandResult;

pub fn create(slug: &str, name: &str, model: &str) -> CommandResult {
    if let Err(reason) = validate_slug(slug) {
        return CommandResult::failure("create-tenant", "invalid_slug", reason, 2);
    }
    if name.trim().is_empty() {
        return CommandResult::failure(
            "create-tenant",
            "invalid_name",
            "tenant name must not be empty",
            2,
        );
    }

    let (record, api_key) = new_tenant_record(slug, name, model);

    // The record must round-trip through snapshot validation before it is
    // allowed anywhere near storage.
    if let Err(error) = TenantSnapshot::from_record(record.clone()) {
        return CommandResult::failure("create-tenant", "invalid_config", error.to_string(), 2);
    }

    with_repository("create-tenant", move |repo| async move {
        if repo.find_by_slug(&record.tenant.slug).await?.is_some() {
            return Ok(CommandResult::failure(
                "create-tenant",
                "tenant_exists",
                format!("tenant `{}` already exists", record.tenant.slug),
                6,
            ));
        }

        let slug = record.tenant.slug.clone();
        repo.save(record).await?;
        Ok(CommandResult::success(
            "create-tenant",
            format!("created tenant `{slug}`; API key (shown once): {api_key}"),
        ))
    })
}

pub fn list() -> CommandResult {
    with_repository("list-tenants", |repo| async move {
        let slugs = repo.list_slugs().await?;
        if slugs.is_empty() {
            return Ok(CommandResult::success("list-tenants", "no tenants provisioned"));
        }
        Ok(CommandResult::success("list-tenants", slugs.join(", ")))
    })
}

pub fn set_status(slug: &str, status: TenantStatus) -> CommandResult {
    let command = match status {
        TenantStatus::Suspended => "suspend",
        TenantStatus::Active => "activate",
    };
    let slug = slug.to_string();

    with_repository(command, move |repo| async move {
        if repo.set_status(&slug, status).await? {
            Ok(CommandResult::success(
                command,
                format!("tenant `{slug}` is now {}", status.as_str()),
            ))
        } else {
            Ok(CommandResult::failure(
                command,
                "tenant_not_found",
                format!("tenant `{slug}` does not exist"),
                6,
            ))
        }
    })
}

/// A fresh record with the minimum viable configuration document and a newly
/// minted key. Only the key's hash lands in the secret document; the raw key
/// is returned for one-time display.
pub fn new_tenant_record(slug: &str, name: &str, model: &str) -> (TenantRecord, String) {
    let now = Utc::now();
    let api_key = generate_api_key(slug);

    let record = TenantRecord {
        tenant: Tenant {
            id: TenantId(format!("t-{}", Uuid::new_v4())),
            slug: slug.to_string(),
            name: name.to_string(),
            domain: None,
            status: TenantStatus::Active,
            created_at: now,
            updated_at: now,
        },
        config_doc: json!({
            "branding": { "company_name": name },
            "ai": { "model": model },
        }),
        secrets_doc: json!({ "api_key_hash": hash_api_key(&api_key) }),
    };
    (record, api_key)
}

fn validate_slug(slug: &str) -> Result<(), String> {
    if slug.is_empty() || slug.len() > 64 {
        return Err("slug must be 1-64 characters".to_string());
    }
    if slug.starts_with('-') || slug.ends_with('-') {
        return Err("slug must not start or end with a hyphen".to_string());
    }
    if !slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err("slug may only contain lowercase letters, digits, and hyphens".to_string());
    }
    Ok(())
}

fn with_repository<F, Fut>(command: &'static str, body: F) -> CommandResult
where
    F: FnOnce(SqlTenantRepository) -> Fut,
    Fut: std::future::Future<Output = Result<CommandResult, helplane_db::repositories::RepositoryError>>,
{
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let outcome = body(SqlTenantRepository::new(pool.clone()))
            .await
            .map_err(|error| ("repository", error.to_string(), 5u8));
        pool.close().await;
        outcome
    });

    match result {
        Ok(outcome) => outcome,
        Err((error_class, message, exit_code)) => {
            CommandResult::failure(command, error_class, message, exit_code)
        }
    }
}
