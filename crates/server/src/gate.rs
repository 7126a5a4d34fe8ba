//! The per-request admission gate: resolve the tenant named in the URL
//! path, verify the API key header against that tenant, then charge the
//! rate limiter. A key minted for tenant A never admits a request on
//! tenant B's path because the comparison runs against the snapshot the
//! path slug resolved to.

use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::Utc;

use helplane_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use helplane_core::auth::authenticate;
use helplane_core::errors::{AuthError, RequestError};
use helplane_core::ratelimit::RateDecision;
use helplane_core::tenant_config::{TenantConfigError, TenantSnapshot};
use helplane_db::LoaderError;

use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Full admission for a key-authenticated request.
pub async fn admit(
    state: &AppState,
    slug: &str,
    headers: &HeaderMap,
    correlation_id: &str,
) -> Result<Arc<TenantSnapshot>, RequestError> {
    let snapshot = resolve_tenant(state, slug).await?;

    let presented = header_value(headers, API_KEY_HEADER).unwrap_or_default();
    if let Err(error) = authenticate(&snapshot.tenant, &snapshot.secrets, &presented) {
        state.audit.emit(
            AuditEvent::new(
                slug,
                None,
                correlation_id,
                "auth.rejected",
                AuditCategory::Auth,
                AuditOutcome::Rejected,
            )
            .with_metadata("reason", error.to_string()),
        );
        return Err(RequestError::Auth(error));
    }

    charge_rate_limit(state, &snapshot, correlation_id)?;
    Ok(snapshot)
}

/// Admission for telephony webhooks. No API key: the webhook URL itself is
/// the shared secret with the telephony provider.
pub async fn admit_webhook(
    state: &AppState,
    slug: &str,
    correlation_id: &str,
) -> Result<Arc<TenantSnapshot>, RequestError> {
    let snapshot = resolve_tenant(state, slug).await?;
    if snapshot.tenant.status == helplane_core::domain::tenant::TenantStatus::Suspended {
        return Err(RequestError::Auth(AuthError::TenantSuspended {
            slug: slug.to_string(),
        }));
    }
    charge_rate_limit(state, &snapshot, correlation_id)?;
    Ok(snapshot)
}

pub(crate) async fn resolve_tenant(
    state: &AppState,
    slug: &str,
) -> Result<Arc<TenantSnapshot>, RequestError> {
    state.loader.resolve(slug).await.map_err(|error| match error {
        LoaderError::Config(TenantConfigError::NotFound { slug }) => {
            RequestError::Auth(AuthError::TenantNotFound { slug })
        }
        LoaderError::Config(invalid @ TenantConfigError::Invalid { .. }) => {
            // The stored document is broken; the operator has to fix it, the
            // caller cannot.
            RequestError::Persistence(invalid.to_string())
        }
        LoaderError::Repository(error) => RequestError::Persistence(error.to_string()),
    })
}

fn charge_rate_limit(
    state: &AppState,
    snapshot: &TenantSnapshot,
    correlation_id: &str,
) -> Result<(), RequestError> {
    match state.limiter.check(snapshot.slug(), &snapshot.config.rate_limits, Utc::now()) {
        RateDecision::Allow { .. } => Ok(()),
        RateDecision::Deny { window, retry_after_secs } => {
            state.audit.emit(
                AuditEvent::new(
                    snapshot.slug(),
                    None,
                    correlation_id,
                    "rate_limit.rejected",
                    AuditCategory::RateLimit,
                    AuditOutcome::Rejected,
                )
                .with_metadata("window", window.as_str())
                .with_metadata("retry_after_secs", retry_after_secs.to_string()),
            );
            Err(RequestError::RateLimited { window, retry_after_secs })
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderMap;

    use helplane_core::audit::AuditOutcome;
    use helplane_core::errors::{AuthError, RequestError};

    use crate::test_support::{api_key_headers, tenant_record, test_state, TEST_API_KEY};

    use super::{admit, admit_webhook};

    #[tokio::test]
    async fn valid_key_admits_the_request() {
        let (state, _audit) = test_state(vec![tenant_record("acme", 60)]);
        let snapshot = admit(&state, "acme", &api_key_headers(TEST_API_KEY), "req-1")
            .await
            .expect("admitted");
        assert_eq!(snapshot.slug(), "acme");
    }

    #[tokio::test]
    async fn missing_key_is_an_auth_error() {
        let (state, _audit) = test_state(vec![tenant_record("acme", 60)]);
        let error = admit(&state, "acme", &HeaderMap::new(), "req-1").await.unwrap_err();
        assert!(matches!(error, RequestError::Auth(AuthError::KeyMismatch { .. })));
    }

    #[tokio::test]
    async fn wrong_key_is_rejected_and_audited() {
        let (state, audit) = test_state(vec![tenant_record("acme", 60)]);
        let error = admit(&state, "acme", &api_key_headers("not-the-key"), "req-1")
            .await
            .unwrap_err();

        assert!(matches!(error, RequestError::Auth(AuthError::KeyMismatch { .. })));
        let events = audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "auth.rejected");
        assert_eq!(events[0].outcome, AuditOutcome::Rejected);
    }

    #[tokio::test]
    async fn one_tenants_key_never_opens_anothers_path() {
        let (state, _audit) =
            test_state(vec![tenant_record("acme", 60), tenant_record("rival", 60)]);

        // TEST_API_KEY is minted per slug, so acme's fixture key fails on
        // rival's path.
        let key = crate::test_support::api_key_for("acme");
        admit(&state, "acme", &api_key_headers(&key), "req-1").await.expect("own path");
        let error = admit(&state, "rival", &api_key_headers(&key), "req-2").await.unwrap_err();
        assert!(matches!(error, RequestError::Auth(AuthError::KeyMismatch { .. })));
    }

    #[tokio::test]
    async fn unknown_tenant_is_an_auth_error() {
        let (state, _audit) = test_state(vec![]);
        let error = admit(&state, "ghost", &api_key_headers(TEST_API_KEY), "req-1")
            .await
            .unwrap_err();
        assert!(matches!(error, RequestError::Auth(AuthError::TenantNotFound { .. })));
    }

    #[tokio::test]
    async fn rate_limit_denies_past_the_ceiling_and_audits() {
        let (state, audit) = test_state(vec![tenant_record("acme", 1)]);
        let headers = api_key_headers(TEST_API_KEY);

        admit(&state, "acme", &headers, "req-1").await.expect("first request fits");
        let error = admit(&state, "acme", &headers, "req-2").await.unwrap_err();

        assert!(matches!(error, RequestError::RateLimited { .. }));
        assert!(audit.events().iter().any(|e| e.event_type == "rate_limit.rejected"));
    }

    #[tokio::test]
    async fn webhook_admission_skips_the_key_but_keeps_the_limit() {
        let (state, _audit) = test_state(vec![tenant_record("acme", 1)]);

        admit_webhook(&state, "acme", "req-1").await.expect("webhook admitted");
        let error = admit_webhook(&state, "acme", "req-2").await.unwrap_err();
        assert!(matches!(error, RequestError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn suspended_tenant_cannot_use_webhooks() {
        let mut record = tenant_record("acme", 60);
        record.tenant.status = helplane_core::domain::tenant::TenantStatus::Suspended;
        let (state, _audit) = test_state(vec![record]);

        let error = admit_webhook(&state, "acme", "req-1").await.unwrap_err();
        assert!(matches!(error, RequestError::Auth(AuthError::TenantSuspended { .. })));
    }
}
