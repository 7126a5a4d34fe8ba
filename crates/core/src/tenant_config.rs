//! Typed per-tenant configuration.
//!
//! Each tenant persists two JSON documents: a configuration document
//! (branding, AI parameters, business rules, feature flags, rate limits)
//! and a secret credential document. [`TenantSnapshot::from_record`] parses
//! both into typed form; a document that fails validation keeps the tenant
//! from activating instead of crashing the process. Secrets land in
//! [`TenantSecrets`], which deliberately implements no serialization, so
//! credential material cannot cross into an endpoint response by type.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Timelike, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::tenant::{Tenant, TenantRecord};
use crate::ratelimit::WindowKind;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TenantConfigError {
    #[error("tenant `{slug}` not found")]
    NotFound { slug: String },
    #[error("invalid configuration for tenant `{slug}`: {reason}")]
    Invalid { slug: String, reason: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Branding {
    pub company_name: String,
    pub primary_color: String,
    pub secondary_color: String,
    pub welcome_message: String,
    pub logo_url: String,
    pub widget_position: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support_email: Option<String>,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            company_name: String::new(),
            primary_color: "#667eea".to_string(),
            secondary_color: "#764ba2".to_string(),
            welcome_message: "Hi! How can we help you today?".to_string(),
            logo_url: String::new(),
            widget_position: "bottom-right".to_string(),
            support_email: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub system_prompt: String,
    pub history_limit: u32,
    pub retrieval_top_k: u32,
    pub retrieval_score_threshold: f64,
    pub fallback_replies: Vec<String>,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.7,
            max_tokens: 500,
            system_prompt: "You are a helpful customer support assistant.".to_string(),
            history_limit: 10,
            retrieval_top_k: 5,
            retrieval_score_threshold: 0.7,
            fallback_replies: vec![
                "I'm having trouble processing that right now. Please try again or contact \
                 support."
                    .to_string(),
            ],
        }
    }
}

impl AiSettings {
    pub fn fallback_reply(&self) -> &str {
        self.fallback_replies.first().map(String::as_str).unwrap_or(
            "I'm having trouble processing that right now. Please try again or contact support.",
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationRules {
    pub keywords: Vec<String>,
    /// Replies below this confidence escalate; 0.0 disables the rule.
    pub confidence_threshold: f64,
    /// Unresolved conversations longer than this escalate; 0 disables.
    pub max_messages: u32,
    pub out_of_hours_urgent: bool,
    pub urgent_keywords: Vec<String>,
}

impl Default for EscalationRules {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            confidence_threshold: 0.0,
            max_messages: 0,
            out_of_hours_urgent: false,
            urgent_keywords: vec![
                "urgent".to_string(),
                "emergency".to_string(),
                "asap".to_string(),
                "immediately".to_string(),
            ],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self { per_minute: 60, per_hour: 0, per_day: 0 }
    }
}

impl RateLimits {
    /// A ceiling of zero means the window is not enforced.
    pub fn ceiling(&self, window: WindowKind) -> Option<u32> {
        let value = match window {
            WindowKind::Minute => self.per_minute,
            WindowKind::Hour => self.per_hour,
            WindowKind::Day => self.per_day,
        };
        (value > 0).then_some(value)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessHours {
    /// Opening hour, 0-23, inclusive.
    pub open_hour: u32,
    /// Closing hour, 0-23, exclusive.
    pub close_hour: u32,
    /// Lowercase three-letter day names, e.g. `["mon", "tue", ...]`.
    pub days: Vec<String>,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            open_hour: 9,
            close_hour: 17,
            days: ["mon", "tue", "wed", "thu", "fri"].iter().map(ToString::to_string).collect(),
        }
    }
}

impl BusinessHours {
    pub fn is_open(&self, at: DateTime<Utc>) -> bool {
        let day = match at.weekday() {
            chrono::Weekday::Mon => "mon",
            chrono::Weekday::Tue => "tue",
            chrono::Weekday::Wed => "wed",
            chrono::Weekday::Thu => "thu",
            chrono::Weekday::Fri => "fri",
            chrono::Weekday::Sat => "sat",
            chrono::Weekday::Sun => "sun",
        };
        if !self.days.iter().any(|d| d == day) {
            return false;
        }
        let hour = at.hour();
        hour >= self.open_hour && hour < self.close_hour
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
struct ConfigDocument {
    branding: Branding,
    ai: AiSettings,
    escalation: EscalationRules,
    rate_limits: RateLimits,
    business_hours: Option<BusinessHours>,
    features: BTreeMap<String, bool>,
    business: Value,
}

/// Fully typed tenant configuration plus the raw document it was parsed
/// from. The raw document only backs the dotted-path compat shim and the
/// echo sections of the config endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct TenantConfig {
    pub branding: Branding,
    pub ai: AiSettings,
    pub escalation: EscalationRules,
    pub rate_limits: RateLimits,
    pub business_hours: Option<BusinessHours>,
    pub features: BTreeMap<String, bool>,
    pub business_info: Value,
    raw: Value,
}

impl TenantConfig {
    pub fn from_document(slug: &str, doc: &Value) -> Result<Self, TenantConfigError> {
        let parsed: ConfigDocument =
            serde_json::from_value(doc.clone()).map_err(|source| TenantConfigError::Invalid {
                slug: slug.to_string(),
                reason: source.to_string(),
            })?;

        if parsed.branding.company_name.trim().is_empty() {
            return Err(TenantConfigError::Invalid {
                slug: slug.to_string(),
                reason: "branding.company_name is required".to_string(),
            });
        }
        if parsed.ai.model.trim().is_empty() {
            return Err(TenantConfigError::Invalid {
                slug: slug.to_string(),
                reason: "ai.model is required".to_string(),
            });
        }

        let mut features = parsed.features;
        if features.is_empty() {
            features.insert("web".to_string(), true);
        }

        Ok(Self {
            branding: parsed.branding,
            ai: parsed.ai,
            escalation: parsed.escalation,
            rate_limits: parsed.rate_limits,
            business_hours: parsed.business_hours,
            features,
            business_info: parsed.business,
            raw: doc.clone(),
        })
    }

    /// Legacy dotted-path lookup over the raw document, e.g.
    /// `get_path("ai.model")`. New code reads the typed fields; this shim
    /// exists for callers still carrying stringly keys and returns `None`
    /// instead of a default so they must supply their own.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current = &self.raw;
        for key in path.split('.') {
            current = current.as_object()?.get(key)?;
        }
        Some(current)
    }

    /// The subset safe for an authenticated client (no rate limits, no
    /// escalation internals).
    pub fn public_view(&self) -> PublicView {
        PublicView {
            branding: self.branding.clone(),
            features: self.features.clone(),
            business_info: self.business_info.clone(),
        }
    }

    /// The subset an unauthenticated embedded widget may fetch.
    pub fn widget_view(&self) -> WidgetView {
        WidgetView { branding: self.branding.clone(), features: self.features.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PublicView {
    pub branding: Branding,
    pub features: BTreeMap<String, bool>,
    pub business_info: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WidgetView {
    pub branding: Branding,
    pub features: BTreeMap<String, bool>,
}

/// Credential material from the secret document. No `Serialize` on purpose.
#[derive(Debug)]
pub struct TenantSecrets {
    api_key_hash: Option<String>,
    integrations: BTreeMap<String, SecretString>,
}

impl TenantSecrets {
    pub fn from_document(doc: &Value) -> Self {
        let api_key_hash = doc
            .get("api_key_hash")
            .and_then(Value::as_str)
            .filter(|hash| !hash.is_empty())
            .map(ToString::to_string);

        let integrations = doc
            .get("integrations")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(name, value)| {
                        value.as_str().map(|v| (name.clone(), SecretString::from(v.to_string())))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self { api_key_hash, integrations }
    }

    pub fn api_key_hash(&self) -> Option<&str> {
        self.api_key_hash.as_deref()
    }

    pub fn integration(&self, name: &str) -> Option<&SecretString> {
        self.integrations.get(name)
    }
}

/// One immutable, validated view of a tenant. The loader cache hands these
/// out behind `Arc` so a reload can never expose a half-updated config.
#[derive(Debug)]
pub struct TenantSnapshot {
    pub tenant: Tenant,
    pub config: TenantConfig,
    pub secrets: TenantSecrets,
}

impl TenantSnapshot {
    pub fn from_record(record: TenantRecord) -> Result<Self, TenantConfigError> {
        let config = TenantConfig::from_document(&record.tenant.slug, &record.config_doc)?;
        let secrets = TenantSecrets::from_document(&record.secrets_doc);
        Ok(Self { tenant: record.tenant, config, secrets })
    }

    pub fn slug(&self) -> &str {
        &self.tenant.slug
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;
    use serde_json::json;

    use crate::ratelimit::WindowKind;

    use super::{BusinessHours, TenantConfig, TenantConfigError, TenantSecrets};

    fn valid_doc() -> serde_json::Value {
        json!({
            "branding": { "company_name": "Acme Dental" },
            "ai": { "model": "gpt-4o-mini" },
            "escalation": { "keywords": ["speak to a human"], "confidence_threshold": 0.6 },
            "rate_limits": { "per_minute": 2 },
            "business": { "phone": "+1 555 0100" }
        })
    }

    #[test]
    fn parses_with_defaults_for_absent_keys() {
        let config = TenantConfig::from_document("acme", &valid_doc()).expect("valid config");

        assert_eq!(config.branding.company_name, "Acme Dental");
        assert_eq!(config.branding.widget_position, "bottom-right");
        assert_eq!(config.ai.temperature, 0.7);
        assert_eq!(config.ai.history_limit, 10);
        assert_eq!(config.rate_limits.ceiling(WindowKind::Minute), Some(2));
        assert_eq!(config.rate_limits.ceiling(WindowKind::Hour), None);
        assert_eq!(config.features.get("web"), Some(&true));
    }

    #[test]
    fn missing_company_name_is_invalid() {
        let doc = json!({ "ai": { "model": "gpt-4o-mini" } });
        let error = TenantConfig::from_document("acme", &doc).expect_err("should be invalid");
        assert!(matches!(
            error,
            TenantConfigError::Invalid { ref reason, .. } if reason.contains("company_name")
        ));
    }

    #[test]
    fn missing_ai_model_is_invalid() {
        let doc = json!({ "branding": { "company_name": "Acme" } });
        let error = TenantConfig::from_document("acme", &doc).expect_err("should be invalid");
        assert!(matches!(
            error,
            TenantConfigError::Invalid { ref reason, .. } if reason.contains("ai.model")
        ));
    }

    #[test]
    fn dotted_path_shim_walks_the_raw_document() {
        let config = TenantConfig::from_document("acme", &valid_doc()).expect("valid config");

        assert_eq!(
            config.get_path("ai.model").and_then(|v| v.as_str()),
            Some("gpt-4o-mini")
        );
        assert_eq!(
            config.get_path("business.phone").and_then(|v| v.as_str()),
            Some("+1 555 0100")
        );
        assert_eq!(config.get_path("ai.temperature"), None);
        assert_eq!(config.get_path("nope.nested.deep"), None);
    }

    #[test]
    fn widget_view_carries_no_rate_or_escalation_sections() {
        let config = TenantConfig::from_document("acme", &valid_doc()).expect("valid config");
        let rendered = serde_json::to_value(config.widget_view()).expect("serialize");

        assert!(rendered.get("branding").is_some());
        assert!(rendered.get("rate_limits").is_none());
        assert!(rendered.get("escalation").is_none());
    }

    #[test]
    fn secrets_parse_hash_and_integrations() {
        let secrets = TenantSecrets::from_document(&json!({
            "api_key_hash": "abc123",
            "integrations": { "twilio_auth_token": "tok-1" }
        }));

        assert_eq!(secrets.api_key_hash(), Some("abc123"));
        assert!(secrets.integration("twilio_auth_token").is_some());
        assert!(secrets.integration("missing").is_none());
    }

    #[test]
    fn empty_api_key_hash_reads_as_absent() {
        let secrets = TenantSecrets::from_document(&json!({ "api_key_hash": "" }));
        assert_eq!(secrets.api_key_hash(), None);
    }

    #[test]
    fn business_hours_check_day_and_hour() {
        let hours = BusinessHours::default();
        // Friday 2026-08-28 10:00 UTC is open; 18:00 is closed.
        let open = Utc.with_ymd_and_hms(2026, 8, 28, 10, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 8, 28, 18, 0, 0).unwrap();
        // Sunday 2026-08-30 is not a working day.
        let sunday = Utc.with_ymd_and_hms(2026, 8, 30, 10, 0, 0).unwrap();

        assert!(hours.is_open(open));
        assert!(!hours.is_open(late));
        assert!(!hours.is_open(sunday));
    }
}
