use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Suspended,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "suspended" => Self::Suspended,
            _ => Self::Active,
        }
    }
}

/// Tenant identity row. Configuration and credential documents travel
/// separately in [`TenantRecord`] so this type can be exposed freely.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub slug: String,
    pub name: String,
    pub domain: Option<String>,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw persistence shape: the tenant row plus its two JSON documents
/// (public-facing configuration, secret credentials). The typed view is
/// built by `tenant_config::TenantSnapshot::from_record`.
#[derive(Clone, Debug, PartialEq)]
pub struct TenantRecord {
    pub tenant: Tenant,
    pub config_doc: serde_json::Value,
    pub secrets_doc: serde_json::Value,
}
