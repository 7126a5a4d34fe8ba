//! Core domain for the helplane support backend.
//!
//! Everything here is deterministic and I/O-free: tenant and conversation
//! types, the typed tenant configuration model, API-key verification, the
//! per-tenant rate limiter, the escalation rule engine, the error taxonomy,
//! and process configuration. Persistence lives in `helplane-db`, chat
//! orchestration in `helplane-agent`, transport in `helplane-server`.

pub mod audit;
pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod escalation;
pub mod ratelimit;
pub mod tenant_config;

pub use domain::analytics::DailyAnalytics;
pub use domain::conversation::{Channel, Conversation, ConversationId, ConversationStatus};
pub use domain::message::{Message, MessageId, MessageRole};
pub use domain::tenant::{Tenant, TenantId, TenantRecord, TenantStatus};
pub use errors::{AuthError, DomainError, ErrorKind, RequestError};
pub use escalation::{EscalationContext, EscalationDecision, EscalationEngine, EscalationReason};
pub use ratelimit::{RateDecision, RateLimiter, WindowKind};
pub use tenant_config::{
    BusinessHours, RateLimits, TenantConfig, TenantConfigError, TenantSecrets, TenantSnapshot,
};
