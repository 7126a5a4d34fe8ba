use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::tenant::TenantId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Web,
    Sms,
    Voice,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Sms => "sms",
            Self::Voice => "voice",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "web" => Ok(Self::Web),
            "sms" => Ok(Self::Sms),
            "voice" => Ok(Self::Voice),
            other => Err(DomainError::UnknownChannel(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Resolved,
    Escalated,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Resolved => "resolved",
            Self::Escalated => "escalated",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "resolved" => Self::Resolved,
            "escalated" => Self::Escalated,
            _ => Self::Active,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub tenant_id: TenantId,
    pub session_id: String,
    pub channel: Channel,
    pub status: ConversationStatus,
    pub escalated: bool,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub message_count: i64,
    pub metadata: serde_json::Value,
}

impl Conversation {
    /// `resolved` and `escalated` are terminal for the core; only explicit
    /// staff action outside this system may revert them.
    pub fn can_transition_to(&self, next: ConversationStatus) -> bool {
        matches!(
            (self.status, next),
            (ConversationStatus::Active, ConversationStatus::Resolved)
                | (ConversationStatus::Active, ConversationStatus::Escalated)
        )
    }

    pub fn transition_to(&mut self, next: ConversationStatus) -> Result<(), DomainError> {
        if !self.can_transition_to(next) {
            return Err(DomainError::InvalidStatusTransition { from: self.status, to: next });
        }

        self.status = next;
        if next == ConversationStatus::Escalated {
            self.escalated = true;
        }
        Ok(())
    }
}
