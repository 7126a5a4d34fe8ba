use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use helplane_core::domain::conversation::ConversationId;
use helplane_core::escalation::EscalationReason;

/// What gets handed to the tenant's support staff when a conversation
/// escalates.
#[derive(Clone, Debug, PartialEq)]
pub struct EscalationNotice {
    pub tenant_slug: String,
    pub conversation_id: ConversationId,
    pub reason: EscalationReason,
    pub matched: Vec<EscalationReason>,
    pub user_message: String,
    pub occurred_at: DateTime<Utc>,
}

#[async_trait]
pub trait EscalationNotifier: Send + Sync {
    async fn notify(&self, notice: EscalationNotice) -> Result<()>;
}

#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    notices: Arc<Mutex<Vec<EscalationNotice>>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<EscalationNotice> {
        match self.notices.lock() {
            Ok(notices) => notices.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl EscalationNotifier for InMemoryNotifier {
    async fn notify(&self, notice: EscalationNotice) -> Result<()> {
        match self.notices.lock() {
            Ok(mut notices) => notices.push(notice),
            Err(poisoned) => poisoned.into_inner().push(notice),
        }
        Ok(())
    }
}
