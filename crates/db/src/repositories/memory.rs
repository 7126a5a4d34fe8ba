//! In-memory fakes with the same contracts as the SQL repositories. Used by
//! the agent pipeline tests and anywhere a pool would be overkill.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use helplane_core::domain::conversation::{
    Channel, Conversation, ConversationId, ConversationStatus,
};
use helplane_core::domain::message::{Message, MessageId, MessageRole};
use helplane_core::domain::tenant::{TenantId, TenantRecord, TenantStatus};

use super::{ConversationRepository, RepositoryError, TenantRepository};

#[derive(Clone, Default)]
pub struct InMemoryTenantRepository {
    records: Arc<Mutex<HashMap<String, TenantRecord>>>,
}

impl InMemoryTenantRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<TenantRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.tenant.slug.clone(), r)).collect();
        Self { records: Arc::new(Mutex::new(map)) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, TenantRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait::async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<TenantRecord>, RepositoryError> {
        Ok(self.lock().get(slug).cloned())
    }

    async fn save(&self, record: TenantRecord) -> Result<(), RepositoryError> {
        self.lock().insert(record.tenant.slug.clone(), record);
        Ok(())
    }

    async fn set_status(
        &self,
        slug: &str,
        status: TenantStatus,
    ) -> Result<bool, RepositoryError> {
        let mut records = self.lock();
        match records.get_mut(slug) {
            Some(record) => {
                record.tenant.status = status;
                record.tenant.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_slugs(&self) -> Result<Vec<String>, RepositoryError> {
        let mut slugs: Vec<String> = self.lock().keys().cloned().collect();
        slugs.sort();
        Ok(slugs)
    }
}

#[derive(Default)]
struct ConversationState {
    conversations: HashMap<String, Conversation>,
    messages: HashMap<String, Vec<Message>>,
}

#[derive(Clone, Default)]
pub struct InMemoryConversationRepository {
    state: Arc<Mutex<ConversationState>>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConversationState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn get_or_create(
        &self,
        tenant_id: &TenantId,
        session_id: &str,
        channel: Channel,
    ) -> Result<Conversation, RepositoryError> {
        let mut state = self.lock();
        let existing = state
            .conversations
            .values()
            .find(|c| {
                c.tenant_id == *tenant_id && c.session_id == session_id && c.channel == channel
            })
            .cloned();
        if let Some(conversation) = existing {
            return Ok(conversation);
        }

        let now = Utc::now();
        let conversation = Conversation {
            id: ConversationId(Uuid::new_v4().to_string()),
            tenant_id: tenant_id.clone(),
            session_id: session_id.to_string(),
            channel,
            status: ConversationStatus::Active,
            escalated: false,
            started_at: now,
            last_activity_at: now,
            message_count: 0,
            metadata: serde_json::json!({}),
        };
        state.conversations.insert(conversation.id.0.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self.lock().conversations.get(&id.0).filter(|c| c.tenant_id == *tenant_id).cloned())
    }

    async fn append_message(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        role: MessageRole,
        content: &str,
        metadata: serde_json::Value,
    ) -> Result<Message, RepositoryError> {
        let mut state = self.lock();
        let conversation = state
            .conversations
            .get_mut(&conversation_id.0)
            .filter(|c| c.tenant_id == *tenant_id)
            .ok_or(RepositoryError::ConversationNotFound)?;

        let now = Utc::now();
        conversation.message_count += 1;
        conversation.last_activity_at = now;
        let seq = conversation.message_count;

        let message = Message {
            id: MessageId(Uuid::new_v4().to_string()),
            conversation_id: conversation_id.clone(),
            tenant_id: tenant_id.clone(),
            seq,
            role,
            content: content.to_string(),
            metadata,
            created_at: now,
        };
        state.messages.entry(conversation_id.0.clone()).or_default().push(message.clone());
        Ok(message)
    }

    async fn history(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, RepositoryError> {
        let state = self.lock();
        let visible = state
            .conversations
            .get(&conversation_id.0)
            .map(|c| c.tenant_id == *tenant_id)
            .unwrap_or(false);
        if !visible {
            return Ok(Vec::new());
        }

        let mut messages =
            state.messages.get(&conversation_id.0).cloned().unwrap_or_default();
        messages.sort_by_key(|m| m.seq);
        if let Some(limit) = limit {
            let keep = limit as usize;
            if messages.len() > keep {
                messages = messages.split_off(messages.len() - keep);
            }
        }
        Ok(messages)
    }

    async fn set_status(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        status: ConversationStatus,
    ) -> Result<Conversation, RepositoryError> {
        let mut state = self.lock();
        let conversation = state
            .conversations
            .get_mut(&conversation_id.0)
            .filter(|c| c.tenant_id == *tenant_id)
            .ok_or(RepositoryError::ConversationNotFound)?;

        conversation.transition_to(status)?;
        conversation.last_activity_at = Utc::now();
        Ok(conversation.clone())
    }

    async fn list_recent(
        &self,
        tenant_id: &TenantId,
        status: Option<ConversationStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let state = self.lock();
        let mut conversations: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|c| c.tenant_id == *tenant_id)
            .filter(|c| status.map_or(true, |wanted| c.status == wanted))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        let conversations =
            conversations.into_iter().skip(offset as usize).take(limit as usize).collect();
        Ok(conversations)
    }
}
