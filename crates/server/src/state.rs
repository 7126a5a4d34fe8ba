use std::sync::Arc;

use helplane_agent::pipeline::ChatPipeline;
use helplane_agent::retrieval::RetrievalClient;
use helplane_core::audit::AuditSink;
use helplane_core::ratelimit::RateLimiter;
use helplane_db::repositories::{AnalyticsRepository, ConversationRepository};
use helplane_db::TenantConfigLoader;

/// Everything request handlers share. All trait objects, so tests swap in
/// fakes without touching the routing.
#[derive(Clone)]
pub struct AppState {
    pub loader: Arc<TenantConfigLoader>,
    pub limiter: Arc<RateLimiter>,
    pub pipeline: Arc<ChatPipeline>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub analytics: Arc<dyn AnalyticsRepository>,
    pub retrieval: Arc<dyn RetrievalClient>,
    pub audit: Arc<dyn AuditSink>,
}
