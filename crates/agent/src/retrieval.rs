use anyhow::Result;
use async_trait::async_trait;

/// One ranked knowledge-base passage.
#[derive(Clone, Debug, PartialEq)]
pub struct Snippet {
    pub title: String,
    pub content: String,
    pub score: f64,
}

#[async_trait]
pub trait RetrievalClient: Send + Sync {
    async fn search(&self, tenant_slug: &str, query: &str, top_k: u32) -> Result<Vec<Snippet>>;
}

/// Used when no knowledge base is configured; the pipeline then prompts
/// from tenant configuration alone.
pub struct NoopRetrieval;

#[async_trait]
impl RetrievalClient for NoopRetrieval {
    async fn search(&self, _tenant_slug: &str, _query: &str, _top_k: u32) -> Result<Vec<Snippet>> {
        Ok(Vec::new())
    }
}
