//! Chat orchestration: the pipeline that turns an inbound tenant message
//! into a persisted, possibly escalated exchange.
//!
//! The flow is a fixed sequence: validate, resolve the conversation,
//! persist the user message, gather history and knowledge snippets,
//! generate a reply, run the escalation rules, persist the reply, apply
//! side effects. The LLM is only a text generator here; everything that
//! changes state (ordering, status transitions, notifications) is decided
//! by deterministic code around it.

pub mod llm;
pub mod notify;
pub mod pipeline;
pub mod retrieval;

pub use llm::{ChatTurn, GeneratedReply, LlmClient, ReplyRequest, RetryingLlm};
pub use notify::{EscalationNotice, EscalationNotifier, InMemoryNotifier};
pub use pipeline::{ChatOutcome, ChatPipeline, ChatRequest};
pub use retrieval::{NoopRetrieval, RetrievalClient, Snippet};
