//! Channel adapters. Each transport (web widget, Twilio SMS, voice agent)
//! normalizes its payload into one [`CanonicalMessage`] before the pipeline
//! sees it, and renders the reply back into its own wire shape afterwards.

pub mod sms;
pub mod voice;
pub mod web;

use serde_json::Value;
use thiserror::Error;

use helplane_core::domain::conversation::Channel;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}

/// The single shape every transport reduces to: a stable session key, the
/// channel it arrived on, the text, and adapter-specific leftovers in
/// metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct CanonicalMessage {
    pub session_id: String,
    pub channel: Channel,
    pub text: String,
    pub metadata: Value,
}
