use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use helplane_core::domain::conversation::Channel;

use crate::CanonicalMessage;

/// Body of `POST /api/{tenant}/chat` from the embedded widget. A widget
/// that has not seen a reply yet sends no `session_id`; one is minted and
/// returned so the widget can carry it forward.
#[derive(Clone, Debug, Deserialize)]
pub struct WebChatPayload {
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub page_url: Option<String>,
}

impl WebChatPayload {
    pub fn canonicalize(self) -> CanonicalMessage {
        let session_id = self
            .session_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("web-{}", Uuid::new_v4()));

        let metadata = match &self.page_url {
            Some(url) => json!({ "page_url": url }),
            None => json!({}),
        };

        CanonicalMessage { session_id, channel: Channel::Web, text: self.message, metadata }
    }
}
