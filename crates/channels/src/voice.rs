//! Voice-agent webhooks. The voice platform runs the speech loop itself;
//! helplane serves two callbacks: a knowledge lookup mid-call and a
//! transcript drop after the call, replayed into the conversation log.

use serde::Deserialize;
use serde_json::json;

use helplane_core::domain::conversation::Channel;
use helplane_core::domain::message::MessageRole;

use crate::{CanonicalMessage, ChannelError};

/// Mid-call knowledge query from the voice agent.
#[derive(Clone, Debug, Deserialize)]
pub struct VoiceKnowledgeQuery {
    pub caller_id: String,
    pub query: String,
}

/// One spoken turn in a finished call.
#[derive(Clone, Debug, Deserialize)]
pub struct TranscriptTurn {
    pub role: String,
    pub text: String,
}

impl TranscriptTurn {
    pub fn message_role(&self) -> MessageRole {
        // Anything the platform labels that isn't the caller is treated as
        // the assistant side of the exchange.
        match self.role.as_str() {
            "user" | "caller" => MessageRole::User,
            _ => MessageRole::Assistant,
        }
    }
}

/// Post-call transcript batch.
#[derive(Clone, Debug, Deserialize)]
pub struct VoiceTranscriptPayload {
    pub caller_id: String,
    pub call_id: String,
    #[serde(default)]
    pub turns: Vec<TranscriptTurn>,
}

impl VoiceTranscriptPayload {
    /// Canonical identity for the conversation the transcript lands in.
    pub fn canonical_session(&self) -> Result<CanonicalMessage, ChannelError> {
        if self.caller_id.trim().is_empty() {
            return Err(ChannelError::MissingField("caller_id"));
        }

        Ok(CanonicalMessage {
            session_id: self.caller_id.clone(),
            channel: Channel::Voice,
            text: String::new(),
            metadata: json!({ "call_id": self.call_id }),
        })
    }
}

#[cfg(test)]
mod tests {
    use helplane_core::domain::conversation::Channel;
    use helplane_core::domain::message::MessageRole;

    use super::{TranscriptTurn, VoiceTranscriptPayload};

    #[test]
    fn caller_id_keys_the_voice_session() {
        let payload = VoiceTranscriptPayload {
            caller_id: "+15550100".to_string(),
            call_id: "call-9".to_string(),
            turns: vec![],
        };
        let canonical = payload.canonical_session().expect("canonical");
        assert_eq!(canonical.channel, Channel::Voice);
        assert_eq!(canonical.session_id, "+15550100");
        assert_eq!(canonical.metadata["call_id"], "call-9");
    }

    #[test]
    fn transcript_roles_map_onto_message_roles() {
        let caller = TranscriptTurn { role: "caller".to_string(), text: "hi".to_string() };
        let agent = TranscriptTurn { role: "agent".to_string(), text: "hello".to_string() };
        assert_eq!(caller.message_role(), MessageRole::User);
        assert_eq!(agent.message_role(), MessageRole::Assistant);
    }
}
