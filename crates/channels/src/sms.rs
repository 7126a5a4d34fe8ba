//! Twilio SMS webhook handling. The sender's phone number is the session
//! key, so the whole back-and-forth with one number lands in one
//! conversation. Replies go back as TwiML in the webhook response.

use serde::Deserialize;
use serde_json::json;

use helplane_core::domain::conversation::Channel;

use crate::{CanonicalMessage, ChannelError};

/// The form fields Twilio posts on an inbound SMS. Field names are
/// Twilio's, hence the casing.
#[derive(Clone, Debug, Deserialize)]
pub struct TwilioSmsPayload {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "Body")]
    pub body: String,
    #[serde(rename = "MessageSid", default)]
    pub message_sid: Option<String>,
}

impl TwilioSmsPayload {
    pub fn canonicalize(self) -> Result<CanonicalMessage, ChannelError> {
        if self.from.trim().is_empty() {
            return Err(ChannelError::MissingField("From"));
        }

        Ok(CanonicalMessage {
            session_id: self.from.clone(),
            channel: Channel::Sms,
            text: self.body,
            metadata: json!({
                "from": self.from,
                "to": self.to,
                "message_sid": self.message_sid,
            }),
        })
    }
}

/// A minimal TwiML `<Response><Message>` document.
pub fn twiml_reply(text: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <Response><Message>{}</Message></Response>",
        escape_xml(text)
    )
}

/// An empty TwiML response: acknowledge the webhook, send nothing.
pub fn twiml_empty() -> String {
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response></Response>".to_string()
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use helplane_core::domain::conversation::Channel;

    use super::{twiml_empty, twiml_reply, TwilioSmsPayload};

    fn payload(body: &str) -> TwilioSmsPayload {
        TwilioSmsPayload {
            from: "+15550100".to_string(),
            to: "+15550199".to_string(),
            body: body.to_string(),
            message_sid: Some("SM123".to_string()),
        }
    }

    #[test]
    fn sender_number_is_the_session_key() {
        let canonical = payload("do you take walk-ins?").canonicalize().expect("canonical");
        assert_eq!(canonical.session_id, "+15550100");
        assert_eq!(canonical.channel, Channel::Sms);
        assert_eq!(canonical.metadata["message_sid"], "SM123");
    }

    #[test]
    fn twiml_escapes_reply_text() {
        let twiml = twiml_reply("Mon-Fri 9-5 & Sat <by appointment>");
        assert!(twiml.contains("Mon-Fri 9-5 &amp; Sat &lt;by appointment&gt;"));
        assert!(twiml.starts_with("<?xml"));
        assert!(twiml.ends_with("</Response>"));
    }

    #[test]
    fn empty_twiml_has_no_message_element() {
        assert!(!twiml_empty().contains("<Message>"));
    }
}
