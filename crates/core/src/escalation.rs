//! Rule engine deciding when a conversation needs a human.
//!
//! Four rules run in a fixed order over the user's message and the
//! generated reply. The first rule to fire names the escalation reason;
//! every rule that fired is still recorded so the audit trail shows the
//! full picture even when one reason wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tenant_config::{BusinessHours, EscalationRules};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    KeywordMatch,
    LowConfidence,
    ConversationLength,
    OutOfHoursUrgent,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeywordMatch => "keyword_match",
            Self::LowConfidence => "low_confidence",
            Self::ConversationLength => "conversation_length",
            Self::OutOfHoursUrgent => "out_of_hours_urgent",
        }
    }
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs the rules read. `message_count` counts the conversation's messages
/// including the exchange being evaluated.
#[derive(Clone, Debug)]
pub struct EscalationContext<'a> {
    pub user_message: &'a str,
    pub reply_confidence: f64,
    pub message_count: i64,
    pub now: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EscalationDecision {
    pub escalate: bool,
    /// First rule that fired, in evaluation order.
    pub reason: Option<EscalationReason>,
    /// Every rule that fired.
    pub matched: Vec<EscalationReason>,
}

impl EscalationDecision {
    fn none() -> Self {
        Self { escalate: false, reason: None, matched: Vec::new() }
    }
}

pub struct EscalationEngine;

impl EscalationEngine {
    pub fn evaluate(
        rules: &EscalationRules,
        business_hours: Option<&BusinessHours>,
        ctx: &EscalationContext<'_>,
    ) -> EscalationDecision {
        let message = ctx.user_message.to_lowercase();
        let mut matched = Vec::new();

        if contains_any(&message, &rules.keywords) {
            matched.push(EscalationReason::KeywordMatch);
        }

        // A threshold of zero disables the rule rather than escalating
        // every zero-confidence fallback on tenants that never opted in.
        if rules.confidence_threshold > 0.0 && ctx.reply_confidence < rules.confidence_threshold {
            matched.push(EscalationReason::LowConfidence);
        }

        if rules.max_messages > 0 && ctx.message_count >= i64::from(rules.max_messages) {
            matched.push(EscalationReason::ConversationLength);
        }

        if rules.out_of_hours_urgent
            && contains_any(&message, &rules.urgent_keywords)
            && business_hours.map(|hours| !hours.is_open(ctx.now)).unwrap_or(false)
        {
            matched.push(EscalationReason::OutOfHoursUrgent);
        }

        match matched.first().copied() {
            Some(reason) => EscalationDecision { escalate: true, reason: Some(reason), matched },
            None => EscalationDecision::none(),
        }
    }
}

fn contains_any(lowercased_message: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .filter(|k| !k.is_empty())
        .any(|k| lowercased_message.contains(&k.to_lowercase()))
}
