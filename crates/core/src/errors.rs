use thiserror::Error;

use crate::domain::conversation::ConversationStatus;
use crate::ratelimit::WindowKind;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid conversation transition from {from:?} to {to:?}")]
    InvalidStatusTransition { from: ConversationStatus, to: ConversationStatus },
    #[error("unknown channel `{0}` (expected web|sms|voice)")]
    UnknownChannel(String),
    #[error("unknown message role `{0}` (expected user|assistant|system)")]
    UnknownRole(String),
}

/// Rejections from the authentication gate. Never retried automatically; the
/// reason is logged to the audit trail but the client sees one uniform 401
/// message so slug probing and key probing are indistinguishable.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("tenant `{slug}` not found")]
    TenantNotFound { slug: String },
    #[error("api key mismatch for tenant `{slug}`")]
    KeyMismatch { slug: String },
    #[error("tenant `{slug}` is suspended")]
    TenantSuspended { slug: String },
}

/// Client-facing classification: should the caller retry, fix the request,
/// or expect degraded service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Request,
    Retry,
    Degraded,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Retry => "retry",
            Self::Degraded => "degraded",
        }
    }
}

/// Everything a request handler can surface, mapped onto the taxonomy every
/// endpoint shares: auth and validation are the caller's problem, rate
/// limits and upstream trouble are retryable, persistence failure means the
/// message was not recorded and the caller must be told so.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RequestError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("rate limit exceeded for the {window} window")]
    RateLimited { window: WindowKind, retry_after_secs: i64 },
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("upstream provider unavailable: {0}")]
    Upstream(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl RequestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) | Self::Validation(_) => ErrorKind::Request,
            Self::RateLimited { .. } | Self::Persistence(_) => ErrorKind::Retry,
            Self::Upstream(_) => ErrorKind::Degraded,
        }
    }

    pub fn retry_after_secs(&self) -> Option<i64> {
        match self {
            Self::RateLimited { retry_after_secs, .. } => Some(*retry_after_secs),
            _ => None,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(_) => "Invalid API key or tenant not found.".to_string(),
            Self::RateLimited { retry_after_secs, .. } => {
                format!("Rate limit exceeded. Retry in {retry_after_secs}s.")
            }
            Self::Validation(reason) => format!("Invalid request: {reason}"),
            Self::Upstream(_) => {
                "The assistant is temporarily degraded. Please try again shortly.".to_string()
            }
            Self::Persistence(_) => {
                "Your message could not be recorded. Please try again.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ratelimit::WindowKind;

    use super::{AuthError, ErrorKind, RequestError};

    #[test]
    fn auth_and_validation_are_fix_your_request() {
        let auth = RequestError::from(AuthError::KeyMismatch { slug: "demo".to_string() });
        assert_eq!(auth.kind(), ErrorKind::Request);
        assert_eq!(
            RequestError::Validation("message must not be empty".to_string()).kind(),
            ErrorKind::Request
        );
    }

    #[test]
    fn rate_limit_is_retryable_with_hint() {
        let error = RequestError::RateLimited { window: WindowKind::Minute, retry_after_secs: 17 };
        assert_eq!(error.kind(), ErrorKind::Retry);
        assert_eq!(error.retry_after_secs(), Some(17));
        assert!(error.user_message().contains("17s"));
    }

    #[test]
    fn auth_message_does_not_reveal_which_check_failed() {
        let not_found = RequestError::from(AuthError::TenantNotFound { slug: "a".to_string() });
        let mismatch = RequestError::from(AuthError::KeyMismatch { slug: "a".to_string() });
        assert_eq!(not_found.user_message(), mismatch.user_message());
    }
}
