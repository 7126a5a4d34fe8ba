use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use helplane_core::errors::RequestError;

/// The JSON envelope every failed request gets: a safe message plus the
/// retry classification, and a hint when the failure is a rate limit.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<i64>,
}

#[derive(Debug)]
pub enum ApiError {
    Request(RequestError),
    NotFound(&'static str),
}

impl From<RequestError> for ApiError {
    fn from(error: RequestError) -> Self {
        Self::Request(error)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Request(RequestError::Auth(_)) => StatusCode::UNAUTHORIZED,
            Self::Request(RequestError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Request(RequestError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
            Self::Request(RequestError::Upstream(_)) => StatusCode::BAD_GATEWAY,
            Self::Request(RequestError::Persistence(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            Self::Request(error) => ErrorBody {
                error: error.user_message(),
                kind: error.kind().as_str(),
                retry_after_secs: error.retry_after_secs(),
            },
            Self::NotFound(what) => ErrorBody {
                error: format!("{what} not found."),
                kind: "request",
                retry_after_secs: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = self.body();
        let mut response = (self.status(), Json(body.clone())).into_response();
        if let Some(retry_after) = body.retry_after_secs {
            if let Ok(value) = retry_after.to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{header, StatusCode};
    use axum::response::IntoResponse;

    use helplane_core::errors::{AuthError, RequestError};
    use helplane_core::ratelimit::WindowKind;

    use super::ApiError;

    #[test]
    fn rate_limit_carries_retry_after_header() {
        let response = ApiError::from(RequestError::RateLimited {
            window: WindowKind::Minute,
            retry_after_secs: 42,
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");
    }

    #[test]
    fn auth_failures_are_unauthorized() {
        let response =
            ApiError::from(RequestError::from(AuthError::KeyMismatch { slug: "acme".to_string() }))
                .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[test]
    fn not_found_renders_as_request_error() {
        let error = ApiError::NotFound("conversation");
        assert_eq!(error.status(), StatusCode::NOT_FOUND);
    }
}
