//! Bearer-token authentication.
//!
//! Every endpoint under `/api/v1` requires `Authorization: Bearer <token>`
//! with the token equal to the configured secret. The comparison is
//! constant time. A missing server-side secret is a configuration error
//! reported as a 500 at request time, never as a 401.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::{api::ApiError, AppState};

/// Constant-time token comparison.
pub(crate) fn token_matches(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn bearer(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Reject requests that do not carry the configured bearer token.
pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state
        .config
        .api
        .token
        .as_deref()
        .filter(|token| !token.is_empty())
    else {
        return ApiError::internal("API token not configured on server").into_response();
    };

    match bearer(&request) {
        Some(token) if token_matches(token, expected) => next.run(request).await,
        _ => ApiError::unauthorized().into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_equal_tokens_only() {
        assert!(token_matches("secret-token", "secret-token"));
        assert!(!token_matches("secret-token", "secret-tokem"));
        assert!(!token_matches("", "secret-token"));
        assert!(!token_matches("secret-token-long", "secret-token"));
    }
}
