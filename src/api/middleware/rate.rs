//! Per-caller rate limiting middleware.
//!
//! Sliding one-minute window keyed by a hash of the bearer token, so
//! raw tokens never sit in the limiter's map.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::middleware::auth::bearer_token;
use crate::api::types::{hash_token, ApiContext};

/// Extract a rate-limit key from the request.
fn rate_key(req: &Request<axum::body::Body>) -> String {
    bearer_token(req)
        .map(|token| {
            let hash = hash_token(token);
            let prefix: String = hash[..8].iter().map(|b| format!("{b:02x}")).collect();
            format!("token:{prefix}")
        })
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Per-caller rate limiting. Returns 429 if exceeded.
pub async fn limit(
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    match limit_inner(req, next).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn limit_inner(
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let key = rate_key(&req);

    // MutexGuard is !Send; drop before .await
    {
        let mut limiter = ctx
            .rate_limiter
            .lock()
            .map_err(|_| ApiError::Internal("rate limiter lock".into()))?;

        limiter
            .check(&key)
            .map_err(|retry_after| ApiError::RateLimited { retry_after })?;
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn key_hashes_token() {
        let req = Request::builder()
            .header("Authorization", "Bearer secret-token-value")
            .body(Body::empty())
            .unwrap();
        let key = rate_key(&req);
        assert!(key.starts_with("token:"));
        assert!(!key.contains("secret"));
        assert_eq!(key.len(), "token:".len() + 16);
    }

    #[test]
    fn missing_token_is_anonymous() {
        let req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(rate_key(&req), "anonymous");
    }
}
