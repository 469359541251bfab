//! Audit logging middleware.
//!
//! Logs every API request with the caller, method, path and response
//! status. Runs innermost (after auth has injected the `Caller`).

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::ApiContext;
use crate::core_state::AccessSource;
use crate::identity::Caller;

/// Log API access for the audit trail.
pub async fn log_access(
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let ctx = req.extensions().get::<ApiContext>().cloned();

    let source = req
        .extensions()
        .get::<Caller>()
        .map(|c| AccessSource::Api {
            role: c.role(),
            subject_id: c.subject_id(),
        })
        .unwrap_or(AccessSource::Anonymous);

    let response = next.run(req).await;

    if let Some(ctx) = ctx {
        let status = response.status().as_u16();
        ctx.core
            .log_access(source, &format!("{method} {path}"), &format!("status:{status}"));
    }

    response
}
