//! Audit logging middleware.
//!
//! Logs every API request with method, path, response status and the
//! authenticated user. Runs innermost (after auth has injected `AuthUser`).

use std::time::Instant;

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::AuthUser;

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let user = req.extensions().get::<AuthUser>().map(|u| u.username.clone());
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match user {
        Some(user) => {
            tracing::info!(target: "medoffice::audit", %method, %path, status, %user, elapsed_ms, "api access")
        }
        None => tracing::info!(target: "medoffice::audit", %method, %path, status, elapsed_ms, "api access"),
    }

    response
}
