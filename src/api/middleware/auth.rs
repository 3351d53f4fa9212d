//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, verifies it as an access token,
//! confirms the account still exists and injects `AuthUser` into request
//! extensions for downstream handlers.

use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::auth::TokenType;
use crate::db;

/// Require a valid access token.
///
/// Accesses `ApiContext` from request extensions (injected by Extension layer).
pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?
        .trim()
        .to_string();

    let claims = ctx.core.tokens.verify(&token, TokenType::Access)?;

    // Tokens outlive deleted accounts; the account must still be there.
    let user = {
        let conn = ctx.core.open_db()?;
        db::get_user(&conn, claims.sub)?.ok_or(ApiError::Unauthorized)?
    };

    req.extensions_mut().insert(AuthUser {
        user_id: user.id,
        username: user.username,
    });

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert("Cache-Control", HeaderValue::from_static("no-store"));
    Ok(response)
}
