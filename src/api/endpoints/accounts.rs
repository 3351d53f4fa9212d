//! Account endpoints: signup, login, token refresh, current physician and
//! password reset.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;

use crate::api::endpoints::validate;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser, JsonObject};
use crate::auth::{hash_password, unmatchable_hash, verify_password, TokenPair, TokenType};
use crate::db;
use crate::models::enums::Degree;
use crate::models::PhysicianFields;

const USERNAME_MAX: usize = 150;
const NAME_MAX: usize = 255;

#[derive(Serialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub physician: Option<PhysicianFields>,
}

#[derive(Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: UserInfo,
}

#[derive(Serialize)]
pub struct AccessResponse {
    pub access: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// PBKDF2 work runs on the blocking pool, not the async workers.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    Ok(tokio::task::spawn_blocking(work).await?)
}

async fn hash_off_runtime(password: String, iterations: u32) -> Result<String, ApiError> {
    blocking(move || hash_password(&password, iterations)).await
}

async fn verify_off_runtime(password: String, encoded: String) -> Result<bool, ApiError> {
    blocking(move || verify_password(&password, &encoded)).await
}

/// `POST /api/signup/`: create an account and its physician profile.
pub async fn signup(
    State(ctx): State<ApiContext>,
    body: JsonObject,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let (Some(username), Some(password)) = (body.text("username"), body.text("password")) else {
        return Err(ApiError::BadRequest("Username and password are required.".into()));
    };
    let username = username.to_string();
    let password = password.to_string();

    let (email, physician) = validate(&body.0, |form| {
        form.optional_str("username", USERNAME_MAX);
        let email = form.optional_email("email", 254);
        let name = form.optional_str("name", NAME_MAX);
        let degree = if body.0.get("degree").is_some_and(|v| !v.is_null()) {
            form.required_choice::<Degree>("degree")
        } else {
            Some(Degree::Md)
        };
        let physician = degree.map(|degree| PhysicianFields {
            name: name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| username.clone()),
            degree,
        });
        Ok(physician.map(|p| (email.unwrap_or_default(), p)))
    })?;

    if db::get_user_by_username(&ctx.core.open_db()?, &username)?.is_some() {
        return Err(ApiError::BadRequest("Username already exists.".into()));
    }

    let password_hash = hash_off_runtime(password, ctx.core.password_iterations).await?;
    let conn = ctx.core.open_db()?;
    let tx = conn.unchecked_transaction()?;
    let user_id = db::insert_user(&tx, &username, &email, &password_hash)?;
    db::insert_physician(&tx, user_id, &physician)?;
    tx.commit()?;

    let tokens = ctx.core.tokens.issue_pair(user_id, &username)?;
    tracing::info!(user_id, "Account created");

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            tokens,
            user: UserInfo {
                id: user_id,
                username,
                physician: Some(physician),
            },
        }),
    ))
}

/// `POST /api/login/`: exchange credentials for a token pair.
pub async fn login(
    State(ctx): State<ApiContext>,
    JsonObject(body): JsonObject,
) -> Result<Json<SessionResponse>, ApiError> {
    let (username, password) = validate(&body, |form| {
        let username = form.required_str("username", USERNAME_MAX);
        let password = form.required_str("password", 4096);
        Ok(username.zip(password))
    })?;

    let (user, physician) = {
        let conn = ctx.core.open_db()?;
        match db::get_user_by_username(&conn, &username)? {
            Some(user) => {
                let physician = db::get_physician_by_user(&conn, user.id)?.map(|p| p.fields);
                (Some(user), physician)
            }
            None => (None, None),
        }
    };

    // Unknown usernames still pay for a full hash check.
    let encoded = match &user {
        Some(user) => user.password_hash.clone(),
        None => unmatchable_hash(ctx.core.password_iterations),
    };
    let matches = verify_off_runtime(password, encoded).await?;
    let Some(user) = user.filter(|_| matches) else {
        tracing::warn!(username = %username, "Login failed");
        return Err(ApiError::InvalidCredentials);
    };

    let tokens = ctx.core.tokens.issue_pair(user.id, &user.username)?;

    Ok(Json(SessionResponse {
        tokens,
        user: UserInfo {
            id: user.id,
            username: user.username,
            physician,
        },
    }))
}

/// `POST /api/refresh/`: new access token from a refresh token.
pub async fn refresh(
    State(ctx): State<ApiContext>,
    JsonObject(body): JsonObject,
) -> Result<Json<AccessResponse>, ApiError> {
    let token = validate(&body, |form| Ok(form.required_str("refresh", 4096)))?;
    let claims = ctx.core.tokens.verify(&token, TokenType::Refresh)?;

    let conn = ctx.core.open_db()?;
    let user = db::get_user(&conn, claims.sub)?.ok_or(ApiError::Unauthorized)?;

    Ok(Json(AccessResponse {
        access: ctx.core.tokens.issue(user.id, &user.username, TokenType::Access)?,
    }))
}

/// `GET /api/me/`: the caller's physician profile.
pub async fn me(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<PhysicianFields>, ApiError> {
    let conn = ctx.core.open_db()?;
    let physician = db::get_physician_by_user(&conn, user.user_id)?
        .ok_or_else(|| ApiError::NotFound("Physician profile not found".into()))?;
    Ok(Json(physician.fields))
}

/// `POST /api/reset-password/`: change the caller's password.
pub async fn reset_password(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    body: JsonObject,
) -> Result<Json<MessageResponse>, ApiError> {
    let (Some(current), Some(new)) = (body.text("current_password"), body.text("new_password")) else {
        return Err(ApiError::BadRequest("Both fields are required.".into()));
    };

    let (current, new) = (current.to_string(), new.to_string());

    let account = db::get_user(&ctx.core.open_db()?, user.user_id)?.ok_or(ApiError::Unauthorized)?;
    if !verify_off_runtime(current, account.password_hash).await? {
        return Err(ApiError::BadRequest("Current password is incorrect.".into()));
    }

    let password_hash = hash_off_runtime(new, ctx.core.password_iterations).await?;
    db::update_user_password(&ctx.core.open_db()?, account.id, &password_hash)?;
    tracing::info!(user_id = account.id, "Password changed");

    Ok(Json(MessageResponse {
        message: "Password updated successfully.",
    }))
}
