//! Development session issuer.
//!
//! Real deployments sign users in elsewhere. These routes let the CLI and the
//! integration tests obtain an authenticated session against a local server.

use axum::{Json, http::StatusCode};
use cart_sync_core::UserId;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{clear_current_user, set_current_user};
use crate::models::CurrentUser;

/// Body of `POST /auth/login`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub user_id: UserId,
}

/// `POST /auth/login`: sign in as the given user.
///
/// # Errors
///
/// Returns `BadRequest` for a blank user id, or a session error.
#[instrument(skip(session, request), fields(user_id = %request.user_id))]
pub async fn login(session: Session, Json(request): Json<LoginRequest>) -> Result<StatusCode> {
    if request.user_id.is_blank() {
        return Err(AppError::BadRequest("userId is required".to_string()));
    }

    // New session ID on privilege change
    session.cycle_id().await?;
    let user = CurrentUser {
        id: request.user_id,
    };
    set_current_user(&session, &user).await?;
    set_sentry_user(&user.id);

    tracing::info!("User signed in");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /auth/logout`: end the session.
///
/// # Errors
///
/// Returns a session error if the session cannot be modified.
#[instrument(skip(session))]
pub async fn logout(session: Session) -> Result<StatusCode> {
    clear_current_user(&session).await?;
    session.flush().await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}
