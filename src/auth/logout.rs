use axum::{debug_handler, extract::State};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    AppError, AppResult, AppState,
    res::{self, ApiResponse, JsonBody},
    validate::{FieldErrors, trimmed},
};

use super::{AuthUser, JwtKeys, TokenType, User, jwt};

#[derive(Deserialize, Validate)]
pub(crate) struct RefreshBody {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(required(message = "This field is required."))]
    refresh: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn logout(
    State(db_pool): State<SqlitePool>,
    State(keys): State<JwtKeys>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<RefreshBody>,
) -> AppResult<ApiResponse> {
    let Some(refresh) = body.refresh.as_deref() else {
        return Err(AppError::bad_request("Refresh token is required"));
    };

    let claims = keys
        .decode(refresh, TokenType::Refresh)
        .map_err(|_| AppError::bad_request("Logout failed: Token is invalid or expired"))?;
    if claims.user_id != user.id {
        return Err(AppError::bad_request("Logout failed: token belongs to another user"));
    }

    jwt::blacklist(&db_pool, &claims).await?;
    tracing::info!(user_id = user.id, "logout");
    res::ok("Logout successful", json!({}))
}

/// Exchanges a refresh token for a new pair. The presented token is blacklisted.
#[debug_handler(state = AppState)]
pub(crate) async fn refresh(
    State(db_pool): State<SqlitePool>,
    State(keys): State<JwtKeys>,
    JsonBody(body): JsonBody<RefreshBody>,
) -> AppResult<ApiResponse> {
    FieldErrors::of(&body).check("Token refresh failed")?;
    let Some(refresh) = body.refresh else {
        return Err(AppError::bad_request("Token refresh failed"));
    };

    let claims = keys.decode(&refresh, TokenType::Refresh)?;

    let mut tx = db_pool.begin().await?;
    if jwt::is_blacklisted(&mut *tx, &claims.jti).await? {
        return Err(AppError::unauthorized("Token is blacklisted"));
    }
    match User::by_id(&mut *tx, claims.user_id).await? {
        Some(user) if user.is_active => {}
        _ => return Err(AppError::unauthorized("User not found or inactive")),
    }
    jwt::blacklist(&mut *tx, &claims).await?;
    tx.commit().await?;

    let pair = keys.pair(claims.user_id)?;
    res::ok("Token refreshed successfully.", pair)
}
