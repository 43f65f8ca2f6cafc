use axum::{debug_handler, extract::State};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    AppError, AppResult, AppState,
    config::Settings,
    mail::Mailer,
    res::{self, ApiResponse, JsonBody},
    validate::{FieldErrors, trimmed},
};

use super::{AuthUser, User, otp, password::{hash_password, verify_password}};

#[derive(Deserialize, Validate)]
pub(crate) struct ResetRequest {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(
        required(message = "This field is required."),
        email(message = "Enter a valid email address.")
    )]
    email: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn request_reset(
    State(db_pool): State<SqlitePool>,
    State(mailer): State<Mailer>,
    State(settings): State<Settings>,
    JsonBody(body): JsonBody<ResetRequest>,
) -> AppResult<ApiResponse> {
    let mut errors = FieldErrors::of(&body);
    let mut user = None;
    if !errors.has("email")
        && let Some(email) = &body.email
    {
        user = User::by_email(&db_pool, email).await?;
        if user.is_none() {
            errors.add("email", "User with this email does not exist.");
        }
    }
    errors.check("OTP sent failed")?;
    let Some(user) = user else {
        return Err(AppError::bad_request("OTP sent failed"));
    };

    let code = otp::issue_otp(&db_pool, user.id, settings.otp_ttl_minutes).await?;
    mailer
        .send(&user.email, "Password Reset OTP", format!("Your OTP for password reset is {code}"))
        .await?;

    tracing::info!(user_id = user.id, "password reset requested");
    res::ok("OTP sent to email.", json!({ "email": user.email }))
}

#[derive(Deserialize, Validate)]
pub(crate) struct ResetChange {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(required(message = "This field is required."))]
    new_password: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(required(message = "This field is required."))]
    confirm_password: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn change_after_reset(
    State(db_pool): State<SqlitePool>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<ResetChange>,
) -> AppResult<ApiResponse> {
    let mut errors = FieldErrors::of(&body);
    if errors.is_empty() && body.new_password != body.confirm_password {
        errors.add("password", "Passwords do not match.");
    }
    errors.check("Password reset failed")?;
    let Some(new_password) = body.new_password else {
        return Err(AppError::bad_request("Password reset failed"));
    };

    let hash = hash_password(&new_password)?;
    sqlx::query("UPDATE users SET password_hash=?, otp=NULL, otp_exp=NULL, otp_verified=0 WHERE id=?")
        .bind(hash)
        .bind(user.id)
        .execute(&db_pool)
        .await?;

    tracing::info!(user_id = user.id, "password reset");
    res::ok("Password reset successful.", json!({}))
}

#[derive(Deserialize, Validate)]
pub(crate) struct ChangePassword {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(required(message = "This field is required."))]
    old_password: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(required(message = "This field is required."))]
    new_password: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(required(message = "This field is required."))]
    confirm_password: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn change_password(
    State(db_pool): State<SqlitePool>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<ChangePassword>,
) -> AppResult<ApiResponse> {
    let mut errors = FieldErrors::of(&body);
    if errors.is_empty() && body.new_password != body.confirm_password {
        errors.add("confirm_password", "Passwords do not match");
    }
    errors.check("Password changed failed")?;
    let (Some(old), Some(new_password)) = (body.old_password, body.new_password) else {
        return Err(AppError::bad_request("Password changed failed"));
    };

    if !user.password_hash.as_deref().is_some_and(|h| verify_password(h, &old)) {
        return Err(AppError::bad_request("Old password does not match"));
    }

    let hash = hash_password(&new_password)?;
    sqlx::query("UPDATE users SET password_hash=? WHERE id=?")
        .bind(hash)
        .bind(user.id)
        .execute(&db_pool)
        .await?;

    tracing::info!(user_id = user.id, "password changed");
    res::ok("Password changed successfully", json!({}))
}
