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

use super::{JwtKeys, User, otp, password::hash_password, user::create_user};

#[derive(Deserialize, Validate)]
pub(crate) struct SignupRequest {
    #[serde(default, deserialize_with = "trimmed")]
    name: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(
        required(message = "This field is required."),
        email(message = "Enter a valid email address.")
    )]
    email: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(required(message = "This field is required."))]
    password: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(required(message = "This field is required."))]
    confirm_password: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn signup(
    State(db_pool): State<SqlitePool>,
    State(mailer): State<Mailer>,
    State(settings): State<Settings>,
    JsonBody(body): JsonBody<SignupRequest>,
) -> AppResult<ApiResponse> {
    let mut errors = FieldErrors::of(&body);
    if !errors.has("email")
        && let Some(email) = &body.email
        && User::by_email(&db_pool, email).await?.is_some()
    {
        errors.add("email", "user with this email already exists.");
    }
    if !errors.has("password") && !errors.has("confirm_password") && body.password != body.confirm_password {
        errors.add("password", "Passwords do not match.");
    }
    errors.check("Signup failed.")?;
    let (Some(email), Some(password)) = (body.email, body.password) else {
        return Err(AppError::bad_request("Signup failed."));
    };

    let hash = hash_password(&password)?;
    let name = body.name.unwrap_or_default();
    let user_id = create_user(&db_pool, &email, &name, Some(&hash)).await?;

    let code = otp::issue_otp(&db_pool, user_id, settings.otp_ttl_minutes).await?;
    mailer.send(&email, "Signup OTP", format!("Your OTP is {code}")).await?;

    res::ok("User created successfully. Please verify OTP.", json!({ "email": email }))
}

#[derive(Deserialize)]
pub(crate) struct VerifyOtpRequest {
    otp: Option<String>,
    email: Option<String>,
}

/// Shared by signup and password-reset verification.
#[debug_handler(state = AppState)]
pub(crate) async fn verify_otp(
    State(db_pool): State<SqlitePool>,
    State(jwt): State<JwtKeys>,
    JsonBody(body): JsonBody<VerifyOtpRequest>,
) -> AppResult<ApiResponse> {
    let Some(code) = body.otp.as_deref().map(str::trim).filter(|c| !c.is_empty()) else {
        return Err(AppError::bad_request("OTP is required."));
    };
    let email = body.email.as_deref().map(str::trim).filter(|e| !e.is_empty());

    let user = otp::verify_otp(&db_pool, code, email).await?;
    tracing::info!(user_id = user.id, "otp verified");

    let tokens = jwt.pair(user.id)?;
    res::ok("OTP verified successfully.", json!({ "tokens": tokens }))
}
