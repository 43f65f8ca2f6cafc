use axum::{debug_handler, extract::State, response::Redirect};
use oauth2::{CsrfToken, PkceCodeChallenge};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use tower_sessions::Session;
use validator::Validate;

use crate::{
    AppError, AppResult, AppState,
    res::{self, ApiResponse, JsonBody, PathParam},
    session::{CSRF_STATE, PKCE_VERIFIER},
    validate::{FieldErrors, trimmed},
};

use super::{ClientProvider, Clients, JwtKeys, User, password::verify_password};

#[derive(Deserialize, Validate)]
pub(crate) struct LoginRequest {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(required(message = "This field is required."))]
    email: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(required(message = "This field is required."))]
    password: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(db_pool): State<SqlitePool>,
    State(jwt): State<JwtKeys>,
    JsonBody(body): JsonBody<LoginRequest>,
) -> AppResult<ApiResponse> {
    FieldErrors::of(&body).check("Login Failed")?;
    let (Some(email), Some(password)) = (body.email, body.password) else {
        return Err(AppError::bad_request("Login Failed"));
    };

    let user = User::by_email(&db_pool, &email)
        .await?
        .filter(|u| u.is_active)
        .filter(|u| u.password_hash.as_deref().is_some_and(|h| verify_password(h, &password)));
    let Some(user) = user else {
        return Err(AppError::unauthorized("Invalid email or password"));
    };

    if user.user_type.is_none() {
        return Err(AppError::forbidden("Please choose your role first."));
    }

    tracing::info!(user_id = user.id, "login");
    let tokens = jwt.pair(user.id)?;
    res::ok("Login successful", json!({ "tokens": tokens, "profile": user.profile() }))
}

/// Starts the authorization-code flow; the provider redirects back to `lockin`.
#[debug_handler(state = AppState)]
pub(crate) async fn social_login(
    PathParam(provider): PathParam<ClientProvider>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<Redirect> {
    let client = clients.get_client(provider)?;

    let (pkce_code_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let (authorize_url, csrf_state) = client.authorize_url(CsrfToken::new_random)
        .add_scopes(Clients::scopes(provider))
        .set_pkce_challenge(pkce_code_challenge)
        .url();

    session.insert(CSRF_STATE, csrf_state.secret()).await?;
    session.insert(PKCE_VERIFIER, pkce_verifier.secret()).await?;

    Ok(Redirect::to(authorize_url.as_str()))
}
