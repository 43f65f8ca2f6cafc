use axum::{debug_handler, extract::{Query, State}};
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeVerifier, TokenResponse};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    AppError, AppResult, AppState,
    config::Settings,
    res::{ApiResponse, PathParam},
    session::{CSRF_STATE, PKCE_VERIFIER},
};

use super::{ClientProvider, Clients, JwtKeys, clients, social::{SocialProfile, complete_social_login}};

#[derive(Deserialize)]
pub struct LockinQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn lockin(
    PathParam(provider): PathParam<ClientProvider>,
    Query(LockinQuery { state, code }): Query<LockinQuery>,
    State(db_pool): State<SqlitePool>,
    State(clients): State<Clients>,
    State(jwt): State<JwtKeys>,
    State(settings): State<Settings>,
    session: Session,
) -> AppResult<ApiResponse> {
    let state = CsrfToken::new(state.ok_or("OAuth: without state")?);
    let code = AuthorizationCode::new(code.ok_or("OAuth: without code")?);

    let Some(stored_state) = session.remove::<String>(CSRF_STATE).await? else {
        return Err("no csrf_state")?;
    };

    if state.secret().as_str() != stored_state.as_str() {
        return Err("csrf tokens don't match")?;
    }

    let Some(pkce_verifier) = session.remove::<String>(PKCE_VERIFIER).await? else {
        return Err("no pkce_verifier")?;
    };

    let client = clients.get_client(provider)?;
    let http_client = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let token_result = client
        .exchange_code(code)
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
        .request_async(&http_client)
        .await?;

    let access_token = token_result.access_token().secret();
    let info = clients::fetch_userinfo(&http_client, provider, &settings.google_userinfo_url, access_token)
        .await
        .map_err(|e| {
            AppError::bad_request(format!("Failed to fetch {provider} user info."))
                .with_data(json!({ "detail": e.to_string() }))
        })?;

    let profile = SocialProfile::from_userinfo(provider, info)?;
    complete_social_login(&db_pool, &jwt, profile).await
}
