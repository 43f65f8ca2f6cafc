pub mod auth;
pub mod cache;
pub mod channels;
pub mod chat;
pub mod config;
pub mod db;
pub mod mail;
pub mod notifications;
pub mod presence;
pub mod res;
pub mod session;
pub mod validate;
pub mod zoom;

use axum::{
    Router,
    extract::FromRef,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};

use crate::{channels::ChannelLayer, config::Settings, mail::Mailer, presence::Presence, res::ApiResponse};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub clients: auth::Clients,
    pub jwt: auth::JwtKeys,
    pub channels: ChannelLayer,
    pub presence: Presence,
    pub mailer: Mailer,
    pub zoom: zoom::ZoomClient,
    pub http: reqwest::Client,
    pub settings: Settings,
}

/// Builds the complete router. `main` serves it, the API tests drive it directly.
pub fn app(state: AppState) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(10)));

    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::router())
        .nest("/chat", chat::router())
        .nest("/zoom", zoom::router())
        .merge(notifications::router())
        .route("/ws/chat/{room_id}", get(chat::ws::chat_ws))
        .route("/ws/notifications", get(notifications::ws::notifications_ws))
        .fallback(fallback)
        .layer(middleware::from_fn_with_state(state.clone(), presence::track))
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "healthy"
}

async fn fallback() -> AppError {
    AppError::not_found("Not found")
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
    fn get_opt_str_field(&self, field: &str) -> Option<String>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or(format!("expected {field} in {self}"))?
            .as_str()
            .ok_or(format!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }

    fn get_opt_str_field(&self, field: &str) -> Option<String> {
        self.get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Error returned by every handler.
///
/// `Api` failures are expected outcomes (bad input, missing permission) and are
/// rendered as-is. `Internal` wraps anything else; it is logged and rendered as a
/// 500 envelope.
#[derive(Debug)]
pub enum AppError {
    Api {
        status: StatusCode,
        message: String,
        data: Value,
    },
    Internal(anyhow::Error),
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
            data: json!({}),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn with_data(self, data: Value) -> Self {
        match self {
            Self::Api { status, message, .. } => Self::Api { status, message, data },
            internal => internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Api { status, .. } => *status,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Api { status, message, data } => {
                ApiResponse::fail(status, message, data).into_response()
            }
            Self::Internal(err) => {
                tracing::error!(error = ?err, "request failed");
                ApiResponse::fail(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    json!({ "detail": "Something went wrong on our side." }),
                )
                .into_response()
            }
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Api { status, message, .. } => write!(f, "{status}: {message}"),
            Self::Internal(err) => write!(f, "{err}"),
        }
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self::bad_request(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self::bad_request(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self::Internal(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(serde_json::Error);
apperr_impl!(sqlx::Error);
apperr_impl!(tower_sessions::session::Error);
apperr_impl!(axum::Error);
apperr_impl!(reqwest::Error);

impl<E: core::error::Error + Send + Sync + 'static, R: oauth2::ErrorResponse + Send + Sync + 'static> From<oauth2::RequestTokenError<E, R>> for AppError {
    fn from(err: oauth2::RequestTokenError<E, R>) -> Self {
        Self::Internal(anyhow::Error::from(err))
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    #[tokio::test]
    async fn internal_errors_keep_their_cause_out_of_the_body() {
        let res = AppError::from(anyhow::anyhow!("no such table: users")).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Internal server error");
        assert!(!body.to_string().contains("no such table"));
    }

    #[tokio::test]
    async fn unknown_routes_answer_with_the_envelope() {
        let res = fallback().await.into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "Not found");
        assert_eq!(body["status"], 404);
    }
}
