#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode, header},
    routing::{get, post},
};
use http_body_util::BodyExt;
use prochat::{
    AppState,
    auth::{self, JwtKeys, User, UserType},
    cache::Cache,
    channels::ChannelLayer,
    config::{Settings, ZoomConfig},
    db,
    mail::Mailer,
    presence::Presence,
    zoom::ZoomClient,
};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tower::ServiceExt;

pub const PASSWORD: &str = "correct horse";

/// Stand-in for the Zoom API; counts calls and can answer with scope errors.
#[derive(Default)]
pub struct FakeZoom {
    pub token_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub scope_failures: AtomicUsize,
}

async fn fake_token(State(fake): State<Arc<FakeZoom>>) -> Json<Value> {
    let n = fake.token_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "access_token": format!("token-{n}"), "expires_in": 3600 }))
}

async fn fake_create(State(fake): State<Arc<FakeZoom>>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let n = fake.create_calls.fetch_add(1, Ordering::SeqCst);
    if fake
        .scope_failures
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok()
    {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "code": 4711, "message": "Invalid access token, does not contain scopes" })),
        );
    }
    let id = 90_000_000_000_i64 + n as i64;
    (
        StatusCode::CREATED,
        Json(json!({
            "id": id,
            "topic": body["topic"],
            "duration": body["duration"],
            "join_url": format!("https://zoom.test/j/{id}"),
            "start_url": format!("https://zoom.test/s/{id}"),
            "password": "pw123",
        })),
    )
}

async fn fake_me() -> Json<Value> {
    Json(json!({ "id": "zoom-user", "email": "host@zoom.test", "account_id": "acct-1" }))
}

async fn fake_list() -> Json<Value> {
    Json(json!({ "meetings": [] }))
}

async fn spawn_fake_zoom(fake: Arc<FakeZoom>) -> String {
    let router = Router::new()
        .route("/oauth/token", post(fake_token))
        .route("/v2/users/me/meetings", post(fake_create).get(fake_list))
        .route("/v2/users/me", get(fake_me))
        .with_state(fake);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A fresh database file per test; WAL lets handlers and tests share it.
pub async fn test_pool() -> SqlitePool {
    let path = std::env::temp_dir().join(format!("prochat-test-{}.db", uuid::Uuid::now_v7()));
    db::connect(&format!("sqlite://{}", path.display())).await.unwrap()
}

pub struct TestApp {
    pub state: AppState,
    pub zoom: Arc<FakeZoom>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_zoom(true).await
    }

    /// `zoom_configured = false` leaves the Zoom credentials unset.
    pub async fn with_zoom(zoom_configured: bool) -> Self {
        let db_pool = test_pool().await;
        let cache = Cache::memory();
        let fake = Arc::new(FakeZoom::default());
        let base = spawn_fake_zoom(fake.clone()).await;
        let credential = |v: &str| zoom_configured.then(|| v.to_owned());
        let zoom_config = ZoomConfig {
            account_id: credential("acct-1"),
            client_id: credential("client"),
            client_secret: credential("secret"),
            oauth_url: base.clone(),
            api_url: base,
        };
        let http = reqwest::Client::builder().no_proxy().build().unwrap();

        let state = AppState {
            db_pool,
            clients: auth::Clients::default(),
            jwt: JwtKeys::new(b"test-secret", time::Duration::minutes(5), time::Duration::days(1)),
            channels: ChannelLayer::default(),
            presence: Presence::new(cache.clone(), 120),
            mailer: Mailer::outbox(),
            zoom: ZoomClient::new(http.clone(), cache, zoom_config),
            http,
            settings: Settings::default(),
        };
        Self { state, zoom: fake }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.state.db_pool
    }

    /// Inserts an active user with [`PASSWORD`] and returns it with an access token.
    pub async fn user(&self, email: &str, role: Option<UserType>) -> (User, String) {
        let hash = auth::hash_password(PASSWORD).unwrap();
        let id = auth::create_user(self.pool(), email, "", Some(&hash)).await.unwrap();
        sqlx::query("UPDATE users SET user_type=?, name=? WHERE id=?")
            .bind(role)
            .bind(email.split('@').next().unwrap_or_default())
            .bind(id)
            .execute(self.pool())
            .await
            .unwrap();
        let user = User::by_id(self.pool(), id).await.unwrap().unwrap();
        let tokens = self.state.jwt.pair(id).unwrap();
        (user, tokens.access)
    }

    pub async fn customer(&self, email: &str) -> (User, String) {
        self.user(email, Some(UserType::Customer)).await
    }

    pub async fn professional(&self, email: &str) -> (User, String) {
        self.user(email, Some(UserType::Professional)).await
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let res = prochat::app(self.state.clone()).oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }
}
