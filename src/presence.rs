use std::time::Duration;

use axum::{extract::{Request, State}, middleware::Next, response::Response};
use time::format_description::well_known::Rfc3339;

use crate::{AppState, auth, cache::Cache, db};

fn online_key(user_id: i64) -> String {
    format!("user:{user_id}:online")
}

fn last_seen_key(user_id: i64) -> String {
    format!("user:{user_id}:last_seen")
}

/// Best-effort "recently active" tracking on top of the cache.
///
/// Failures are logged and swallowed; presence must never fail a request.
#[derive(Clone)]
pub struct Presence {
    cache: Cache,
    ttl: Duration,
}

impl Presence {
    pub fn new(cache: Cache, ttl_seconds: u64) -> Self {
        Self { cache, ttl: Duration::from_secs(ttl_seconds) }
    }

    /// Marks the user online for the presence TTL and stamps `last_seen`.
    pub async fn touch(&self, user_id: i64) {
        if let Err(e) = self.cache.set_ex(&online_key(user_id), "1", self.ttl).await {
            tracing::warn!(user_id, error = ?e, "could not write presence");
        }
        self.seen(user_id).await;
    }

    /// Stamps `last_seen` only; the online flag is left to expire on its own.
    pub async fn seen(&self, user_id: i64) {
        let Ok(now) = db::now().format(&Rfc3339) else {
            return;
        };
        if let Err(e) = self.cache.set(&last_seen_key(user_id), &now).await {
            tracing::warn!(user_id, error = ?e, "could not write last_seen");
        }
    }

    pub async fn is_online(&self, user_id: i64) -> bool {
        match self.cache.get(&online_key(user_id)).await {
            Ok(value) => value.is_some(),
            Err(e) => {
                tracing::warn!(user_id, error = ?e, "could not read presence");
                false
            }
        }
    }

    pub async fn last_seen(&self, user_id: i64) -> Option<String> {
        self.cache.get(&last_seen_key(user_id)).await.unwrap_or_else(|e| {
            tracing::warn!(user_id, error = ?e, "could not read last_seen");
            None
        })
    }
}

/// Marks presence for every request carrying a valid access token.
pub async fn track(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let user_id = auth::bearer_token(req.headers())
        .and_then(|token| state.jwt.decode(token, auth::TokenType::Access).ok())
        .map(|claims| claims.user_id);

    let response = next.run(req).await;

    if let Some(user_id) = user_id {
        state.presence.touch(user_id).await;
    }
    response
}
