use axum::{debug_handler, extract::{Query, State}};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    AppError, AppResult, AppState,
    auth::{AuthUser, UserType},
    presence::Presence,
    res::{self, ApiResponse},
};

use super::model::Directory;

const MAX_RESULTS: i64 = 50;

#[derive(Deserialize)]
pub(crate) struct SearchQuery {
    q: Option<String>,
}

fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// People the caller can open a room with: active users of the other role,
/// narrowed by name or email when `q` is given.
#[debug_handler(state = AppState)]
pub(crate) async fn list_users(
    Query(query): Query<SearchQuery>,
    State(db_pool): State<SqlitePool>,
    State(presence): State<Presence>,
    AuthUser(user): AuthUser,
) -> AppResult<ApiResponse> {
    let wanted = match user.user_type {
        Some(UserType::Customer) => UserType::Professional,
        Some(UserType::Professional) => UserType::Customer,
        None => return Err(AppError::forbidden("Please choose your role first.")),
    };
    let pattern = like_pattern(query.q.as_deref().map(str::trim).unwrap_or_default());

    let ids: Vec<(i64,)> = sqlx::query_as(
        "SELECT id FROM users WHERE is_active=1 AND user_type=? \
         AND (lower(name) LIKE ? ESCAPE '\\' OR lower(email) LIKE ? ESCAPE '\\') \
         ORDER BY lower(name), id LIMIT ?",
    )
    .bind(wanted)
    .bind(&pattern)
    .bind(&pattern)
    .bind(MAX_RESULTS)
    .fetch_all(&db_pool)
    .await?;

    let mut dir = Directory::new(&db_pool, &presence);
    let mut users = Vec::with_capacity(ids.len());
    for (id,) in ids {
        if let Some(basic) = dir.get(Some(id)).await? {
            users.push(basic);
        }
    }
    res::ok("fetch your data successfully", users)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards_in_the_query_are_literal() {
        assert_eq!(like_pattern(""), "%%");
        assert_eq!(like_pattern("Ann"), "%ann%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
