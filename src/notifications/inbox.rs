use axum::{body::Bytes, debug_handler, extract::{Query, State}};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use time::format_description::well_known::Rfc3339;

use crate::{
    AppError, AppResult, AppState,
    auth::AuthUser,
    channels::{ChannelLayer, user_group},
    db,
    res::{self, ApiResponse, JsonBody, PathParam},
};

use super::Notification;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Deserialize)]
pub(crate) struct ListQuery {
    is_read: Option<String>,
    page: Option<String>,
    page_size: Option<String>,
}

/// Page and size, or the defaults when either is not a number.
///
/// `page` is capped so that `(page - 1) * size` always fits an `i64`.
fn paging(page: Option<&str>, page_size: Option<&str>) -> (i64, i64) {
    let parse = |v: Option<&str>, default: i64| v.map_or(Ok(default), |v| v.trim().parse::<i64>());
    match (parse(page, 1), parse(page_size, DEFAULT_PAGE_SIZE)) {
        (Ok(page), Ok(size)) => (page.clamp(1, i64::MAX / MAX_PAGE_SIZE), size.clamp(1, MAX_PAGE_SIZE)),
        _ => (1, DEFAULT_PAGE_SIZE),
    }
}

async fn unread_for(db_pool: &SqlitePool, user_id: i64) -> sqlx::Result<i64> {
    let (unread,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE receiver_id=? AND is_read=0")
        .bind(user_id)
        .fetch_one(db_pool)
        .await?;
    Ok(unread)
}

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    Query(query): Query<ListQuery>,
    State(db_pool): State<SqlitePool>,
    AuthUser(user): AuthUser,
) -> AppResult<ApiResponse> {
    let read_filter = match query.is_read.as_deref() {
        Some("0") => Some(false),
        Some("1") => Some(true),
        _ => None,
    };
    let (page, size) = paging(query.page.as_deref(), query.page_size.as_deref());

    let filter = if read_filter.is_some() { " AND is_read=?" } else { "" };
    let count_sql = format!("SELECT COUNT(*) FROM notifications WHERE receiver_id=?{filter}");
    let page_sql = format!(
        "SELECT * FROM notifications WHERE receiver_id=?{filter} ORDER BY id DESC LIMIT ? OFFSET ?"
    );

    let mut count = sqlx::query_as::<_, (i64,)>(&count_sql).bind(user.id);
    let mut rows = sqlx::query_as::<_, Notification>(&page_sql).bind(user.id);
    if let Some(is_read) = read_filter {
        count = count.bind(is_read);
        rows = rows.bind(is_read);
    }
    let (total,) = count.fetch_one(&db_pool).await?;
    let items = rows
        .bind(size)
        .bind((page - 1) * size)
        .fetch_all(&db_pool)
        .await?;

    res::ok(
        "fetch your data successfully",
        json!({
            "items": items,
            "page": page,
            "page_size": size,
            "total": total,
            "unread": unread_for(&db_pool, user.id).await?,
        }),
    )
}

#[debug_handler(state = AppState)]
pub(crate) async fn mark_one_read(
    PathParam(id): PathParam<i64>,
    State(db_pool): State<SqlitePool>,
    AuthUser(user): AuthUser,
) -> AppResult<ApiResponse> {
    let updated = sqlx::query("UPDATE notifications SET is_read=1 WHERE id=? AND receiver_id=? AND is_read=0")
        .bind(id)
        .bind(user.id)
        .execute(&db_pool)
        .await?
        .rows_affected();
    res::ok("Notification marked as read", json!({ "updated": updated, "id": id }))
}

/// `ids` must be a list of integers; anything else is refused as a whole.
fn parse_ids(body: &Value) -> Option<Vec<i64>> {
    match body.get("ids") {
        None => Some(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| if v.is_i64() || v.is_u64() { v.as_i64() } else { None })
            .collect(),
        Some(_) => None,
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn mark_read(
    State(db_pool): State<SqlitePool>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<Value>,
) -> AppResult<ApiResponse> {
    let Some(ids) = parse_ids(&body) else {
        return Err(AppError::bad_request("ids must be list[int]").with_data(json!({ "detail": "ids must be list[int]" })));
    };

    let mut updated = 0;
    if !ids.is_empty() {
        let sql = format!(
            "UPDATE notifications SET is_read=1 WHERE receiver_id=? AND is_read=0 AND id IN ({})",
            db::placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql).bind(user.id);
        for id in &ids {
            query = query.bind(*id);
        }
        updated = query.execute(&db_pool).await?.rows_affected();
    }
    res::ok("Notifications marked as read", json!({ "updated": updated, "ids": ids }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn mark_all_read(
    State(db_pool): State<SqlitePool>,
    AuthUser(user): AuthUser,
) -> AppResult<ApiResponse> {
    let updated = sqlx::query("UPDATE notifications SET is_read=1 WHERE receiver_id=? AND is_read=0")
        .bind(user.id)
        .execute(&db_pool)
        .await?
        .rows_affected();
    res::ok("All notifications marked as read", json!({ "updated": updated }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn unread_count(
    State(db_pool): State<SqlitePool>,
    AuthUser(user): AuthUser,
) -> AppResult<ApiResponse> {
    res::ok("fetch your data successfully", json!({ "unread": unread_for(&db_pool, user.id).await? }))
}

/// Pushes a throwaway notification to the caller's own sockets. Nothing is stored.
#[debug_handler(state = AppState)]
pub(crate) async fn test_notification(
    State(channels): State<ChannelLayer>,
    AuthUser(user): AuthUser,
    body: Bytes,
) -> AppResult<ApiResponse> {
    let body = serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null);
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("This is a test notification!");

    let frame = json!({
        "type": "send_notification",
        "message": {
            "title": "Test Notification",
            "message": message,
            "created_at": db::now().format(&Rfc3339).unwrap_or_default(),
        }
    });
    let delivered = channels.group_send(&user_group(user.id), frame.to_string()).await;
    res::ok("notification sent", json!({ "delivered": delivered }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_falls_back_on_garbage() {
        assert_eq!(paging(None, None), (1, 20));
        assert_eq!(paging(Some("3"), Some("500")), (3, 100));
        assert_eq!(paging(Some("0"), Some("0")), (1, 1));
        assert_eq!(paging(Some("x"), Some("5")), (1, 20));
    }

    #[test]
    fn huge_pages_keep_the_offset_in_range() {
        let (page, size) = paging(Some(&i64::MAX.to_string()), Some("100"));
        assert!((page - 1).checked_mul(size).is_some());
        let (page, size) = paging(Some(&i64::MAX.to_string()), Some("1"));
        assert!((page - 1).checked_mul(size).is_some());
    }

    #[test]
    fn ids_must_be_integers() {
        assert_eq!(parse_ids(&json!({"ids": [1, 2]})), Some(vec![1, 2]));
        assert_eq!(parse_ids(&json!({})), Some(vec![]));
        assert_eq!(parse_ids(&json!({"ids": [1, "2"]})), None);
        assert_eq!(parse_ids(&json!({"ids": [1.5]})), None);
        assert_eq!(parse_ids(&json!({"ids": "1"})), None);
    }
}
