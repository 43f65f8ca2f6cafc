mod inbox;
mod model;
mod preferences;
pub mod reminders;
pub mod ws;

use axum::{Router, routing::{get, patch, post}};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use time::format_description::well_known::Rfc3339;

use crate::{
    AppResult, AppState,
    auth::{User, UserType},
    channels::{ChannelLayer, user_group},
    db,
};

pub use model::{Notification, NotificationKind, NotificationPreference};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(inbox::list))
        .route("/notifications/unread-count", get(inbox::unread_count))
        .route("/notifications/mark-read", post(inbox::mark_read))
        .route("/notifications/mark-all-read", post(inbox::mark_all_read))
        .route("/notifications/{id}/read", patch(inbox::mark_one_read))
        .route("/notifications/preferences", get(preferences::get_preferences).put(preferences::put_preferences))
        .route("/notifications/test", post(inbox::test_notification))
}

/// The frame pushed to `user_{id}` for a new notification.
pub fn notification_frame(notification: &Notification) -> Value {
    json!({
        "type": "send_notification",
        "message": {
            "id": notification.id,
            "title": notification.title,
            "message": notification.message,
            "user_type": notification.user_type,
            "is_read": notification.is_read,
            "meta": notification.meta.0,
            "created_at": notification.created_at.format(&Rfc3339).unwrap_or_default(),
        }
    })
}

/// Stores a notification for `receiver` and pushes it to their sockets.
///
/// Professionals may have opted out of `kind`; nothing is stored then and
/// `None` is returned. A missing preference row allows everything.
#[allow(clippy::too_many_arguments)]
pub async fn create_notification(
    db_pool: &SqlitePool,
    channels: &ChannelLayer,
    receiver: &User,
    title: &str,
    message: &str,
    user_type: UserType,
    meta: Value,
    kind: Option<NotificationKind>,
) -> AppResult<Option<Notification>> {
    if let Some(kind) = kind
        && receiver.is_professional()
        && let Some(pref) = NotificationPreference::find(db_pool, receiver.id).await?
        && !pref.allows(kind)
    {
        tracing::debug!(receiver = receiver.id, ?kind, "notification suppressed by preference");
        return Ok(None);
    }

    let meta = match meta {
        Value::Object(_) => meta,
        Value::Null => json!({}),
        other => json!({ "value": other }),
    };

    let notification: Notification = sqlx::query_as(
        "INSERT INTO notifications (receiver_id,title,message,user_type,is_read,meta,created_at) \
         VALUES (?,?,?,?,0,?,?) RETURNING *",
    )
    .bind(receiver.id)
    .bind(title)
    .bind(message)
    .bind(user_type)
    .bind(sqlx::types::Json(&meta))
    .bind(db::now())
    .fetch_one(db_pool)
    .await?;

    let delivered = channels
        .group_send(&user_group(receiver.id), notification_frame(&notification).to_string())
        .await;
    tracing::info!(notification_id = notification.id, receiver = receiver.id, delivered, "notification created");
    Ok(Some(notification))
}
