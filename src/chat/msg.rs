use axum::{debug_handler, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use time::format_description::well_known::Rfc3339;
use validator::Validate;

use crate::{
    AppError, AppResult, AppState,
    auth::{AuthUser, User},
    channels::{ChannelLayer, chat_group},
    db,
    presence::Presence,
    res::{self, ApiResponse, JsonBody, PathParam},
    validate::{FieldErrors, trimmed},
};

use super::model::{ChatRoom, Directory, Message, MessageView};

pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// The `chat_message` frame every socket of the room receives.
pub fn chat_frame(message: &Message, sender: &User) -> Value {
    json!({
        "type": "chat_message",
        "message_id": message.id,
        "room_id": message.room_id,
        "message": message.content,
        "sender_id": sender.id,
        "sender_email": sender.email,
        "user_role": sender.user_type,
        "is_read": message.is_read,
        "created_at": message.created_at.format(&Rfc3339).unwrap_or_default(),
    })
}

/// Stores a message, bumps the room's activity time and fans it out to the room group.
pub(crate) async fn send_msg(
    db_pool: &SqlitePool,
    channels: &ChannelLayer,
    room: &ChatRoom,
    sender: &User,
    content: &str,
) -> AppResult<Message> {
    let now = db::now();
    let mut tx = db_pool.begin().await?;
    let message: Message = sqlx::query_as(
        "INSERT INTO messages (room_id,sender_id,content,is_read,created_at) VALUES (?,?,?,0,?) RETURNING *",
    )
    .bind(room.id)
    .bind(sender.id)
    .bind(content)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;
    sqlx::query("UPDATE chat_rooms SET updated_at=? WHERE id=?")
        .bind(now)
        .bind(room.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    let delivered = channels
        .group_send(&chat_group(room.id), chat_frame(&message, sender).to_string())
        .await;
    tracing::debug!(room_id = room.id, message_id = message.id, delivered, "message sent");
    Ok(message)
}

/// Marks messages read on behalf of `reader`. Only others' messages inside the
/// reader's rooms are touched; `room_id` narrows it to one room.
pub(crate) async fn mark_read(
    db_pool: &SqlitePool,
    reader: i64,
    room_id: Option<i64>,
    ids: Option<&[i64]>,
) -> sqlx::Result<u64> {
    let mut sql = String::from(
        "UPDATE messages SET is_read=1 WHERE is_read=0 AND sender_id IS NOT ? \
         AND room_id IN (SELECT id FROM chat_rooms WHERE customer_id=? OR professional_id=?)",
    );
    if room_id.is_some() {
        sql.push_str(" AND room_id=?");
    }
    if let Some(ids) = ids {
        if ids.is_empty() {
            return Ok(0);
        }
        sql.push_str(&format!(" AND id IN ({})", db::placeholders(ids.len())));
    }

    let mut query = sqlx::query(&sql).bind(reader).bind(reader).bind(reader);
    if let Some(room_id) = room_id {
        query = query.bind(room_id);
    }
    for id in ids.unwrap_or_default() {
        query = query.bind(*id);
    }
    Ok(query.execute(db_pool).await?.rows_affected())
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_messages(
    State(db_pool): State<SqlitePool>,
    State(presence): State<Presence>,
    AuthUser(user): AuthUser,
) -> AppResult<ApiResponse> {
    let messages: Vec<Message> = sqlx::query_as(
        "SELECT m.* FROM messages m JOIN chat_rooms r ON r.id=m.room_id \
         WHERE r.customer_id=? OR r.professional_id=? ORDER BY m.id DESC",
    )
    .bind(user.id)
    .bind(user.id)
    .fetch_all(&db_pool)
    .await?;

    let mut dir = Directory::new(&db_pool, &presence);
    let mut views = Vec::with_capacity(messages.len());
    for message in messages {
        views.push(MessageView::build(&mut dir, message).await?);
    }
    res::ok("fetch your data successfully", views)
}

#[derive(Deserialize, Validate)]
pub(crate) struct NewMessage {
    #[validate(required(message = "This field is required."))]
    room: Option<i64>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(
        required(message = "This field is required."),
        length(max = 2000, message = "Ensure this field has no more than 2000 characters.")
    )]
    content: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn create_message(
    State(db_pool): State<SqlitePool>,
    State(channels): State<ChannelLayer>,
    State(presence): State<Presence>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<NewMessage>,
) -> AppResult<ApiResponse> {
    let mut errors = FieldErrors::of(&body);
    let room = match body.room {
        None => None,
        Some(room_id) => match ChatRoom::by_id(&db_pool, room_id).await? {
            None => {
                errors.add("room", format!("Invalid pk \"{room_id}\" - object does not exist."));
                None
            }
            Some(room) if !room.is_member(user.id) => {
                errors.add("room", "You are not a member of this chat room");
                None
            }
            Some(room) => Some(room),
        },
    };
    errors.check("Message send failed")?;
    let (Some(room), Some(content)) = (room, body.content) else {
        return Err(AppError::bad_request("Message send failed"));
    };

    let message = send_msg(&db_pool, &channels, &room, &user, &content).await?;
    let mut dir = Directory::new(&db_pool, &presence);
    res::created("Message sent successfully", MessageView::build(&mut dir, message).await?)
}

#[debug_handler(state = AppState)]
pub(crate) async fn mark_message_read(
    PathParam(message_id): PathParam<i64>,
    State(db_pool): State<SqlitePool>,
    State(presence): State<Presence>,
    AuthUser(user): AuthUser,
) -> AppResult<ApiResponse> {
    let Some(mut message) = Message::by_id(&db_pool, message_id).await? else {
        return res::sorry("Message");
    };
    if message.sender_id == Some(user.id) {
        return Err(AppError::bad_request("Cannot mark your own message as read"));
    }
    ChatRoom::for_member(&db_pool, message.room_id, user.id, "You are not a member of this chat").await?;

    sqlx::query("UPDATE messages SET is_read=1 WHERE id=?")
        .bind(message.id)
        .execute(&db_pool)
        .await?;
    message.is_read = true;

    let mut dir = Directory::new(&db_pool, &presence);
    res::ok("Message marked as read", MessageView::build(&mut dir, message).await?)
}

#[derive(Deserialize)]
pub(crate) struct MessageIds {
    message_ids: Option<Vec<i64>>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn mark_multiple_read(
    State(db_pool): State<SqlitePool>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<MessageIds>,
) -> AppResult<ApiResponse> {
    let ids = body.message_ids.unwrap_or_default();
    if ids.is_empty() {
        return Err(AppError::bad_request("message_ids is required"));
    }
    let updated = mark_read(&db_pool, user.id, None, Some(&ids)).await?;
    res::ok("Messages marked as read", json!({ "marked_read": updated }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn unread_count(
    State(db_pool): State<SqlitePool>,
    AuthUser(user): AuthUser,
) -> AppResult<ApiResponse> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM messages m JOIN chat_rooms r ON r.id=m.room_id \
         WHERE (r.customer_id=? OR r.professional_id=?) AND m.is_read=0 AND m.sender_id IS NOT ?",
    )
    .bind(user.id)
    .bind(user.id)
    .bind(user.id)
    .fetch_one(&db_pool)
    .await?;
    res::ok("fetch your data successfully", json!({ "unread_count": count }))
}
