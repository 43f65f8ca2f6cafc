use std::collections::HashMap;

use serde::Serialize;
use sqlx::{FromRow, SqliteExecutor, SqlitePool};
use time::OffsetDateTime;

use crate::{
    AppError, AppResult,
    auth::{User, UserType},
    presence::Presence,
};

#[derive(Debug, Clone, FromRow)]
pub struct ChatRoom {
    pub id: i64,
    pub customer_id: Option<i64>,
    pub professional_id: Option<i64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl ChatRoom {
    pub async fn by_id(db: impl SqliteExecutor<'_>, id: i64) -> sqlx::Result<Option<ChatRoom>> {
        sqlx::query_as("SELECT * FROM chat_rooms WHERE id=?")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Loads the room and checks the user takes part in it.
    pub async fn for_member(db_pool: &SqlitePool, id: i64, user_id: i64, denied: &str) -> AppResult<ChatRoom> {
        let Some(room) = Self::by_id(db_pool, id).await? else {
            return Err(AppError::not_found("Chat room not found"));
        };
        if !room.is_member(user_id) {
            return Err(AppError::forbidden(denied));
        }
        Ok(room)
    }

    pub async fn for_user(db_pool: &SqlitePool, user_id: i64) -> sqlx::Result<Vec<ChatRoom>> {
        sqlx::query_as(
            "SELECT * FROM chat_rooms WHERE customer_id=? OR professional_id=? \
             ORDER BY julianday(updated_at) DESC, id DESC",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(db_pool)
        .await
    }

    pub fn is_member(&self, user_id: i64) -> bool {
        self.customer_id == Some(user_id) || self.professional_id == Some(user_id)
    }

    pub fn other(&self, user_id: i64) -> Option<i64> {
        if self.customer_id == Some(user_id) {
            self.professional_id
        } else {
            self.customer_id
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Message {
    pub id: i64,
    pub room_id: i64,
    pub sender_id: Option<i64>,
    pub content: String,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Message {
    pub async fn by_id(db: impl SqliteExecutor<'_>, id: i64) -> sqlx::Result<Option<Message>> {
        sqlx::query_as("SELECT * FROM messages WHERE id=?")
            .bind(id)
            .fetch_optional(db)
            .await
    }
}

/// Public summary of a chat participant, including presence.
#[derive(Debug, Clone, Serialize)]
pub struct UserBasic {
    pub id: i64,
    pub email: String,
    pub role: Option<UserType>,
    pub name: String,
    pub profile_pic: Option<String>,
    pub is_online: bool,
    pub last_seen: Option<String>,
}

/// Per-request lookup of [`UserBasic`]s; each user is loaded at most once.
pub struct Directory<'a> {
    db_pool: &'a SqlitePool,
    presence: &'a Presence,
    seen: HashMap<i64, Option<UserBasic>>,
}

impl<'a> Directory<'a> {
    pub fn new(db_pool: &'a SqlitePool, presence: &'a Presence) -> Self {
        Self { db_pool, presence, seen: HashMap::new() }
    }

    pub async fn get(&mut self, user_id: Option<i64>) -> AppResult<Option<UserBasic>> {
        let Some(user_id) = user_id else {
            return Ok(None);
        };
        if let Some(found) = self.seen.get(&user_id) {
            return Ok(found.clone());
        }

        let basic = match User::by_id(self.db_pool, user_id).await? {
            Some(user) => Some(UserBasic {
                id: user.id,
                name: user.display_name().to_owned(),
                email: user.email,
                role: user.user_type,
                profile_pic: user.profile_pic,
                is_online: self.presence.is_online(user.id).await,
                last_seen: self.presence.last_seen(user.id).await,
            }),
            None => None,
        };
        self.seen.insert(user_id, basic.clone());
        Ok(basic)
    }
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub id: i64,
    pub room: i64,
    pub sender: Option<i64>,
    pub sender_info: Option<UserBasic>,
    pub content: String,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl MessageView {
    pub async fn build(dir: &mut Directory<'_>, message: Message) -> AppResult<Self> {
        Ok(Self {
            sender_info: dir.get(message.sender_id).await?,
            id: message.id,
            room: message.room_id,
            sender: message.sender_id,
            content: message.content,
            is_read: message.is_read,
            created_at: message.created_at,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct LastMessage {
    pub id: i64,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub sender_id: Option<i64>,
    pub sender_email: Option<String>,
    pub is_read: bool,
}

#[derive(Debug, Serialize)]
pub struct RoomView {
    pub id: i64,
    pub customer: Option<i64>,
    pub professional: Option<i64>,
    pub customer_info: Option<UserBasic>,
    pub professional_info: Option<UserBasic>,
    pub last_message: Option<LastMessage>,
    pub unread_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl RoomView {
    /// `viewer` decides which messages count as unread.
    pub async fn build(dir: &mut Directory<'_>, room: ChatRoom, viewer: i64) -> AppResult<Self> {
        let last: Option<Message> = sqlx::query_as("SELECT * FROM messages WHERE room_id=? ORDER BY id DESC LIMIT 1")
            .bind(room.id)
            .fetch_optional(dir.db_pool)
            .await?;
        let last_message = match last {
            Some(m) => Some(LastMessage {
                sender_email: dir.get(m.sender_id).await?.map(|u| u.email),
                id: m.id,
                content: m.content,
                created_at: m.created_at,
                sender_id: m.sender_id,
                is_read: m.is_read,
            }),
            None => None,
        };

        Ok(Self {
            id: room.id,
            customer: room.customer_id,
            professional: room.professional_id,
            customer_info: dir.get(room.customer_id).await?,
            professional_info: dir.get(room.professional_id).await?,
            last_message,
            unread_count: unread_in_room(dir.db_pool, room.id, viewer).await?,
            created_at: room.created_at,
            updated_at: room.updated_at,
        })
    }
}

/// Messages in `room_id` not yet read by `viewer` (i.e. sent by anyone else).
pub async fn unread_in_room(db: impl SqliteExecutor<'_>, room_id: i64, viewer: i64) -> sqlx::Result<i64> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM messages WHERE room_id=? AND is_read=0 AND sender_id IS NOT ?")
            .bind(room_id)
            .bind(viewer)
            .fetch_one(db)
            .await?;
    Ok(count)
}
