use axum::{debug_handler, extract::{Query, State}, http::StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;

use crate::{
    AppError, AppResult, AppState,
    auth::{AuthUser, User, UserType},
    db,
    presence::Presence,
    res::{self, ApiResponse, JsonBody, PathParam},
};

use super::{
    model::{ChatRoom, Directory, Message, MessageView, RoomView, unread_in_room},
    msg::mark_read,
};

const DEFAULT_PAGE: i64 = 50;
const MAX_PAGE: i64 = 200;

#[debug_handler(state = AppState)]
pub(crate) async fn list_rooms(
    State(db_pool): State<SqlitePool>,
    State(presence): State<Presence>,
    AuthUser(user): AuthUser,
) -> AppResult<ApiResponse> {
    let rooms = ChatRoom::for_user(&db_pool, user.id).await?;

    let mut dir = Directory::new(&db_pool, &presence);
    let mut views = Vec::with_capacity(rooms.len());
    for room in rooms {
        views.push(RoomView::build(&mut dir, room, user.id).await?);
    }
    res::ok("fetch your data successfully", views)
}

#[derive(Deserialize)]
pub(crate) struct NewRoom {
    target_user_id: Option<Value>,
}

/// Accepts `7` as well as `"7"`.
fn parse_id(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn create_room(
    State(db_pool): State<SqlitePool>,
    State(presence): State<Presence>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<NewRoom>,
) -> AppResult<ApiResponse> {
    let Some(target_id) = parse_id(body.target_user_id.as_ref()) else {
        return Err(AppError::bad_request("target_user_id is required"));
    };
    let Some(target) = User::by_id(&db_pool, target_id).await? else {
        return res::sorry("User");
    };

    let (customer, professional) = match (user.user_type, target.user_type) {
        (Some(UserType::Customer), Some(UserType::Professional)) => (user.id, target.id),
        (Some(UserType::Professional), Some(UserType::Customer)) => (target.id, user.id),
        _ => return Err(AppError::bad_request("Invalid user roles for chat creation")),
    };

    let now = db::now();
    let inserted = sqlx::query(
        "INSERT INTO chat_rooms (customer_id,professional_id,created_at,updated_at) VALUES (?,?,?,?) \
         ON CONFLICT (customer_id,professional_id) DO NOTHING",
    )
    .bind(customer)
    .bind(professional)
    .bind(now)
    .bind(now)
    .execute(&db_pool)
    .await?
    .rows_affected();

    let room: ChatRoom = sqlx::query_as("SELECT * FROM chat_rooms WHERE customer_id=? AND professional_id=?")
        .bind(customer)
        .bind(professional)
        .fetch_one(&db_pool)
        .await?;

    let mut dir = Directory::new(&db_pool, &presence);
    let view = RoomView::build(&mut dir, room, user.id).await?;
    if inserted == 0 {
        return res::ok("Chat Room already exists", view);
    }

    tracing::info!(room_id = view.id, customer, professional, "chat room created");
    res::created("Chat Room created successfully", view)
}

#[debug_handler(state = AppState)]
pub(crate) async fn get_room(
    PathParam(room_id): PathParam<i64>,
    State(db_pool): State<SqlitePool>,
    State(presence): State<Presence>,
    AuthUser(user): AuthUser,
) -> AppResult<ApiResponse> {
    let room = ChatRoom::for_member(&db_pool, room_id, user.id, "You are not a member of this chat").await?;
    let mut dir = Directory::new(&db_pool, &presence);
    res::ok("Your request Accepted", RoomView::build(&mut dir, room, user.id).await?)
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_room(
    PathParam(room_id): PathParam<i64>,
    State(db_pool): State<SqlitePool>,
    AuthUser(user): AuthUser,
) -> AppResult<ApiResponse> {
    let room = ChatRoom::for_member(&db_pool, room_id, user.id, "You are not a member of this chat").await?;

    // messages go with it (ON DELETE CASCADE)
    sqlx::query("DELETE FROM chat_rooms WHERE id=?")
        .bind(room.id)
        .execute(&db_pool)
        .await?;

    tracing::info!(room_id = room.id, user_id = user.id, "chat room deleted");
    res::ok("Chat Room deleted successfully", json!({}))
}

#[derive(Deserialize)]
pub(crate) struct PageQuery {
    limit: Option<String>,
    offset: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn room_messages(
    PathParam(room_id): PathParam<i64>,
    Query(page): Query<PageQuery>,
    State(db_pool): State<SqlitePool>,
    State(presence): State<Presence>,
    AuthUser(user): AuthUser,
) -> AppResult<ApiResponse> {
    let room = ChatRoom::for_member(&db_pool, room_id, user.id, "Access denied").await?;

    let limit = page
        .limit
        .and_then(|l| l.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_PAGE)
        .clamp(1, MAX_PAGE);
    let offset = page
        .offset
        .and_then(|o| o.trim().parse::<i64>().ok())
        .unwrap_or(0)
        .max(0);

    let mut window: Vec<Message> = sqlx::query_as("SELECT * FROM messages WHERE room_id=? ORDER BY id DESC LIMIT ? OFFSET ?")
        .bind(room.id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&db_pool)
        .await?;
    window.reverse();

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE room_id=?")
        .bind(room.id)
        .fetch_one(&db_pool)
        .await?;

    let mut dir = Directory::new(&db_pool, &presence);
    let mut results = Vec::with_capacity(window.len());
    for message in window {
        results.push(MessageView::build(&mut dir, message).await?);
    }
    res::ok("fetch your data successfully", json!({ "count": count, "results": results }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn mark_room_read(
    PathParam(room_id): PathParam<i64>,
    State(db_pool): State<SqlitePool>,
    AuthUser(user): AuthUser,
) -> AppResult<ApiResponse> {
    let room = ChatRoom::for_member(&db_pool, room_id, user.id, "You are not a member of this chat").await?;
    let updated = mark_read(&db_pool, user.id, Some(room.id), None).await?;
    res::ok("Messages marked as read", json!({ "marked_read": updated }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn unread_summary(
    State(db_pool): State<SqlitePool>,
    AuthUser(user): AuthUser,
) -> AppResult<ApiResponse> {
    let mut rooms = Vec::new();
    let mut total = 0;
    for room in ChatRoom::for_user(&db_pool, user.id).await? {
        let unread = unread_in_room(&db_pool, room.id, user.id).await?;
        if unread == 0 {
            continue;
        }
        let other_user = match room.other(user.id) {
            Some(id) => User::by_id(&db_pool, id).await?.map(|u| u.email),
            None => None,
        };
        total += unread;
        rooms.push(json!({ "room_id": room.id, "unread_count": unread, "other_user": other_user }));
    }

    Ok(ApiResponse::new(
        StatusCode::OK,
        "fetch your data successfully",
        json!({ "total_unread": total, "rooms": rooms }),
    ))
}
