mod model;
mod msg;
mod rooms;
mod users;
pub mod ws;

use axum::{Router, routing::{get, patch, post}};

use crate::AppState;

pub use model::{ChatRoom, Directory, Message, MessageView, RoomView, UserBasic};
pub use msg::{MAX_MESSAGE_LENGTH, chat_frame};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms", get(rooms::list_rooms).post(rooms::create_room))
        .route("/rooms/unread-summary", get(rooms::unread_summary))
        .route("/rooms/{room_id}", get(rooms::get_room).delete(rooms::delete_room))
        .route("/rooms/{room_id}/messages", get(rooms::room_messages))
        .route("/rooms/{room_id}/mark-read", post(rooms::mark_room_read))
        .route("/messages", get(msg::list_messages).post(msg::create_message))
        .route("/messages/unread-count", get(msg::unread_count))
        .route("/messages/mark-multiple-read", post(msg::mark_multiple_read))
        .route("/messages/{message_id}/mark-read", patch(msg::mark_message_read))
        .route("/users", get(users::list_users))
}
