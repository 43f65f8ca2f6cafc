use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket, rejection::WebSocketUpgradeRejection},
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tokio::sync::{broadcast::error::RecvError, mpsc};

use crate::{
    AppResult, AppState,
    auth::{SocketUser, User},
    channels::{ChannelLayer, chat_group},
    presence::Presence,
    res::PathParam,
};

use super::{
    model::ChatRoom,
    msg::{self, MAX_MESSAGE_LENGTH},
};

/// Everything one room socket needs after the upgrade.
#[derive(Clone)]
pub struct ChatSocket {
    pub db_pool: SqlitePool,
    pub channels: ChannelLayer,
    pub presence: Presence,
    pub room: ChatRoom,
    pub user: User,
}

fn error_frame(code: &str) -> Value {
    json!({ "type": "error", "message": code })
}

/// Membership is settled before the upgrade so refusals are plain HTTP answers.
#[debug_handler(state = AppState)]
pub async fn chat_ws(
    PathParam(room_id): PathParam<i64>,
    State(db_pool): State<SqlitePool>,
    State(channels): State<ChannelLayer>,
    State(presence): State<Presence>,
    SocketUser(user): SocketUser,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> AppResult<Response> {
    let room = ChatRoom::for_member(&db_pool, room_id, user.id, "You are not a member of this chat").await?;
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let ctx = ChatSocket { db_pool, channels, presence, room, user };
    Ok(ws.on_upgrade(async move |socket| run_socket(socket, ctx).await))
}

async fn run_socket(socket: WebSocket, ctx: ChatSocket) {
    let group = chat_group(ctx.room.id);
    let mut rx = ctx.channels.group_add(&group).await;
    ctx.presence.touch(ctx.user.id).await;
    tracing::info!(room_id = ctx.room.id, user_id = ctx.user.id, "chat socket connected");

    let (mut sender, mut receiver) = socket.split();
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(16);

    let mut send_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                broadcast = rx.recv() => match broadcast {
                    Ok(frame) => frame,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "chat socket lagging");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(frame) => frame,
                    None => break,
                },
            };
            if sender.send(WsMessage::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_ctx = ctx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let text = match msg {
                WsMessage::Text(text) => text,
                WsMessage::Close(_) => break,
                _ => continue,
            };
            if let Some(reply) = handle_frame(&recv_ctx, text.as_str()).await {
                if reply_tx.send(reply.to_string()).await.is_err() {
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    };
    // let the aborted task drop its receiver before the group is checked
    let _ = send_task.await;
    let _ = recv_task.await;

    ctx.channels.group_discard(&group).await;
    ctx.presence.seen(ctx.user.id).await;
    tracing::info!(room_id = ctx.room.id, user_id = ctx.user.id, "chat socket closed");
}

fn message_ids(value: Option<&Value>) -> Option<Vec<i64>> {
    match value {
        None => Some(Vec::new()),
        Some(Value::Array(items)) => items.iter().map(Value::as_i64).collect(),
        Some(_) => None,
    }
}

/// Handles one inbound frame. Returns the frame to send back to this socket
/// only; chat messages reach the sender through the room broadcast instead.
pub async fn handle_frame(ctx: &ChatSocket, text: &str) -> Option<Value> {
    let Ok(data) = serde_json::from_str::<Value>(text) else {
        return Some(error_frame("invalid_json"));
    };

    match data.get("type").and_then(Value::as_str).unwrap_or("chat_message") {
        "ping" => {
            ctx.presence.touch(ctx.user.id).await;
            None
        }
        "chat_message" => {
            let content = data.get("message").and_then(Value::as_str).unwrap_or_default().trim();
            if content.is_empty() {
                return Some(error_frame("empty_message"));
            }
            if content.chars().count() > MAX_MESSAGE_LENGTH {
                return Some(error_frame("message_too_long"));
            }
            match msg::send_msg(&ctx.db_pool, &ctx.channels, &ctx.room, &ctx.user, content).await {
                Ok(_) => None,
                Err(e) => {
                    tracing::error!(room_id = ctx.room.id, error = %e, "failed to save message");
                    Some(error_frame("save_failed"))
                }
            }
        }
        "mark_read" => {
            let Some(ids) = message_ids(data.get("message_ids")) else {
                return Some(error_frame("invalid_message_ids"));
            };
            match msg::mark_read(&ctx.db_pool, ctx.user.id, Some(ctx.room.id), Some(&ids)).await {
                Ok(updated) => Some(json!({ "type": "mark_read_ack", "message_ids": ids, "updated": updated })),
                Err(e) => {
                    tracing::error!(room_id = ctx.room.id, error = %e, "failed to mark messages read");
                    Some(error_frame("mark_read_failed"))
                }
            }
        }
        "read_receipt" => match msg::mark_read(&ctx.db_pool, ctx.user.id, Some(ctx.room.id), None).await {
            Ok(updated) => Some(json!({ "type": "read_receipt", "status": "success", "updated": updated })),
            Err(e) => {
                tracing::error!(room_id = ctx.room.id, error = %e, "failed to mark room read");
                Some(error_frame("mark_read_failed"))
            }
        },
        _ => Some(error_frame("unknown_type")),
    }
}
