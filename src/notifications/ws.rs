use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

use crate::{
    AppState,
    auth::SocketUser,
    channels::{ChannelLayer, user_group},
    presence::Presence,
};

#[debug_handler(state = AppState)]
pub async fn notifications_ws(
    State(channels): State<ChannelLayer>,
    State(presence): State<Presence>,
    SocketUser(user): SocketUser,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let user_id = user.id;
    ws.on_upgrade(async move |socket| run_socket(socket, channels, presence, user_id).await)
}

async fn run_socket(socket: WebSocket, channels: ChannelLayer, presence: Presence, user_id: i64) {
    let group = user_group(user_id);
    let mut rx = channels.group_add(&group).await;
    tracing::info!(user_id, "notification socket connected");

    let (mut sender, mut receiver) = socket.split();

    let mut forward_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(frame) => {
                    if sender.send(WsMessage::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "notification socket lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // inbound frames carry nothing but heartbeats
    let ping_presence = presence.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                WsMessage::Text(text) => {
                    let is_ping = serde_json::from_str::<Value>(text.as_str())
                        .is_ok_and(|v| v.get("type").and_then(Value::as_str) == Some("ping"));
                    if is_ping {
                        ping_presence.touch(user_id).await;
                    }
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut forward_task => recv_task.abort(),
        _ = &mut recv_task => forward_task.abort(),
    };
    let _ = forward_task.await;
    let _ = recv_task.await;

    channels.group_discard(&group).await;
    presence.seen(user_id).await;
    tracing::info!(user_id, "notification socket closed");
}
