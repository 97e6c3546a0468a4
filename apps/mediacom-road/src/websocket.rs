use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::hub::HubHandle;
use crate::signaling::{ClientMessage, ConnectionId, ServerMessage};

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
    State(hub): State<HubHandle>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, hub, remote_addr))
}

/// Drive one connection from accept to teardown
async fn handle_socket(socket: WebSocket, hub: HubHandle, remote_addr: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let connection_id = match hub.connect(tx.clone()).await {
        Ok(id) => id,
        Err(e) => {
            error!("Rejecting connection from {}: {}", remote_addr, e);
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    // Forward queued events to the socket
    let forward_id = connection_id.clone();
    let forward_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    warn!(connection = %forward_id, "failed to encode event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        debug!(connection = %forward_id, "sender task ended");
    });

    debug!(connection = %connection_id, remote = %remote_addr, "websocket connected");

    while let Some(msg_result) = receiver.next().await {
        let msg = match msg_result {
            Ok(m) => m,
            Err(e) => {
                debug!(connection = %connection_id, "websocket error: {}", e);
                break;
            }
        };

        let text = match msg {
            Message::Text(text) => text,
            Message::Binary(data) => match String::from_utf8(data) {
                Ok(text) => text,
                Err(e) => {
                    warn!(connection = %connection_id, "binary frame is not UTF-8: {}", e);
                    let _ = tx.send(ServerMessage::Error {
                        message: format!("Invalid message format: {}", e),
                    });
                    continue;
                }
            },
            Message::Close(_) => {
                debug!(connection = %connection_id, "received close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        if !dispatch(&hub, &connection_id, &text, &tx) {
            break;
        }
    }

    // Clean up on disconnect
    if let Err(e) = hub.disconnect(&connection_id) {
        warn!(connection = %connection_id, "disconnect not delivered: {}", e);
    }
    drop(tx);
    forward_task.abort();

    debug!(connection = %connection_id, "websocket disconnected");
}

/// Parse one frame and hand it to the hub. Returns `false` once the hub is gone.
fn dispatch(
    hub: &HubHandle,
    connection_id: &ConnectionId,
    text: &str,
    tx: &mpsc::UnboundedSender<ServerMessage>,
) -> bool {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => {
            debug!(connection = %connection_id, ?message, "inbound message");
            hub.message(connection_id, message).is_ok()
        }
        Err(e) => {
            warn!(connection = %connection_id, "invalid message: {}", e);
            let _ = tx.send(ServerMessage::Error {
                message: format!("Invalid message format: {}", e),
            });
            true
        }
    }
}
