use crate::ws::hub::Hub;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Drive one subscriber connection: register with the hub, pump queued
/// events to the socket, and unregister exactly once on the way out.
pub async fn handle_connection(socket: WebSocket, hub: Arc<Hub>) {
    let (connection_id, mut events) = hub.register();
    info!(connection_id = %connection_id, "WebSocket client connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Pump hub events to the socket, preserving queue order
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(j) => j,
                Err(e) => {
                    error!(error = %e, "failed to serialize event");
                    continue;
                }
            };
            if let Err(e) = ws_sender.send(Message::Text(json.into())).await {
                debug!(error = %e, "send to WebSocket failed");
                break;
            }
        }
    });

    // Drain the client side only to notice close and transport errors;
    // subscribers have nothing to say to the relay
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    debug!("client closed connection");
                    break;
                }
                Ok(Message::Text(_)) | Ok(Message::Binary(_)) => {
                    warn!("ignoring unexpected client frame");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Axum answers pings itself
                }
                Err(e) => {
                    debug!(error = %e, "WebSocket transport error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Sole removal point for this connection's registry entry
    hub.unregister(connection_id);
    info!(connection_id = %connection_id, "WebSocket client disconnected");
}
