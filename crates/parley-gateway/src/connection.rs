use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use parley_db::Database;
use parley_types::events::GatewayEvent;

use crate::dispatcher::{Dispatcher, Room};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a pre-authenticated WebSocket connection. The JWT was already
/// validated at the HTTP upgrade layer, so the connection goes straight to
/// room registration, Ready and the event loop.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: Uuid,
    username: String,
) {
    // Rooms come from durable state: the user's own room plus every active
    // direct or group channel. Joined before Ready is sent so nothing
    // published after registration can be missed.
    let rooms = {
        let db = db.clone();
        let uid = user_id.to_string();
        match tokio::task::spawn_blocking(move || db.active_channel_ids(&uid)).await {
            Ok(Ok(channel_ids)) => {
                let mut rooms = vec![Room::User(user_id)];
                for id in &channel_ids {
                    match id.parse::<Uuid>() {
                        Ok(channel_id) => rooms.push(Room::Channel(channel_id)),
                        Err(e) => warn!("Corrupt channel id '{}' for {}: {}", id, user_id, e),
                    }
                }
                rooms
            }
            Ok(Err(e)) => {
                warn!("Failed to load channels for {}: {}", user_id, e);
                return;
            }
            Err(e) => {
                warn!("spawn_blocking join error: {}", e);
                return;
            }
        }
    };

    let (conn_id, mut user_rx) = dispatcher.register(user_id, rooms).await;
    info!("{} ({}) connected to gateway", username, user_id);

    let (mut sender, mut receiver) = socket.split();

    let ready = GatewayEvent::Ready {
        user_id,
        username: username.clone(),
    };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        dispatcher.disconnect(conn_id).await;
        return;
    }

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward room events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = user_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // The client sends nothing the server acts on; the read side only keeps
    // the heartbeat honest and notices the close frame.
    let username_recv = username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                Message::Text(text) => {
                    warn!(
                        "{} sent an unexpected gateway message: {}",
                        username_recv,
                        text.get(..text.len().min(200)).unwrap_or("<non-utf8 boundary>")
                    );
                }
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.disconnect(conn_id).await;
    info!("{} ({}) disconnected from gateway", username, user_id);
}
