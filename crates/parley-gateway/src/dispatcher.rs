use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use parley_types::events::GatewayEvent;

/// A logical fanout target. Connections join their owner's user room plus
/// one room per channel they participate in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    User(Uuid),
    Channel(Uuid),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::User(id) => write!(f, "user:{}", id),
            Room::Channel(id) => write!(f, "channel:{}", id),
        }
    }
}

struct ConnEntry {
    user_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
    rooms: HashSet<Room>,
}

#[derive(Default)]
struct RoomState {
    conns: HashMap<Uuid, ConnEntry>,
    rooms: HashMap<Room, HashSet<Uuid>>,
    user_conns: HashMap<Uuid, HashSet<Uuid>>,
}

/// Tracks all live connections and their room memberships, and delivers
/// events to rooms. Constructed once at startup and handed to every service
/// that publishes; nothing here is persisted — rooms are recomputed from
/// durable state on reconnect.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<RwLock<RoomState>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RoomState::default())),
        }
    }

    /// Register a connection and join all of its initial rooms in one step,
    /// so no event published after this call can be missed. Returns the
    /// connection id and the receiving end of its event queue.
    pub async fn register(
        &self,
        user_id: Uuid,
        rooms: Vec<Room>,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut state = self.inner.write().await;
        for room in &rooms {
            state.rooms.entry(*room).or_default().insert(conn_id);
        }
        state.user_conns.entry(user_id).or_default().insert(conn_id);
        state.conns.insert(
            conn_id,
            ConnEntry {
                user_id,
                tx,
                rooms: rooms.into_iter().collect(),
            },
        );

        (conn_id, rx)
    }

    /// Tear down a connection. Idempotent.
    pub async fn disconnect(&self, conn_id: Uuid) {
        let mut state = self.inner.write().await;
        let Some(entry) = state.conns.remove(&conn_id) else {
            return;
        };

        for room in &entry.rooms {
            if let Some(members) = state.rooms.get_mut(room) {
                members.remove(&conn_id);
                if members.is_empty() {
                    state.rooms.remove(room);
                }
            }
        }

        if let Some(conns) = state.user_conns.get_mut(&entry.user_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                state.user_conns.remove(&entry.user_id);
            }
        }
    }

    /// Add a room to every live connection of a user. Needed when channel
    /// membership changes mid-session: the user may already be connected,
    /// and only reconnecting would otherwise pick up the new room.
    pub async fn join_user(&self, user_id: Uuid, room: Room) {
        let mut state = self.inner.write().await;
        let conn_ids: Vec<Uuid> = state
            .user_conns
            .get(&user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();

        for conn_id in conn_ids {
            if let Some(entry) = state.conns.get_mut(&conn_id) {
                entry.rooms.insert(room);
            }
            state.rooms.entry(room).or_default().insert(conn_id);
        }
    }

    /// Deliver an event exactly once to every connection joined to any of
    /// the `to` rooms, minus connections joined to the `except` room.
    /// Fire-and-forget: closed receivers are skipped.
    pub async fn publish(&self, to: &[Room], except: Option<Room>, event: GatewayEvent) {
        let state = self.inner.read().await;

        let mut targets: HashSet<Uuid> = HashSet::new();
        for room in to {
            if let Some(members) = state.rooms.get(room) {
                targets.extend(members.iter().copied());
            }
        }

        if let Some(room) = except {
            if let Some(excluded) = state.rooms.get(&room) {
                targets.retain(|conn_id| !excluded.contains(conn_id));
            }
        }

        for conn_id in targets {
            if let Some(entry) = state.conns.get(&conn_id) {
                let _ = entry.tx.send(event.clone());
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(user_id: Uuid) -> GatewayEvent {
        GatewayEvent::Ready {
            user_id,
            username: "test".into(),
        }
    }

    #[tokio::test]
    async fn user_room_reaches_every_connection_of_the_user() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (_, mut rx1) = dispatcher.register(user, vec![Room::User(user)]).await;
        let (_, mut rx2) = dispatcher.register(user, vec![Room::User(user)]).await;

        dispatcher
            .publish(&[Room::User(user)], None, ready(user))
            .await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn except_excludes_all_of_the_senders_connections() {
        let dispatcher = Dispatcher::new();
        let sender = Uuid::new_v4();
        let other = Uuid::new_v4();
        let channel = Uuid::new_v4();

        let rooms = |user: Uuid| vec![Room::User(user), Room::Channel(channel)];
        let (_, mut sender_rx1) = dispatcher.register(sender, rooms(sender)).await;
        let (_, mut sender_rx2) = dispatcher.register(sender, rooms(sender)).await;
        let (_, mut other_rx) = dispatcher.register(other, rooms(other)).await;

        dispatcher
            .publish(
                &[Room::Channel(channel)],
                Some(Room::User(sender)),
                ready(sender),
            )
            .await;

        assert!(sender_rx1.try_recv().is_err());
        assert!(sender_rx2.try_recv().is_err());
        assert!(other_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn overlapping_rooms_deliver_exactly_once() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let channel = Uuid::new_v4();

        let (_, mut rx) = dispatcher
            .register(user, vec![Room::User(user), Room::Channel(channel)])
            .await;

        dispatcher
            .publish(&[Room::User(user), Room::Channel(channel)], None, ready(user))
            .await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn join_user_adds_room_to_live_connections() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let channel = Uuid::new_v4();

        let (_, mut rx) = dispatcher.register(user, vec![Room::User(user)]).await;

        dispatcher
            .publish(&[Room::Channel(channel)], None, ready(user))
            .await;
        assert!(rx.try_recv().is_err());

        dispatcher.join_user(user, Room::Channel(channel)).await;

        dispatcher
            .publish(&[Room::Channel(channel)], None, ready(user))
            .await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn disconnect_stops_delivery() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (conn_id, mut rx) = dispatcher.register(user, vec![Room::User(user)]).await;
        dispatcher.disconnect(conn_id).await;

        dispatcher
            .publish(&[Room::User(user)], None, ready(user))
            .await;
        assert!(rx.try_recv().is_err());
    }
}
