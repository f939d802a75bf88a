use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{ChannelResponse, ChatBucketResponse, FriendResponse};

/// Events sent over the WebSocket gateway.
///
/// Delivery is fire-and-forget: a client that is offline simply misses the
/// event and re-syncs from the latest chat bucket on reconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum GatewayEvent {
    /// Connection is authenticated and joined to all of its rooms.
    Ready { user_id: Uuid, username: String },

    /// One side of a friendship changed; carries the receiver's view.
    FriendshipUpdated(FriendResponse),

    /// A channel the receiver participates in was created.
    NewChannel(ChannelResponse),

    /// A message was posted; the bucket view carries only the new message.
    /// Never delivered to the sender's own connections.
    NewChannelMessage(ChatBucketResponse),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FriendshipStatus;

    #[test]
    fn events_use_tagged_camel_case_wire_format() {
        let event = GatewayEvent::FriendshipUpdated(FriendResponse {
            friend_id: Uuid::nil(),
            friendship_status: Some(FriendshipStatus::Requested),
            channel_id: None,
            avatar: None,
            username: "ash".into(),
            discriminator: 7,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "friendshipUpdated");
        assert_eq!(json["data"]["friendshipStatus"], "REQUESTED");
        // absent channel id is omitted, not null
        assert!(json["data"].get("channelId").is_none());
    }
}
