use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::FriendshipStatus;

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the WebSocket upgrade
/// authentication. Canonical definition lives here to avoid duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub username: String,
    pub discriminator: u16,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub discriminator: u16,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub discriminator: u16,
    pub token: String,
}

// -- Friends --

/// The caller's view of one friendship edge, joined with the counterpart's
/// profile. Also the payload of the `friendshipUpdated` gateway event, where
/// it carries the *receiver's* view instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendResponse {
    pub friend_id: Uuid,
    pub friendship_status: Option<FriendshipStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<Uuid>,
    pub avatar: Option<String>,
    pub username: String,
    pub discriminator: u16,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateFriendRequest {
    pub status: FriendshipStatus,
}

// -- Channels --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantResponse {
    pub id: Uuid,
    pub avatar: Option<String>,
    pub username: String,
    pub discriminator: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelResponse {
    pub id: Uuid,
    pub name: String,
    pub is_group: bool,
    pub date_created: DateTime<Utc>,
    /// Other participants — the receiver is never listed.
    pub participants: Vec<ParticipantResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChannelRequest {
    /// 1 participant -> direct channel, 2..=9 -> group channel.
    pub participants: Vec<Uuid>,
    #[serde(default)]
    pub name: String,
}

// -- Chat --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendChatRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageResponse {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub sender_id: Uuid,
    /// `None` means the message was redacted.
    pub content: Option<String>,
    pub last_modified: DateTime<Utc>,
}

/// One bucket of a channel's message history. After a successful post this
/// carries only the new message; pagination responses carry the whole bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBucketResponse {
    pub channel_id: Uuid,
    pub bucket_seq: u32,
    pub messages: Vec<ChatMessageResponse>,
}
