//! Database row types — these map directly to SQLite rows.
//! Distinct from the parley-types API models to keep the storage layer
//! independent of the wire format.

use parley_types::models::FriendshipStatus;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub discriminator: u16,
    pub avatar: Option<String>,
    pub password: String,
    pub created_at: String,
}

pub struct FriendshipRow {
    pub user_id: String,
    pub friend_id: String,
    pub status: Option<FriendshipStatus>,
    pub channel_id: Option<String>,
    pub active: Option<bool>,
}

pub struct ChannelRow {
    pub id: String,
    pub name: String,
    pub is_group: bool,
    pub created_at: String,
}

pub struct ChatBucketRow {
    pub id: String,
    pub channel_id: String,
    pub bucket_seq: u32,
    pub start_time: String,
    pub end_time: String,
}

pub struct ChatMessageRow {
    pub id: String,
    pub bucket_id: String,
    pub sender_id: String,
    pub content: Option<String>,
    pub timestamp: String,
    pub last_modified: String,
}
