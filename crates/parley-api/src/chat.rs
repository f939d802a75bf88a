use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use parley_db::models::{ChatBucketRow, ChatMessageRow};
use parley_gateway::dispatcher::Room;
use parley_types::api::{ChatBucketResponse, ChatMessageResponse, Claims, SendChatRequest};
use parley_types::events::GatewayEvent;
use parley_types::models::FriendshipStatus;

use crate::auth::AppState;
use crate::channels::{require_channel, require_participant};
use crate::error::{ApiError, join_error};
use crate::{parse_time, parse_uuid};

const MAX_CONTENT_CHARS: usize = 2000;

/// Latest bucket for a channel, created empty at sequence 0 when the
/// channel has no history yet. Clients use this to sync after (re)connect.
pub async fn get_latest_bucket(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(channel_id): Path<Uuid>,
) -> Result<Json<ChatBucketResponse>, ApiError> {
    let channel = require_channel(&state, &channel_id.to_string())?;
    require_participant(&state, &claims.sub.to_string(), &channel)?;

    // Run blocking DB work off the async runtime
    let db = state.db.clone();
    let (bucket, messages) =
        tokio::task::spawn_blocking(move || db.latest_chat_bucket_or_create(&channel.id))
            .await
            .map_err(join_error)??;

    Ok(Json(bucket_view(&bucket, &messages)))
}

/// Historical bucket lookup by sequence number — the pagination cursor.
pub async fn get_bucket(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((channel_id, bucket_seq)): Path<(Uuid, u32)>,
) -> Result<Json<ChatBucketResponse>, ApiError> {
    let channel = require_channel(&state, &channel_id.to_string())?;
    require_participant(&state, &claims.sub.to_string(), &channel)?;

    let db = state.db.clone();
    let found = tokio::task::spawn_blocking(move || db.chat_bucket_by_seq(&channel.id, bucket_seq))
        .await
        .map_err(join_error)??;

    let (bucket, messages) =
        found.ok_or_else(|| ApiError::NotFound("Chat bucket not found".into()))?;

    Ok(Json(bucket_view(&bucket, &messages)))
}

pub async fn post_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(channel_id): Path<Uuid>,
    Json(req): Json<SendChatRequest>,
) -> Result<(StatusCode, Json<ChatBucketResponse>), ApiError> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::Validation("Content must not be empty".into()));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ApiError::Validation(format!(
            "Content must be at most {} characters",
            MAX_CONTENT_CHARS
        )));
    }

    let user_id = claims.sub.to_string();
    let channel = require_channel(&state, &channel_id.to_string())?;

    // Direct channels demand a live FRIEND status, not just the channel
    // reference a past friendship left behind.
    if channel.is_group {
        if !state.db.is_channel_member(&channel.id, &user_id)? {
            return Err(ApiError::Authorization(
                "User is not participant of channel".into(),
            ));
        }
    } else {
        let row = state
            .db
            .friendship_by_channel(&user_id, &channel.id)?
            .ok_or_else(|| ApiError::Authorization("User is not participant of channel".into()))?;
        if row.status != Some(FriendshipStatus::Friend) {
            return Err(ApiError::Authorization(
                "User is not friend with this friend".into(),
            ));
        }
    }

    let db = state.db.clone();
    let sender_id = user_id.clone();
    let (bucket, message) =
        tokio::task::spawn_blocking(move || db.append_chat_message(&channel.id, &sender_id, &content))
            .await
            .map_err(join_error)??;

    // The bucket view carries only the new message; everyone else in the
    // channel gets it, the sender's own connections do not.
    let response = bucket_view(&bucket, std::slice::from_ref(&message));
    state
        .dispatcher
        .publish(
            &[Room::Channel(channel_id)],
            Some(Room::User(claims.sub)),
            GatewayEvent::NewChannelMessage(response.clone()),
        )
        .await;

    Ok((StatusCode::CREATED, Json(response)))
}

fn bucket_view(bucket: &ChatBucketRow, messages: &[ChatMessageRow]) -> ChatBucketResponse {
    ChatBucketResponse {
        channel_id: parse_uuid(&bucket.channel_id),
        bucket_seq: bucket.bucket_seq,
        messages: messages.iter().map(message_view).collect(),
    }
}

fn message_view(message: &ChatMessageRow) -> ChatMessageResponse {
    ChatMessageResponse {
        id: parse_uuid(&message.id),
        timestamp: parse_time(&message.timestamp),
        sender_id: parse_uuid(&message.sender_id),
        content: message.content.clone(),
        last_modified: parse_time(&message.last_modified),
    }
}
