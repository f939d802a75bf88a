use std::collections::HashSet;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use parley_db::models::{ChannelRow, UserRow};
use parley_gateway::dispatcher::Room;
use parley_types::api::{
    ChannelResponse, Claims, CreateChannelRequest, ParticipantResponse,
};
use parley_types::events::GatewayEvent;
use parley_types::models::FriendshipStatus;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::friends::friend_view;
use crate::{parse_time, parse_uuid};

const MAX_PARTICIPANTS: usize = 9;

pub async fn list_channels(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ChannelResponse>>, ApiError> {
    let user_id = claims.sub.to_string();

    let friendships = state.db.friendships_for(&user_id)?;
    let direct: Vec<_> = friendships
        .iter()
        .filter(|r| r.active == Some(true) && r.channel_id.is_some())
        .collect();

    let mut channel_ids: Vec<String> = direct
        .iter()
        .filter_map(|r| r.channel_id.clone())
        .collect();
    channel_ids.extend(state.db.group_channel_ids(&user_id)?);

    let channels = state.db.channels_by_ids(&channel_ids)?;

    let friend_ids: Vec<String> = direct.iter().map(|r| r.friend_id.clone()).collect();
    let friends = state.db.users_by_ids(&friend_ids)?;

    let mut responses = Vec::with_capacity(channels.len());
    for channel in &channels {
        let participants = if channel.is_group {
            group_participants(&state, channel, &user_id)?
        } else {
            let friend_id = direct
                .iter()
                .find(|r| r.channel_id.as_deref() == Some(channel.id.as_str()))
                .map(|r| r.friend_id.as_str());
            friends
                .iter()
                .filter(|u| Some(u.id.as_str()) == friend_id)
                .map(participant_view)
                .collect()
        };
        responses.push(channel_view(channel, participants));
    }

    Ok(Json(responses))
}

pub async fn get_channel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(channel_id): Path<Uuid>,
) -> Result<Json<ChannelResponse>, ApiError> {
    let user_id = claims.sub.to_string();
    let channel = require_channel(&state, &channel_id.to_string())?;
    require_participant(&state, &user_id, &channel)?;

    let participants = if channel.is_group {
        group_participants(&state, &channel, &user_id)?
    } else {
        let row = state
            .db
            .friendship_by_channel(&user_id, &channel.id)?
            .ok_or_else(|| ApiError::Authorization("User is not participant of channel".into()))?;
        state
            .db
            .users_by_ids(&[row.friend_id])?
            .iter()
            .map(participant_view)
            .collect()
    };

    Ok(Json(channel_view(&channel, participants)))
}

/// One participant creates a direct channel with a friend; several create a
/// group channel. Direct channels also stamp the channel onto both sides of
/// the friendship edge.
pub async fn create_channel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<(StatusCode, Json<ChannelResponse>), ApiError> {
    if req.participants.is_empty() || req.participants.len() > MAX_PARTICIPANTS {
        return Err(ApiError::Validation(format!(
            "Participants must contain between 1 and {} users",
            MAX_PARTICIPANTS
        )));
    }
    let unique: HashSet<&Uuid> = req.participants.iter().collect();
    if unique.len() != req.participants.len() {
        return Err(ApiError::Validation("Participants must be unique".into()));
    }
    if req.participants.contains(&claims.sub) {
        return Err(ApiError::Validation(
            "Participants cannot contain user himself or herself".into(),
        ));
    }

    let caller = state
        .db
        .user_by_id(&claims.sub.to_string())?
        .ok_or_else(|| ApiError::Authentication("Unknown caller".into()))?;

    let participant_ids: Vec<String> = req.participants.iter().map(Uuid::to_string).collect();
    let participants = state.db.users_by_ids(&participant_ids)?;
    if participants.len() != participant_ids.len() {
        return Err(ApiError::NotFound("One or more participants not found".into()));
    }

    if req.participants.len() == 1 {
        create_direct_channel(&state, &caller, &participants[0], &req.name).await
    } else {
        create_group_channel(&state, &caller, &participants, &req.name).await
    }
}

async fn create_direct_channel(
    state: &AppState,
    caller: &UserRow,
    friend: &UserRow,
    name: &str,
) -> Result<(StatusCode, Json<ChannelResponse>), ApiError> {
    let caller_side = state.db.friendship(&caller.id, &friend.id)?;

    if caller_side.as_ref().and_then(|r| r.channel_id.as_deref()).is_some() {
        return Err(ApiError::Conflict(
            "Private channel with this friend already exist".into(),
        ));
    }
    if caller_side.as_ref().and_then(|r| r.status) == Some(FriendshipStatus::Blocked) {
        return Err(ApiError::Authorization(
            "Cannot create private channel with blocked friend".into(),
        ));
    }

    let channel = state
        .db
        .create_channel(&Uuid::new_v4().to_string(), name, false)?;

    let counterpart_side = state
        .db
        .attach_direct_channel(&friend.id, &caller.id, &channel.id)?;
    let caller_side = state
        .db
        .attach_direct_channel(&caller.id, &friend.id, &channel.id)?;

    let caller_uuid = parse_uuid(&caller.id);
    let friend_uuid = parse_uuid(&friend.id);
    let channel_uuid = parse_uuid(&channel.id);

    state
        .dispatcher
        .join_user(friend_uuid, Room::Channel(channel_uuid))
        .await;
    state
        .dispatcher
        .join_user(caller_uuid, Room::Channel(channel_uuid))
        .await;

    state
        .dispatcher
        .publish(
            &[Room::User(friend_uuid)],
            None,
            GatewayEvent::NewChannel(channel_view(&channel, vec![participant_view(caller)])),
        )
        .await;
    state
        .dispatcher
        .publish(
            &[Room::User(friend_uuid)],
            None,
            GatewayEvent::FriendshipUpdated(friend_view(Some(&counterpart_side), caller)),
        )
        .await;
    // Other sessions of the caller learn about the channel the same way.
    state
        .dispatcher
        .publish(
            &[Room::User(caller_uuid)],
            None,
            GatewayEvent::FriendshipUpdated(friend_view(Some(&caller_side), friend)),
        )
        .await;

    let response = channel_view(&channel, vec![participant_view(friend)]);
    Ok((StatusCode::CREATED, Json(response)))
}

async fn create_group_channel(
    state: &AppState,
    caller: &UserRow,
    participants: &[UserRow],
    name: &str,
) -> Result<(StatusCode, Json<ChannelResponse>), ApiError> {
    for user in participants {
        let status = state
            .db
            .friendship(&caller.id, &user.id)?
            .and_then(|r| r.status);
        if status != Some(FriendshipStatus::Friend) {
            return Err(ApiError::Validation(
                "One or more participants is not friend".into(),
            ));
        }
    }

    let channel = state
        .db
        .create_channel(&Uuid::new_v4().to_string(), name, true)?;

    let mut member_ids: Vec<String> = participants.iter().map(|u| u.id.clone()).collect();
    member_ids.push(caller.id.clone());
    state.db.add_channel_members(&channel.id, &member_ids)?;

    let channel_uuid = parse_uuid(&channel.id);

    // Every member (the caller included) gets subscribed live and told
    // about the channel, each with the member list minus themselves.
    let mut everyone: Vec<&UserRow> = participants.iter().collect();
    everyone.push(caller);

    for member in &everyone {
        let member_uuid = parse_uuid(&member.id);
        state
            .dispatcher
            .join_user(member_uuid, Room::Channel(channel_uuid))
            .await;

        let others = everyone
            .iter()
            .copied()
            .filter(|u| u.id != member.id)
            .map(participant_view)
            .collect();
        state
            .dispatcher
            .publish(
                &[Room::User(member_uuid)],
                None,
                GatewayEvent::NewChannel(channel_view(&channel, others)),
            )
            .await;
    }

    let response = channel_view(
        &channel,
        participants.iter().map(participant_view).collect(),
    );
    Ok((StatusCode::CREATED, Json(response)))
}

pub(crate) fn require_channel(state: &AppState, channel_id: &str) -> Result<ChannelRow, ApiError> {
    state
        .db
        .channel_by_id(channel_id)?
        .ok_or_else(|| ApiError::NotFound("Channel not found".into()))
}

/// Group channels authorize by membership, direct channels by the caller
/// holding a friendship edge that references the channel.
pub(crate) fn require_participant(
    state: &AppState,
    user_id: &str,
    channel: &ChannelRow,
) -> Result<(), ApiError> {
    let joined = if channel.is_group {
        state.db.is_channel_member(&channel.id, user_id)?
    } else {
        state.db.friendship_by_channel(user_id, &channel.id)?.is_some()
    };

    if !joined {
        return Err(ApiError::Authorization(
            "User is not participant of channel".into(),
        ));
    }
    Ok(())
}

fn group_participants(
    state: &AppState,
    channel: &ChannelRow,
    exclude_user_id: &str,
) -> Result<Vec<ParticipantResponse>, ApiError> {
    let member_ids: Vec<String> = state
        .db
        .channel_member_ids(&channel.id)?
        .into_iter()
        .filter(|id| id != exclude_user_id)
        .collect();

    Ok(state
        .db
        .users_by_ids(&member_ids)?
        .iter()
        .map(participant_view)
        .collect())
}

pub(crate) fn channel_view(
    channel: &ChannelRow,
    participants: Vec<ParticipantResponse>,
) -> ChannelResponse {
    ChannelResponse {
        id: parse_uuid(&channel.id),
        name: channel.name.clone(),
        is_group: channel.is_group,
        date_created: parse_time(&channel.created_at),
        participants,
    }
}

pub(crate) fn participant_view(user: &UserRow) -> ParticipantResponse {
    ParticipantResponse {
        id: parse_uuid(&user.id),
        avatar: user.avatar.clone(),
        username: user.username.clone(),
        discriminator: user.discriminator,
    }
}
