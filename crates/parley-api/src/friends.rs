use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use uuid::Uuid;

use parley_db::models::{FriendshipRow, UserRow};
use parley_gateway::dispatcher::Room;
use parley_types::api::{Claims, FriendResponse, UpdateFriendRequest};
use parley_types::events::GatewayEvent;
use parley_types::models::FriendshipStatus;

use crate::auth::AppState;
use crate::channels::{channel_view, participant_view};
use crate::error::ApiError;
use crate::parse_uuid;
use crate::relation::{self, Denial, Effect, RelationOp};

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<FriendResponse>>, ApiError> {
    let rows = state.db.friendships_for(&claims.sub.to_string())?;

    let friend_ids: Vec<String> = rows.iter().map(|r| r.friend_id.clone()).collect();
    let users = state.db.users_by_ids(&friend_ids)?;

    let by_friend: HashMap<&str, &FriendshipRow> =
        rows.iter().map(|r| (r.friend_id.as_str(), r)).collect();

    let friends = users
        .iter()
        .map(|user| friend_view(by_friend.get(user.id.as_str()).copied(), user))
        .collect();

    Ok(Json(friends))
}

pub async fn get_friend(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((username, discriminator)): Path<(String, u16)>,
) -> Result<Json<FriendResponse>, ApiError> {
    let (caller, target) = lookup_pair(&state, &claims, &username, discriminator)?;
    let row = state.db.friendship(&caller.id, &target.id)?;
    Ok(Json(friend_view(row.as_ref(), &target)))
}

/// Send a friend request, or accept one if the target already sent theirs.
pub async fn add_friend(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((username, discriminator)): Path<(String, u16)>,
) -> Result<Json<FriendResponse>, ApiError> {
    let (caller, target) = lookup_pair(&state, &claims, &username, discriminator)?;
    run_transition(&state, &caller, &target, RelationOp::Add).await
}

/// PUT with an explicit target status; only FRIEND (add/accept) and BLOCKED
/// are reachable this way.
pub async fn update_friend(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((username, discriminator)): Path<(String, u16)>,
    Json(req): Json<UpdateFriendRequest>,
) -> Result<Json<FriendResponse>, ApiError> {
    let op = match req.status {
        FriendshipStatus::Friend => RelationOp::Add,
        FriendshipStatus::Blocked => RelationOp::Block,
        _ => {
            return Err(ApiError::Validation(
                "This method only supports FRIEND and BLOCKED".into(),
            ));
        }
    };

    let (caller, target) = lookup_pair(&state, &claims, &username, discriminator)?;
    run_transition(&state, &caller, &target, op).await
}

pub async fn remove_friend(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((username, discriminator)): Path<(String, u16)>,
) -> Result<Json<FriendResponse>, ApiError> {
    let (caller, target) = lookup_pair(&state, &claims, &username, discriminator)?;
    run_transition(&state, &caller, &target, RelationOp::Remove).await
}

fn lookup_pair(
    state: &AppState,
    claims: &Claims,
    username: &str,
    discriminator: u16,
) -> Result<(UserRow, UserRow), ApiError> {
    let caller = state
        .db
        .user_by_id(&claims.sub.to_string())?
        .ok_or_else(|| ApiError::Authentication("Unknown caller".into()))?;

    if username == caller.username && discriminator == caller.discriminator {
        return Err(ApiError::Validation(
            "Username and discriminator must be other user".into(),
        ));
    }

    let target = state
        .db
        .user_by_name(username, discriminator)?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok((caller, target))
}

async fn run_transition(
    state: &AppState,
    caller: &UserRow,
    target: &UserRow,
    op: RelationOp,
) -> Result<Json<FriendResponse>, ApiError> {
    let caller_row = state.db.friendship(&caller.id, &target.id)?;
    let counterpart_row = state.db.friendship(&target.id, &caller.id)?;

    let caller_status = caller_row.as_ref().and_then(|r| r.status);
    let counterpart_status = counterpart_row.as_ref().and_then(|r| r.status);

    let effect = relation::transition(caller_status, counterpart_status, op)
        .map_err(|denial| denial_to_error(denial, caller_status, counterpart_status))?;

    let response = apply_effect(state, caller, target, &caller_row, &counterpart_row, effect).await?;
    Ok(Json(response))
}

fn denial_to_error(
    denial: Denial,
    caller: Option<FriendshipStatus>,
    counterpart: Option<FriendshipStatus>,
) -> ApiError {
    match denial {
        Denial::AlreadyFriends => ApiError::Conflict("Already friends".into()),
        Denial::AlreadyRequested => ApiError::Conflict("Already sent friend request".into()),
        Denial::AlreadyBlocked => ApiError::Conflict("Already blocked".into()),
        Denial::NothingToRemove => ApiError::Validation("Nothing to remove".into()),
        Denial::Forbidden => ApiError::Authorization("Failed to update friendship".into()),
        Denial::InvalidState => ApiError::InvalidState {
            caller,
            counterpart,
        },
    }
}

/// Apply a committed transition: two sequential single-row writes (the pair
/// is intentionally not transactional, see the storage design notes), then
/// fan out to whoever is affected.
async fn apply_effect(
    state: &AppState,
    caller: &UserRow,
    target: &UserRow,
    caller_row: &Option<FriendshipRow>,
    counterpart_row: &Option<FriendshipRow>,
    effect: Effect,
) -> Result<FriendResponse, ApiError> {
    let caller_uuid = parse_uuid(&caller.id);
    let target_uuid = parse_uuid(&target.id);

    match effect {
        Effect::SendRequest => {
            let counterpart_side = state.db.set_friendship_status(
                &target.id,
                &caller.id,
                Some(FriendshipStatus::Requested),
            )?;
            let caller_side = state.db.set_friendship_status(
                &caller.id,
                &target.id,
                Some(FriendshipStatus::Pending),
            )?;

            state
                .dispatcher
                .publish(
                    &[Room::User(target_uuid)],
                    None,
                    GatewayEvent::FriendshipUpdated(friend_view(Some(&counterpart_side), caller)),
                )
                .await;

            Ok(friend_view(Some(&caller_side), target))
        }

        Effect::Accept => {
            // Reuse a channel either side still references from an earlier
            // friendship; only create one the first time around.
            let existing = caller_row
                .as_ref()
                .and_then(|r| r.channel_id.clone())
                .or_else(|| counterpart_row.as_ref().and_then(|r| r.channel_id.clone()));

            let (channel_id, created) = match existing {
                Some(id) => (id, None),
                None => {
                    let id = Uuid::new_v4().to_string();
                    let channel = state.db.create_channel(&id, "", false)?;
                    (id, Some(channel))
                }
            };

            let counterpart_side =
                state
                    .db
                    .set_friendship_accepted(&target.id, &caller.id, &channel_id)?;
            let caller_side =
                state
                    .db
                    .set_friendship_accepted(&caller.id, &target.id, &channel_id)?;

            if let Some(channel) = created {
                let channel_uuid = parse_uuid(&channel.id);

                // Live connections must hear about messages immediately, not
                // only after a reconnect.
                state
                    .dispatcher
                    .join_user(target_uuid, Room::Channel(channel_uuid))
                    .await;
                state
                    .dispatcher
                    .join_user(caller_uuid, Room::Channel(channel_uuid))
                    .await;

                state
                    .dispatcher
                    .publish(
                        &[Room::User(target_uuid)],
                        None,
                        GatewayEvent::NewChannel(channel_view(
                            &channel,
                            vec![participant_view(caller)],
                        )),
                    )
                    .await;
                state
                    .dispatcher
                    .publish(
                        &[Room::User(caller_uuid)],
                        None,
                        GatewayEvent::NewChannel(channel_view(
                            &channel,
                            vec![participant_view(target)],
                        )),
                    )
                    .await;
            }

            state
                .dispatcher
                .publish(
                    &[Room::User(target_uuid)],
                    None,
                    GatewayEvent::FriendshipUpdated(friend_view(Some(&counterpart_side), caller)),
                )
                .await;

            Ok(friend_view(Some(&caller_side), target))
        }

        Effect::Block { reset_counterpart } => {
            if reset_counterpart {
                let counterpart_side =
                    state.db.set_friendship_status(&target.id, &caller.id, None)?;
                state
                    .dispatcher
                    .publish(
                        &[Room::User(target_uuid)],
                        None,
                        GatewayEvent::FriendshipUpdated(friend_view(Some(&counterpart_side), caller)),
                    )
                    .await;
            }

            let caller_side = state.db.set_friendship_status(
                &caller.id,
                &target.id,
                Some(FriendshipStatus::Blocked),
            )?;

            Ok(friend_view(Some(&caller_side), target))
        }

        Effect::Remove { reset_counterpart } => {
            if reset_counterpart {
                let counterpart_side =
                    state.db.set_friendship_status(&target.id, &caller.id, None)?;
                state
                    .dispatcher
                    .publish(
                        &[Room::User(target_uuid)],
                        None,
                        GatewayEvent::FriendshipUpdated(friend_view(Some(&counterpart_side), caller)),
                    )
                    .await;
            }

            let caller_side = state.db.set_friendship_status(&caller.id, &target.id, None)?;

            Ok(friend_view(Some(&caller_side), target))
        }
    }
}

/// One side's view of the edge, joined with the counterpart's profile.
pub(crate) fn friend_view(row: Option<&FriendshipRow>, other: &UserRow) -> FriendResponse {
    FriendResponse {
        friend_id: parse_uuid(&other.id),
        friendship_status: row.and_then(|r| r.status),
        channel_id: row
            .and_then(|r| r.channel_id.as_deref())
            .map(parse_uuid),
        avatar: other.avatar.clone(),
        username: other.username.clone(),
        discriminator: other.discriminator,
    }
}
