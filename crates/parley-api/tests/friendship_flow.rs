mod common;

use axum::Extension;
use axum::extract::{Path, State};

use parley_api::error::ApiError;
use parley_api::friends;
use parley_gateway::dispatcher::Room;
use parley_types::api::{Claims, UpdateFriendRequest};
use parley_types::events::GatewayEvent;
use parley_types::models::FriendshipStatus;

use common::{seed_user, test_state};

async fn add(
    state: &parley_api::auth::AppState,
    caller: &Claims,
    username: &str,
    discriminator: u16,
) -> Result<parley_types::api::FriendResponse, ApiError> {
    friends::add_friend(
        State(state.clone()),
        Extension(caller.clone()),
        Path((username.to_string(), discriminator)),
    )
    .await
    .map(|json| json.0)
}

async fn view(
    state: &parley_api::auth::AppState,
    caller: &Claims,
    username: &str,
    discriminator: u16,
) -> parley_types::api::FriendResponse {
    friends::get_friend(
        State(state.clone()),
        Extension(caller.clone()),
        Path((username.to_string(), discriminator)),
    )
    .await
    .expect("get friend")
    .0
}

async fn block(
    state: &parley_api::auth::AppState,
    caller: &Claims,
    username: &str,
    discriminator: u16,
) -> Result<parley_types::api::FriendResponse, ApiError> {
    friends::update_friend(
        State(state.clone()),
        Extension(caller.clone()),
        Path((username.to_string(), discriminator)),
        axum::Json(UpdateFriendRequest {
            status: FriendshipStatus::Blocked,
        }),
    )
    .await
    .map(|json| json.0)
}

async fn remove(
    state: &parley_api::auth::AppState,
    caller: &Claims,
    username: &str,
    discriminator: u16,
) -> Result<parley_types::api::FriendResponse, ApiError> {
    friends::remove_friend(
        State(state.clone()),
        Extension(caller.clone()),
        Path((username.to_string(), discriminator)),
    )
    .await
    .map(|json| json.0)
}

#[tokio::test]
async fn request_then_accept_makes_both_friends_with_one_channel() {
    let state = test_state();
    let ash = seed_user(&state, "ash", 1001);
    let brock = seed_user(&state, "brock", 2002);

    let requested = add(&state, &ash, "brock", 2002).await.unwrap();
    assert_eq!(requested.friendship_status, Some(FriendshipStatus::Pending));
    assert_eq!(requested.channel_id, None);

    let brock_side = view(&state, &brock, "ash", 1001).await;
    assert_eq!(brock_side.friendship_status, Some(FriendshipStatus::Requested));

    let accepted = add(&state, &brock, "ash", 1001).await.unwrap();
    assert_eq!(accepted.friendship_status, Some(FriendshipStatus::Friend));
    let channel = accepted.channel_id.expect("direct channel assigned");

    let ash_side = view(&state, &ash, "brock", 2002).await;
    assert_eq!(ash_side.friendship_status, Some(FriendshipStatus::Friend));
    assert_eq!(ash_side.channel_id, Some(channel));
}

#[tokio::test]
async fn adding_twice_is_a_conflict() {
    let state = test_state();
    let ash = seed_user(&state, "ash", 1001);
    let _brock = seed_user(&state, "brock", 2002);

    add(&state, &ash, "brock", 2002).await.unwrap();
    let second = add(&state, &ash, "brock", 2002).await;
    assert!(matches!(second, Err(ApiError::Conflict(_))));
}

#[tokio::test]
async fn adding_yourself_is_rejected() {
    let state = test_state();
    let ash = seed_user(&state, "ash", 1001);

    let result = add(&state, &ash, "ash", 1001).await;
    assert!(matches!(result, Err(ApiError::Validation(_))));
}

#[tokio::test]
async fn double_block_conflicts_and_never_blocks_both_sides() {
    let state = test_state();
    let ash = seed_user(&state, "ash", 1001);
    let brock = seed_user(&state, "brock", 2002);

    let blocked = block(&state, &ash, "brock", 2002).await.unwrap();
    assert_eq!(blocked.friendship_status, Some(FriendshipStatus::Blocked));

    let again = block(&state, &ash, "brock", 2002).await;
    assert!(matches!(again, Err(ApiError::Conflict(_))));

    // The counterpart sees no relationship, and their own block attempt is
    // denied without revealing the existing block.
    let brock_side = view(&state, &brock, "ash", 1001).await;
    assert_eq!(brock_side.friendship_status, None);

    let brock_blocks = block(&state, &brock, "ash", 1001).await;
    assert!(matches!(brock_blocks, Err(ApiError::Authorization(_))));
}

#[tokio::test]
async fn declining_a_request_resets_both_sides_and_keeps_the_channel() {
    let state = test_state();
    let ash = seed_user(&state, "ash", 1001);
    let brock = seed_user(&state, "brock", 2002);

    // Become friends so a direct channel exists, then unfriend.
    add(&state, &ash, "brock", 2002).await.unwrap();
    let accepted = add(&state, &brock, "ash", 1001).await.unwrap();
    let channel = accepted.channel_id.unwrap();
    remove(&state, &ash, "brock", 2002).await.unwrap();

    // New request, declined by the requester: pending + requested -> none.
    add(&state, &ash, "brock", 2002).await.unwrap();
    let declined = remove(&state, &ash, "brock", 2002).await.unwrap();
    assert_eq!(declined.friendship_status, None);

    let brock_side = view(&state, &brock, "ash", 1001).await;
    assert_eq!(brock_side.friendship_status, None);

    // The old channel is still referenced and gets reused on re-accept.
    add(&state, &brock, "ash", 1001).await.unwrap();
    let reaccepted = add(&state, &ash, "brock", 2002).await.unwrap();
    assert_eq!(reaccepted.channel_id, Some(channel));
}

#[tokio::test]
async fn removing_nothing_is_a_validation_error() {
    let state = test_state();
    let ash = seed_user(&state, "ash", 1001);
    let _brock = seed_user(&state, "brock", 2002);

    let result = remove(&state, &ash, "brock", 2002).await;
    assert!(matches!(result, Err(ApiError::Validation(_))));
}

#[tokio::test]
async fn friend_request_fans_out_to_the_target() {
    let state = test_state();
    let ash = seed_user(&state, "ash", 1001);
    let brock = seed_user(&state, "brock", 2002);

    let (_, mut rx) = state
        .dispatcher
        .register(brock.sub, vec![Room::User(brock.sub)])
        .await;

    add(&state, &ash, "brock", 2002).await.unwrap();

    match rx.try_recv().expect("friendshipUpdated delivered") {
        GatewayEvent::FriendshipUpdated(update) => {
            assert_eq!(update.friend_id, ash.sub);
            assert_eq!(update.friendship_status, Some(FriendshipStatus::Requested));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn accept_announces_the_new_channel_to_live_connections() {
    let state = test_state();
    let ash = seed_user(&state, "ash", 1001);
    let brock = seed_user(&state, "brock", 2002);

    add(&state, &ash, "brock", 2002).await.unwrap();

    // Ash is connected while Brock accepts; the connection only knows its
    // user room at this point.
    let (_, mut rx) = state
        .dispatcher
        .register(ash.sub, vec![Room::User(ash.sub)])
        .await;

    let accepted = add(&state, &brock, "ash", 1001).await.unwrap();
    let channel = accepted.channel_id.unwrap();

    let mut saw_new_channel = false;
    let mut saw_friendship_update = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            GatewayEvent::NewChannel(view) => {
                assert_eq!(view.id, channel);
                assert!(!view.is_group);
                saw_new_channel = true;
            }
            GatewayEvent::FriendshipUpdated(_) => saw_friendship_update = true,
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert!(saw_new_channel);
    // friendshipUpdated goes to the counterpart (Ash) of the accept call
    assert!(saw_friendship_update);

    // The live connection was subscribed to the channel room mid-session.
    state
        .dispatcher
        .publish(
            &[Room::Channel(channel)],
            None,
            GatewayEvent::Ready {
                user_id: ash.sub,
                username: "ash".into(),
            },
        )
        .await;
    assert!(rx.try_recv().is_ok());
}
