use std::sync::Arc;

use uuid::Uuid;

use parley_api::auth::{AppState, AppStateInner};
use parley_db::Database;
use parley_gateway::dispatcher::Dispatcher;
use parley_types::api::Claims;

pub fn test_state() -> AppState {
    Arc::new(AppStateInner {
        db: Arc::new(Database::open_in_memory().expect("in-memory db")),
        jwt_secret: "test-secret".into(),
        dispatcher: Dispatcher::new(),
    })
}

/// Insert a user and hand back the claims a verified request would carry.
pub fn seed_user(state: &AppState, username: &str, discriminator: u16) -> Claims {
    let id = Uuid::new_v4();
    state
        .db
        .create_user(&id.to_string(), username, discriminator, None, "hash")
        .expect("create user");
    Claims {
        sub: id,
        username: username.into(),
        exp: 0,
    }
}
