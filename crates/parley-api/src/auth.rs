use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode};
use rand::Rng;
use uuid::Uuid;

use parley_db::Database;
use parley_gateway::dispatcher::Dispatcher;
use parley_types::api::{
    Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse,
};

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
}

/// How many random discriminators to try before giving up on a username.
const DISCRIMINATOR_ATTEMPTS: u32 = 10;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::Validation(
            "Username must be between 3 and 32 characters".into(),
        ));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters".into(),
        ));
    }

    // Users are addressed as username#discriminator, so the username itself
    // does not have to be unique — only the combination does.
    let mut discriminator = None;
    for _ in 0..DISCRIMINATOR_ATTEMPTS {
        let candidate: u16 = rand::rng().random_range(0..10_000);
        if !state.db.name_taken(&req.username, candidate)? {
            discriminator = Some(candidate);
            break;
        }
    }
    let discriminator = discriminator
        .ok_or_else(|| ApiError::Conflict("Failed to generate discriminator".into()))?;

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hash: {}", e)))?
        .to_string();

    let user_id = Uuid::new_v4();
    state.db.create_user(
        &user_id.to_string(),
        &req.username,
        discriminator,
        req.avatar.as_deref(),
        &password_hash,
    )?;

    let token = create_token(&state.jwt_secret, user_id, &req.username)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            username: req.username,
            discriminator,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .db
        .user_by_name(&req.username, req.discriminator)?
        .ok_or_else(|| ApiError::Authentication("Invalid credentials".into()))?;

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored password hash: {}", e)))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Authentication("Invalid credentials".into()))?;

    let user_id = crate::parse_uuid(&user.id);
    let token = create_token(&state.jwt_secret, user_id, &user.username)?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        discriminator: user.discriminator,
        token,
    }))
}

fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
