use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use parley_api::auth::{self, AppState, AppStateInner};
use parley_api::middleware::require_auth;
use parley_api::{channels, chat, friends};
use parley_gateway::connection;
use parley_gateway::dispatcher::Dispatcher;
use parley_types::api::Claims;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("PARLEY_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("PARLEY_DB_PATH").unwrap_or_else(|_| "parley.db".into());
    let host = std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PARLEY_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(parley_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let dispatcher = Dispatcher::new();
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret,
        dispatcher,
    });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/friends", get(friends::list_friends))
        .route(
            "/friends/{username}/{discriminator}",
            get(friends::get_friend)
                .post(friends::add_friend)
                .put(friends::update_friend)
                .delete(friends::remove_friend),
        )
        .route(
            "/channels",
            get(channels::list_channels).post(channels::create_channel),
        )
        .route("/channels/{channel_id}", get(channels::get_channel))
        .route(
            "/channels/{channel_id}/chat",
            get(chat::get_latest_bucket).post(chat::post_message),
        )
        .route(
            "/channels/{channel_id}/chat/{bucket_seq}",
            get(chat::get_bucket),
        )
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ))
        .with_state(app_state.clone());

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(app_state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct GatewayAuth {
    token: String,
}

/// The WebSocket handshake authenticates with a `token` query parameter so
/// the connection handler only ever sees a verified identity.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(auth): Query<GatewayAuth>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let token_data = decode::<Claims>(
        &auth.token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let claims = token_data.claims;
    let dispatcher = state.dispatcher.clone();
    let db = state.db.clone();

    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, dispatcher, db, claims.sub, claims.username)
    }))
}
