use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use parley_types::models::FriendshipStatus;

/// Error taxonomy for every exposed operation. Validation, authentication,
/// authorization, not-found and conflict errors describe misuse and are
/// reported back verbatim; `InvalidState` and `Internal` indicate a
/// data-consistency bug — they are logged with their full context and the
/// caller only sees a generic body. The request fails; the process does not.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// The two sides of a friendship pair disagree in a way the transition
    /// table does not cover. Carries both statuses for diagnosis.
    #[error("Friendship status is in an invalid state")]
    InvalidState {
        caller: Option<FriendshipStatus>,
        counterpart: Option<FriendshipStatus>,
    },

    #[error("Something went wrong")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Authentication(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::Authorization(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::InvalidState {
                caller,
                counterpart,
            } => {
                error!(
                    caller_status = ?caller,
                    counterpart_status = ?counterpart,
                    "Friendship pair is in an invalid state"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong".to_string(),
                )
            }
            ApiError::Internal(err) => {
                error!("Internal error: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong".to_string(),
                )
            }
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

/// spawn_blocking join failures have no recovery path.
pub(crate) fn join_error(e: tokio::task::JoinError) -> ApiError {
    ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {}", e))
}
