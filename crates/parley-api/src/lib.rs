pub mod auth;
pub mod channels;
pub mod chat;
pub mod error;
pub mod friends;
pub mod middleware;
pub mod relation;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

/// Store ids are written by this crate and should always parse; a corrupt
/// one is logged and replaced with the nil uuid rather than failing the
/// whole response.
pub(crate) fn parse_uuid(raw: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt id '{}' in store: {}", raw, e);
        Uuid::default()
    })
}

pub(crate) fn parse_time(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|e| {
        warn!("Corrupt timestamp '{}' in store: {}", raw, e);
        DateTime::default()
    })
}
