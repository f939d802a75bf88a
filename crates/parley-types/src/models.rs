use serde::{Deserialize, Serialize};

/// One side of a friendship edge. The wire value matches what is stored
/// in the database; "no relationship" is not a variant — it is the absence
/// of a status (`Option::None`), whether the row is missing entirely or
/// its status column is NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FriendshipStatus {
    /// This user sent the friend request and is waiting on the other side.
    Pending,
    /// This user received a friend request they have not answered.
    Requested,
    /// Both sides accepted.
    Friend,
    /// This user blocked the other side.
    Blocked,
}

impl FriendshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Requested => "REQUESTED",
            Self::Friend => "FRIEND",
            Self::Blocked => "BLOCKED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "REQUESTED" => Some(Self::Requested),
            "FRIEND" => Some(Self::Friend),
            "BLOCKED" => Some(Self::Blocked),
            _ => None,
        }
    }
}
