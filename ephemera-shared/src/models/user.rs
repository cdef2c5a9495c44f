use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Author, Timestamp};

/// A chat identity as stored by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Unique identifier for the user.
    pub id: Uuid,

    /// Unique display name.
    pub username: String,

    /// Operator identities are never removed by inactive-user cleanup.
    #[serde(default)]
    pub is_op: bool,

    /// When the user was created.
    pub created_at: Timestamp,

    /// Last heartbeat or registration touch.
    pub last_active: Timestamp,
}

impl User {
    /// The author identity used when sending as this user.
    #[must_use]
    pub fn author(&self) -> Author {
        Author {
            id: self.id,
            username: self.username.clone(),
        }
    }
}

/// Request body for `POST /api/users`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterUserRequest {
    /// Requested display name. An existing user with this name is touched instead.
    pub username: String,
}

/// Response body for `GET /api/users/online`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OnlineResponse {
    /// Users active since the requested instant.
    pub online: u64,
}
