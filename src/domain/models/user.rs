use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Tutor,
    Student,
    Admin,
    Moderator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Tutor => "TUTOR",
            Role::Student => "STUDENT",
            Role::Admin => "ADMIN",
            Role::Moderator => "MODERATOR",
        }
    }
}

/// Account provisioning lives outside the engine; this row carries what the
/// commands need: identity and the role set (stored as a comma-joined list).
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub image_url: Option<String>,
    pub roles: String,
    #[serde(with = "super::time::utc_millis")]
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: String, roles: &[Role], now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            image_url: None,
            roles: roles.iter().map(Role::as_str).collect::<Vec<_>>().join(","),
            created_at: now,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.split(',').any(|r| r.trim() == role.as_str())
    }

    pub fn is_tutor(&self) -> bool {
        self.has_role(Role::Tutor)
    }
}

/// Projection embedded in detailed booking responses.
#[derive(Debug, Serialize, FromRow, Clone)]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    #[sqlx(rename = "image_url")]
    pub image: Option<String>,
}
