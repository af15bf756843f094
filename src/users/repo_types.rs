use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Role label stored with every account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
    Staff,
    Superadmin,
    Superstaff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::Superadmin => "superadmin",
            Role::Superstaff => "superstaff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            "superadmin" => Ok(Role::Superadmin),
            "superstaff" => Ok(Role::Superstaff),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// User account as the service sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// Assigned by storage; 0 until inserted.
    pub id: i64,
    /// Unique, exact match.
    pub username: String,
    pub email: String,
    /// Argon2 PHC string once stored.
    pub hashed_password: String,
    pub is_verified: bool,
    pub role: Role,
    /// Pagination key, with `id` breaking ties.
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Row shape of the `users` table.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub hashed_password: String,
    pub is_verified: bool,
    pub role: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = UnknownRole;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            username: r.username,
            email: r.email,
            hashed_password: r.hashed_password,
            is_verified: r.is_verified,
            role: r.role.parse()?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}
