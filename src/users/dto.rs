use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ServiceError;
use crate::users::repo_types::{Role, User};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Body for register, store and the role-elevated create endpoints.
#[derive(Debug, Deserialize)]
pub struct UserRequest {
    pub username: String,
    pub email: String,
    #[serde(alias = "hashed_password")]
    pub password: String,
    #[serde(default)]
    pub is_verified: bool,
    pub role: Option<Role>,
}

impl UserRequest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.username.trim().is_empty() {
            return Err(ServiceError::bad_input("username is required"));
        }
        if !is_valid_email(self.email.trim()) {
            return Err(ServiceError::bad_input("invalid email"));
        }
        if self.password.is_empty() {
            return Err(ServiceError::bad_input("password is required"));
        }
        Ok(())
    }

    /// Unsaved record; the service assigns id and timestamps.
    pub fn into_user(self) -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: 0,
            username: self.username.trim().to_string(),
            email: self.email.trim().to_string(),
            hashed_password: self.password,
            is_verified: self.is_verified,
            role: self.role.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    #[serde(alias = "hashed_password")]
    pub password: String,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub is_verified: Option<bool>,
    pub role: Option<Role>,
}

impl UpdateUserRequest {
    pub fn apply(self, user: &mut User) -> Result<(), ServiceError> {
        if let Some(username) = self.username {
            let username = username.trim();
            if username.is_empty() {
                return Err(ServiceError::bad_input("username is required"));
            }
            user.username = username.to_string();
        }
        if let Some(email) = self.email {
            let email = email.trim();
            if !is_valid_email(email) {
                return Err(ServiceError::bad_input("invalid email"));
            }
            user.email = email.to_string();
        }
        if let Some(v) = self.is_verified {
            user.is_verified = v;
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct FetchQuery {
    #[serde(default)]
    pub num: i64,
    #[serde(default)]
    pub cursor: String,
}

/// User as returned over HTTP. The credential hash never leaves the service.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_verified: bool,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            is_verified: u.is_verified,
            role: u.role,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}
