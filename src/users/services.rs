use std::{future::Future, sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::{
    cursor::Cursor,
    error::ServiceError,
    users::{
        password::PasswordHasher,
        repo::{RepoError, UserRepository},
        repo_types::{Role, User},
    },
};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

impl From<RepoError> for ServiceError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ServiceError::NotFound,
            RepoError::UniqueViolation(constraint) => {
                warn!(%constraint, "storage rejected duplicate");
                ServiceError::Conflict
            }
            other => ServiceError::Internal(anyhow::Error::new(other)),
        }
    }
}

/// One page of users plus the token for the next one.
#[derive(Debug)]
pub struct UserPage {
    pub users: Vec<User>,
    /// Present only when the page came back full.
    pub next_cursor: Option<String>,
}

/// Account operations. Holds no mutable state; clone the `Arc`s freely.
///
/// Every public operation runs under `timeout`. Dropping the returned future
/// (for example under a tighter caller deadline) cancels the in-flight work.
#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    hasher: Arc<dyn PasswordHasher>,
    timeout: Duration,
}

impl UserService {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        hasher: Arc<dyn PasswordHasher>,
        timeout: Duration,
    ) -> Self {
        Self {
            repo,
            hasher,
            timeout,
        }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res,
            Err(_) => {
                warn!(op, timeout_ms = self.timeout.as_millis() as u64, "operation timed out");
                Err(ServiceError::Timeout)
            }
        }
    }

    pub async fn fetch(&self, cursor: &str, page_size: i64) -> Result<UserPage, ServiceError> {
        self.bounded("fetch", self.list_page(cursor, page_size)).await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<User, ServiceError> {
        self.bounded("get_by_id", self.load_by_id(id)).await
    }

    pub async fn get_by_username(&self, username: &str) -> Result<User, ServiceError> {
        self.bounded("get_by_username", self.load_by_username(username)).await
    }

    /// Write `user` back as given, credential included, stamping `updated_at`.
    pub async fn update(&self, user: User) -> Result<User, ServiceError> {
        self.bounded("update", self.write_through(user)).await
    }

    /// Administrative create. Role is taken from the record.
    pub async fn store(&self, user: User) -> Result<User, ServiceError> {
        self.bounded("store", self.create(user, None)).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ServiceError> {
        self.bounded("delete", self.remove(id)).await
    }

    /// Self-service sign-up. Always lands as [`Role::User`].
    pub async fn register(&self, user: User) -> Result<User, ServiceError> {
        self.bounded("register", self.create(user, Some(Role::User))).await
    }

    /// Returns the stored record when `password` matches. No token is issued.
    pub async fn login(&self, username: &str, password: &str) -> Result<User, ServiceError> {
        self.bounded("login", self.authenticate(username, password)).await
    }

    pub async fn create_admin(&self, user: User) -> Result<User, ServiceError> {
        self.bounded("create_admin", self.create(user, Some(Role::Admin))).await
    }

    pub async fn create_staff(&self, user: User) -> Result<User, ServiceError> {
        self.bounded("create_staff", self.create(user, Some(Role::Staff))).await
    }

    async fn list_page(&self, cursor: &str, page_size: i64) -> Result<UserPage, ServiceError> {
        if page_size < 0 {
            return Err(ServiceError::bad_input("page size must not be negative"));
        }
        let limit = if page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size
        };

        let after = match cursor.trim() {
            "" => None,
            token => Some(Cursor::decode(token).map_err(|e| {
                debug!(error = %e, "rejecting cursor");
                ServiceError::bad_input("invalid cursor")
            })?),
        };

        let users = self.repo.fetch_page(after, limit).await?;
        let next_cursor = if users.len() as i64 == limit {
            users.last().map(|u| Cursor::new(u.created_at, u.id).encode())
        } else {
            None
        };
        Ok(UserPage { users, next_cursor })
    }

    async fn load_by_id(&self, id: i64) -> Result<User, ServiceError> {
        Ok(self.repo.get_by_id(id).await?)
    }

    async fn load_by_username(&self, username: &str) -> Result<User, ServiceError> {
        Ok(self.repo.get_by_username(username).await?)
    }

    async fn write_through(&self, mut user: User) -> Result<User, ServiceError> {
        user.updated_at = OffsetDateTime::now_utc();
        let affected = self.repo.update(&user).await?;
        if affected != 1 {
            error!(user_id = user.id, affected, "update touched unexpected row count");
            return Err(anyhow!("unexpected update result: {affected} rows affected").into());
        }
        info!(user_id = user.id, "user updated");
        Ok(user)
    }

    async fn remove(&self, id: i64) -> Result<(), ServiceError> {
        match self.repo.get_by_id(id).await {
            Ok(_) => {}
            Err(RepoError::NotFound) => {
                warn!(user_id = id, "delete of unknown user");
                return Err(ServiceError::NotFound);
            }
            Err(e) => return Err(e.into()),
        }
        let affected = self.repo.delete(id).await?;
        if affected != 1 {
            error!(user_id = id, affected, "delete touched unexpected row count");
            return Err(anyhow!("unexpected delete result: {affected} rows affected").into());
        }
        info!(user_id = id, "user deleted");
        Ok(())
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<User, ServiceError> {
        let user = match self.repo.get_by_username(username).await {
            Ok(u) => u,
            Err(RepoError::NotFound) => {
                warn!(%username, "login unknown username");
                return Err(ServiceError::NotFound);
            }
            Err(e) => return Err(e.into()),
        };

        let hasher = Arc::clone(&self.hasher);
        let plain = password.to_owned();
        let stored = user.hashed_password.clone();
        let verdict = tokio::task::spawn_blocking(move || hasher.verify(&plain, &stored))
            .await
            .context("verify task")?;
        match verdict {
            Ok(true) => {}
            Ok(false) => {
                warn!(%username, user_id = user.id, "login invalid password");
                return Err(ServiceError::bad_input("invalid credentials"));
            }
            Err(e) => {
                warn!(error = %e, user_id = user.id, "stored hash unreadable");
                return Err(ServiceError::bad_input("invalid credentials"));
            }
        }

        if user.username != username {
            error!(user_id = user.id, "lookup returned a different username");
            return Err(anyhow!("username mismatch for user {}", user.id).into());
        }
        info!(user_id = user.id, "user logged in");
        Ok(user)
    }

    async fn create(&self, mut user: User, role: Option<Role>) -> Result<User, ServiceError> {
        if user.username.trim().is_empty() {
            return Err(ServiceError::bad_input("username is required"));
        }
        if user.email.trim().is_empty() {
            return Err(ServiceError::bad_input("email is required"));
        }

        // Fast path for a readable error; the unique index is the real guard.
        self.ensure_username_available(&user.username).await?;

        user.hashed_password = self.hash_secret(std::mem::take(&mut user.hashed_password)).await?;
        if let Some(role) = role {
            user.role = role;
        }
        let now = OffsetDateTime::now_utc();
        user.created_at = now;
        user.updated_at = now;

        user.id = self.repo.insert(&user).await?;
        info!(user_id = user.id, username = %user.username, role = %user.role, "user created");
        Ok(user)
    }

    async fn ensure_username_available(&self, username: &str) -> Result<(), ServiceError> {
        match self.repo.get_by_username(username).await {
            Ok(_) => {
                warn!(%username, "username already taken");
                Err(ServiceError::Conflict)
            }
            Err(RepoError::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn hash_secret(&self, plain: String) -> Result<String, ServiceError> {
        let hasher = Arc::clone(&self.hasher);
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .context("hash task")?
            .context("hash password")?;
        Ok(hash)
    }
}
