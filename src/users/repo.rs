use async_trait::async_trait;
use sqlx::PgPool;
use tracing::error;

use crate::{
    cursor::Cursor,
    users::repo_types::{User, UserRow},
};

/// Storage failure as seen through the repository boundary.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("user not found")]
    NotFound,
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("stored row is invalid: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

// 23505 = PostgreSQL unique_violation
fn classify(e: sqlx::Error) -> RepoError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.code().as_deref() == Some("23505") {
            return RepoError::UniqueViolation(
                db_err.constraint().unwrap_or("users").to_string(),
            );
        }
    }
    RepoError::Database(e)
}

/// Persistence contract the account service depends on.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Up to `limit` users ordered by `(created_at, id)`, strictly after `after` when given.
    async fn fetch_page(&self, after: Option<Cursor>, limit: i64) -> Result<Vec<User>, RepoError>;

    async fn get_by_id(&self, id: i64) -> Result<User, RepoError>;

    async fn get_by_username(&self, username: &str) -> Result<User, RepoError>;

    /// Insert and return the storage-assigned id. `user.id` is ignored.
    async fn insert(&self, user: &User) -> Result<i64, RepoError>;

    /// Rows affected by the write.
    async fn update(&self, user: &User) -> Result<u64, RepoError>;

    /// Rows affected by the delete.
    async fn delete(&self, id: i64) -> Result<u64, RepoError>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn into_users(rows: Vec<UserRow>) -> Result<Vec<User>, RepoError> {
    rows.into_iter()
        .map(|row| {
            User::try_from(row).map_err(|e| {
                error!(error = %e, "invalid user row");
                RepoError::Corrupt(e.to_string())
            })
        })
        .collect()
}

fn into_user(row: Option<UserRow>) -> Result<User, RepoError> {
    let row = row.ok_or(RepoError::NotFound)?;
    User::try_from(row).map_err(|e| RepoError::Corrupt(e.to_string()))
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn fetch_page(&self, after: Option<Cursor>, limit: i64) -> Result<Vec<User>, RepoError> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, hashed_password, is_verified, role, created_at, updated_at
            FROM users
            WHERE $1::timestamptz IS NULL OR (created_at, id) > ($1, $2)
            ORDER BY created_at ASC, id ASC
            LIMIT $3
            "#,
        )
        .bind(after.map(|c| c.created_at()))
        .bind(after.map(|c| c.id()))
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        into_users(rows)
    }

    async fn get_by_id(&self, id: i64) -> Result<User, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, hashed_password, is_verified, role, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        into_user(row)
    }

    async fn get_by_username(&self, username: &str) -> Result<User, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, hashed_password, is_verified, role, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        into_user(row)
    }

    async fn insert(&self, user: &User) -> Result<i64, RepoError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO users (username, email, hashed_password, is_verified, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.hashed_password)
        .bind(user.is_verified)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.db)
        .await
        .map_err(classify)
    }

    async fn update(&self, user: &User) -> Result<u64, RepoError> {
        let res = sqlx::query(
            r#"
            UPDATE users
            SET username = $1, email = $2, hashed_password = $3, is_verified = $4,
                role = $5, updated_at = $6
            WHERE id = $7
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.hashed_password)
        .bind(user.is_verified)
        .bind(user.role.as_str())
        .bind(user.updated_at)
        .bind(user.id)
        .execute(&self.db)
        .await
        .map_err(classify)?;
        Ok(res.rows_affected())
    }

    async fn delete(&self, id: i64) -> Result<u64, RepoError> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected())
    }
}
