use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::AppConfig;
use crate::users::{password::Argon2Hasher, repo::PgUserRepository, services::UserService};

#[derive(Clone)]
pub struct AppState {
    pub users: UserService,
}

impl AppState {
    /// Connect the pool and wire the service. Returns the pool for migrations.
    pub async fn init(config: &AppConfig) -> anyhow::Result<(Self, PgPool)> {
        let db = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let users = UserService::new(
            Arc::new(PgUserRepository::new(db.clone())),
            Arc::new(Argon2Hasher),
            config.request_timeout(),
        );
        Ok((Self { users }, db))
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::users::fake::{FakeHasher, FakeUserRepository};

        let users = UserService::new(
            Arc::new(FakeUserRepository::new()),
            Arc::new(FakeHasher),
            std::time::Duration::from_secs(5),
        );
        Self { users }
    }
}
