//! In-memory stand-ins for unit tests.

use std::{
    sync::{
        atomic::{AtomicI64, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use time::macros::datetime;

use crate::{
    cursor::Cursor,
    users::{
        password::PasswordHasher,
        repo::{RepoError, UserRepository},
        repo_types::{Role, User},
    },
};

pub fn sample_user(username: &str) -> User {
    let at = datetime!(2024-01-01 00:00:00 UTC);
    User {
        id: 0,
        username: username.to_string(),
        email: format!("{}@example.com", username.trim()),
        hashed_password: "pw".into(),
        is_verified: false,
        role: Role::User,
        created_at: at,
        updated_at: at,
    }
}

/// Deterministic hasher: `fake$<plain>`. Anything without the prefix is malformed.
pub struct FakeHasher;

impl PasswordHasher for FakeHasher {
    fn hash(&self, plain: &str) -> anyhow::Result<String> {
        Ok(format!("fake${plain}"))
    }

    fn verify(&self, plain: &str, hash: &str) -> anyhow::Result<bool> {
        let stored = hash
            .strip_prefix("fake$")
            .ok_or_else(|| anyhow::anyhow!("malformed hash"))?;
        Ok(stored == plain)
    }
}

/// Hasher whose `hash` always fails, as when the algorithm rejects its parameters.
pub struct FailingHasher;

impl PasswordHasher for FailingHasher {
    fn hash(&self, _plain: &str) -> anyhow::Result<String> {
        Err(anyhow::anyhow!("hasher unavailable"))
    }

    fn verify(&self, _plain: &str, _hash: &str) -> anyhow::Result<bool> {
        Err(anyhow::anyhow!("hasher unavailable"))
    }
}

#[derive(Default)]
struct Knobs {
    unique_violation_on_insert: bool,
    fail_reads: bool,
    case_insensitive: bool,
    forced_affected: Option<u64>,
    stall: Option<Duration>,
}

#[derive(Default)]
pub struct FakeUserRepository {
    users: Mutex<Vec<User>>,
    knobs: Mutex<Knobs>,
    next_id: AtomicI64,
    inserts: AtomicUsize,
    deletes: AtomicUsize,
    fetches: AtomicUsize,
}

impl FakeUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert directly, assigning the next id.
    pub fn seed(&self, mut user: User) {
        user.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.users.lock().unwrap().push(user);
    }

    pub fn get(&self, username: &str) -> Option<User> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.username == username)
            .cloned()
    }

    pub fn fail_inserts_with_unique_violation(&self) {
        self.knobs.lock().unwrap().unique_violation_on_insert = true;
    }

    pub fn fail_reads(&self) {
        self.knobs.lock().unwrap().fail_reads = true;
    }

    pub fn case_insensitive_lookup(&self) {
        self.knobs.lock().unwrap().case_insensitive = true;
    }

    pub fn force_affected(&self, n: u64) {
        self.knobs.lock().unwrap().forced_affected = Some(n);
    }

    pub fn stall(&self, d: Duration) {
        self.knobs.lock().unwrap().stall = Some(d);
    }

    pub fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    async fn before_call(&self) {
        let stall = self.knobs.lock().unwrap().stall;
        if let Some(d) = stall {
            tokio::time::sleep(d).await;
        }
    }

    fn read_guard(&self) -> Result<(), RepoError> {
        if self.knobs.lock().unwrap().fail_reads {
            return Err(RepoError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn affected(&self, real: u64) -> u64 {
        self.knobs.lock().unwrap().forced_affected.unwrap_or(real)
    }
}

#[async_trait]
impl UserRepository for FakeUserRepository {
    async fn fetch_page(&self, after: Option<Cursor>, limit: i64) -> Result<Vec<User>, RepoError> {
        self.before_call().await;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.read_guard()?;
        let mut users: Vec<User> = self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| after.map_or(true, |c| (u.created_at, u.id) > (c.created_at(), c.id())))
            .cloned()
            .collect();
        users.sort_by_key(|u| (u.created_at, u.id));
        users.truncate(limit.max(0) as usize);
        Ok(users)
    }

    async fn get_by_id(&self, id: i64) -> Result<User, RepoError> {
        self.before_call().await;
        self.read_guard()?;
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn get_by_username(&self, username: &str) -> Result<User, RepoError> {
        self.before_call().await;
        self.read_guard()?;
        let loose = self.knobs.lock().unwrap().case_insensitive;
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| {
                if loose {
                    u.username.eq_ignore_ascii_case(username)
                } else {
                    u.username == username
                }
            })
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn insert(&self, user: &User) -> Result<i64, RepoError> {
        self.before_call().await;
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.knobs.lock().unwrap().unique_violation_on_insert {
            return Err(RepoError::UniqueViolation("users_username_key".into()));
        }
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.username == user.username) {
            return Err(RepoError::UniqueViolation("users_username_key".into()));
        }
        let mut stored = user.clone();
        stored.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = stored.id;
        users.push(stored);
        Ok(id)
    }

    async fn update(&self, user: &User) -> Result<u64, RepoError> {
        self.before_call().await;
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.id != user.id && u.username == user.username) {
            return Err(RepoError::UniqueViolation("users_username_key".into()));
        }
        let mut n = 0;
        if let Some(slot) = users.iter_mut().find(|u| u.id == user.id) {
            *slot = user.clone();
            n = 1;
        }
        Ok(self.affected(n))
    }

    async fn delete(&self, id: i64) -> Result<u64, RepoError> {
        self.before_call().await;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let mut users = self.users.lock().unwrap();
        let before = users.len();
        users.retain(|u| u.id != id);
        let n = (before - users.len()) as u64;
        drop(users);
        Ok(self.affected(n))
    }
}
