//! # Identity Provider
//!
//! Credential checks and bearer sessions. The provider is the only place that
//! sees passwords or raw tokens:
//!
//! - Passwords are stored as `hex(sha256(salt ":" password))` with a random
//!   per-user salt
//! - Tokens are random; only their sha256 digest is persisted
//!
//! Roles are looked up from the user record on every [`IdentityProvider::resolve`],
//! so a role change applies to existing sessions immediately.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::{Caller, Role, User};

#[async_trait(?Send)]
pub trait UserStore {
    async fn insert_user(&self, user: &User) -> AppResult<()>;
    async fn get_user(&self, id: &str) -> AppResult<Option<User>>;
    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>>;
    /// Any user whose username or email collides with the given ones.
    async fn find_conflict(&self, username: &str, email: &str) -> AppResult<Option<User>>;
    async fn list_users(&self) -> AppResult<Vec<User>>;
    async fn update_role(&self, id: &str, role: Role) -> AppResult<()>;
    async fn delete_user(&self, id: &str) -> AppResult<()>;
    async fn count_users(&self) -> AppResult<u64>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub token_digest: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait(?Send)]
pub trait SessionStore {
    async fn insert_session(&self, session: &SessionRecord) -> AppResult<()>;
    async fn get_session(&self, token_digest: &str) -> AppResult<Option<SessionRecord>>;
    async fn delete_session(&self, token_digest: &str) -> AppResult<()>;
    async fn delete_sessions_for(&self, user_id: &str) -> AppResult<()>;
}

/// A freshly issued bearer credential.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait(?Send)]
pub trait IdentityProvider {
    /// Returns the user when the credentials are valid.
    async fn authenticate(&self, username: &str, password: &str) -> AppResult<Option<User>>;
    async fn issue(&self, user: &User) -> AppResult<Session>;
    /// Maps a bearer token to its caller; expired or unknown tokens yield `None`.
    async fn resolve(&self, token: &str) -> AppResult<Option<Caller>>;
    async fn revoke(&self, token: &str) -> AppResult<()>;
}

pub fn digest_hex(input: &[u8]) -> String {
    hex::encode(Sha256::digest(input))
}

pub fn generate_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn hash_password(salt: &str, password: &str) -> String {
    digest_hex(format!("{}:{}", salt, password).as_bytes())
}

pub fn verify_password(salt: &str, password: &str, expected_hash: &str) -> bool {
    let actual = hash_password(salt, password);
    actual.len() == expected_hash.len()
        && actual
            .bytes()
            .zip(expected_hash.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Identity provider over a user store and a session store.
pub struct SessionIdentityProvider<'a> {
    users: &'a dyn UserStore,
    sessions: &'a dyn SessionStore,
    ttl: Duration,
}

impl<'a> SessionIdentityProvider<'a> {
    pub fn new(users: &'a dyn UserStore, sessions: &'a dyn SessionStore, ttl_hours: i64) -> Self {
        Self {
            users,
            sessions,
            ttl: Duration::hours(ttl_hours.max(1)),
        }
    }
}

#[async_trait(?Send)]
impl IdentityProvider for SessionIdentityProvider<'_> {
    async fn authenticate(&self, username: &str, password: &str) -> AppResult<Option<User>> {
        let Some(user) = self.users.find_by_username(username.trim()).await? else {
            return Ok(None);
        };
        if verify_password(&user.password_salt, password, &user.password_hash) {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    async fn issue(&self, user: &User) -> AppResult<Session> {
        let token = generate_token();
        let now = Utc::now();
        let record = SessionRecord {
            token_digest: digest_hex(token.as_bytes()),
            user_id: user.id.clone(),
            created_at: now,
            expires_at: now + self.ttl,
        };
        self.sessions.insert_session(&record).await?;
        Ok(Session {
            token,
            expires_at: record.expires_at,
        })
    }

    async fn resolve(&self, token: &str) -> AppResult<Option<Caller>> {
        let digest = digest_hex(token.as_bytes());
        let Some(session) = self.sessions.get_session(&digest).await? else {
            return Ok(None);
        };
        if session.expires_at <= Utc::now() {
            self.sessions.delete_session(&digest).await?;
            return Ok(None);
        }
        Ok(self
            .users
            .get_user(&session.user_id)
            .await?
            .map(|user| user.as_caller()))
    }

    async fn revoke(&self, token: &str) -> AppResult<()> {
        self.sessions.delete_session(&digest_hex(token.as_bytes())).await
    }
}
