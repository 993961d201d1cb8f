use async_trait::async_trait;
use serde::Deserialize;

use super::{parse_stored_timestamp, DatabaseService, Statement};
use crate::errors::{AppError, AppResult};
use crate::identity::{SessionRecord, SessionStore, UserStore};
use crate::models::{Role, User};
use crate::utils::format_timestamp;

const USER_COLUMNS: &str = "id, username, email, role, password_hash, password_salt, created_at";

#[derive(Debug, Deserialize)]
struct UserRow {
    id: String,
    username: String,
    email: String,
    role: String,
    password_hash: String,
    password_salt: String,
    created_at: String,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> AppResult<Self> {
        Ok(User {
            role: row.role.parse::<Role>().map_err(AppError::internal)?,
            created_at: parse_stored_timestamp("created_at", &row.created_at)?,
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            password_salt: row.password_salt,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SessionRow {
    token_digest: String,
    user_id: String,
    created_at: String,
    expires_at: String,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: i64,
}

fn select_users(condition: &str) -> String {
    format!("SELECT {} FROM users {}", USER_COLUMNS, condition)
}

#[async_trait(?Send)]
impl UserStore for DatabaseService {
    async fn insert_user(&self, user: &User) -> AppResult<()> {
        let statement = Statement::new(format!(
            "INSERT INTO users ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
            USER_COLUMNS
        ))
        .bind(user.id.as_str())
        .bind(user.username.as_str())
        .bind(user.email.as_str())
        .bind(user.role.as_str())
        .bind(user.password_hash.as_str())
        .bind(user.password_salt.as_str())
        .bind(format_timestamp(&user.created_at));
        self.execute(statement).await
    }

    async fn get_user(&self, id: &str) -> AppResult<Option<User>> {
        self.fetch_one::<UserRow>(Statement::new(select_users("WHERE id = ?")).bind(id))
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        self.fetch_one::<UserRow>(Statement::new(select_users("WHERE username = ?")).bind(username))
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_conflict(&self, username: &str, email: &str) -> AppResult<Option<User>> {
        let statement = Statement::new(select_users(
            "WHERE username = ? OR LOWER(email) = LOWER(?) LIMIT 1",
        ))
        .bind(username)
        .bind(email);
        self.fetch_one::<UserRow>(statement)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        self.fetch_all::<UserRow>(Statement::new(select_users("ORDER BY username ASC")))
            .await?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    async fn update_role(&self, id: &str, role: Role) -> AppResult<()> {
        self.execute(
            Statement::new("UPDATE users SET role = ? WHERE id = ?")
                .bind(role.as_str())
                .bind(id),
        )
        .await
    }

    async fn delete_user(&self, id: &str) -> AppResult<()> {
        self.execute(Statement::new("DELETE FROM users WHERE id = ?").bind(id))
            .await
    }

    async fn count_users(&self) -> AppResult<u64> {
        Ok(self
            .fetch_one::<CountRow>(Statement::new("SELECT COUNT(*) AS count FROM users"))
            .await?
            .map_or(0, |row| row.count.max(0) as u64))
    }
}

#[async_trait(?Send)]
impl SessionStore for DatabaseService {
    async fn insert_session(&self, session: &SessionRecord) -> AppResult<()> {
        let statement = Statement::new(
            "INSERT INTO sessions (token_digest, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session.token_digest.as_str())
        .bind(session.user_id.as_str())
        .bind(format_timestamp(&session.created_at))
        .bind(format_timestamp(&session.expires_at));
        self.execute(statement).await
    }

    async fn get_session(&self, token_digest: &str) -> AppResult<Option<SessionRecord>> {
        let statement = Statement::new(
            "SELECT token_digest, user_id, created_at, expires_at FROM sessions WHERE token_digest = ?",
        )
        .bind(token_digest);
        let Some(row) = self.fetch_one::<SessionRow>(statement).await? else {
            return Ok(None);
        };
        Ok(Some(SessionRecord {
            created_at: parse_stored_timestamp("created_at", &row.created_at)?,
            expires_at: parse_stored_timestamp("expires_at", &row.expires_at)?,
            token_digest: row.token_digest,
            user_id: row.user_id,
        }))
    }

    async fn delete_session(&self, token_digest: &str) -> AppResult<()> {
        self.execute(Statement::new("DELETE FROM sessions WHERE token_digest = ?").bind(token_digest))
            .await
    }

    async fn delete_sessions_for(&self, user_id: &str) -> AppResult<()> {
        self.execute(Statement::new("DELETE FROM sessions WHERE user_id = ?").bind(user_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn stored_role_must_be_in_the_closed_set() {
        let row = |role: &str| UserRow {
            id: "u1".into(),
            username: "ana".into(),
            email: "ana@example.com".into(),
            role: role.into(),
            password_hash: "h".into(),
            password_salt: "s".into(),
            created_at: format_timestamp(&Utc::now()),
        };
        assert_eq!(User::try_from(row("Editor")).unwrap().role, Role::Editor);
        assert!(User::try_from(row("Owner")).is_err());
    }

    #[test]
    fn select_users_keeps_column_order() {
        assert_eq!(
            select_users("WHERE id = ?"),
            "SELECT id, username, email, role, password_hash, password_salt, created_at FROM users WHERE id = ?"
        );
    }
}
