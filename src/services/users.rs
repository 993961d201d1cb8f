//! # User Service
//!
//! Login/logout plus Admin-only account management. Every mutation appends
//! one audit entry; a rejected mutation appends none.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{self, AuditLog};
use crate::config::Config;
use crate::errors::{AppError, AppResult, FieldError};
use crate::identity::{generate_salt, hash_password, IdentityProvider, SessionStore, UserStore};
use crate::log_data;
use crate::logging::Logger;
use crate::models::{ActionKind, EntityRef, NewAuditEntry, Role, User};
use crate::policy::{self, AccountChange};
use crate::services::RequestContext;
use crate::utils::generate_id;

const MAX_USERNAME_LENGTH: usize = 150;
const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user_id: String,
    pub username: String,
    pub role: Role,
}

pub struct UserService<'a> {
    users: &'a dyn UserStore,
    sessions: &'a dyn SessionStore,
    identity: &'a dyn IdentityProvider,
    audit: &'a dyn AuditLog,
    config: &'a Config,
}

fn parse_role(raw: &str) -> AppResult<Role> {
    raw.parse::<Role>()
        .map_err(|_| AppError::field("role", format!("\"{}\" is not a valid choice", raw.trim())))
}

fn new_user_record(username: &str, email: &str, password: &str, role: Role) -> User {
    let salt = generate_salt();
    User {
        id: generate_id(),
        username: username.to_string(),
        email: email.to_string(),
        role,
        password_hash: hash_password(&salt, password),
        password_salt: salt,
        created_at: Utc::now(),
    }
}

impl<'a> UserService<'a> {
    pub fn new(
        users: &'a dyn UserStore,
        sessions: &'a dyn SessionStore,
        identity: &'a dyn IdentityProvider,
        audit: &'a dyn AuditLog,
        config: &'a Config,
    ) -> Self {
        Self {
            users,
            sessions,
            identity,
            audit,
            config,
        }
    }

    /// Provisions the configured bootstrap Admin when no account exists yet
    /// and the login uses exactly its credentials.
    async fn ensure_bootstrap_admin(&self, username: &str, password: &str, logger: &Logger) -> AppResult<()> {
        let Some(bootstrap) = &self.config.bootstrap_admin else {
            return Ok(());
        };
        if bootstrap.username != username || bootstrap.password != password {
            return Ok(());
        }
        if self.users.count_users().await? > 0 {
            return Ok(());
        }

        let admin = new_user_record(&bootstrap.username, &bootstrap.email, &bootstrap.password, Role::Admin);
        self.users.insert_user(&admin).await?;
        logger.warn("Bootstrap admin provisioned", log_data!("user_id" => admin.id));
        audit::record(
            self.audit,
            logger,
            NewAuditEntry::new(&admin.as_caller(), ActionKind::Upload, "Provisioned bootstrap admin account")
                .with_entity(EntityRef::user(&admin.id)),
        )
        .await;
        Ok(())
    }

    /// Anonymous entry point: checks credentials and issues a bearer token.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        origin: Option<&str>,
        logger: &Logger,
    ) -> AppResult<LoginResponse> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AppError::unauthorized("Invalid credentials"));
        }
        self.ensure_bootstrap_admin(username, password, logger).await?;

        let Some(user) = self.identity.authenticate(username, password).await? else {
            logger.warn("Login rejected", log_data!("username" => username));
            return Err(AppError::unauthorized("Invalid credentials"));
        };
        let session = self.identity.issue(&user).await?;

        audit::record(
            self.audit,
            logger,
            NewAuditEntry::new(&user.as_caller(), ActionKind::Login, format!("User '{}' logged in", user.username))
                .with_origin(origin)
                .with_entity(EntityRef::user(&user.id)),
        )
        .await;

        Ok(LoginResponse {
            token: session.token,
            expires_at: session.expires_at,
            user_id: user.id,
            username: user.username,
            role: user.role,
        })
    }

    pub async fn logout(&self, ctx: &RequestContext, token: &str) -> AppResult<()> {
        self.identity.revoke(token).await?;
        audit::record(
            self.audit,
            &ctx.logger,
            ctx.audit_entry(ActionKind::Logout, format!("User '{}' logged out", ctx.caller.username))
                .with_entity(EntityRef::user(&ctx.caller.id)),
        )
        .await;
        Ok(())
    }

    pub async fn create_user(&self, ctx: &RequestContext, new_user: NewUser) -> AppResult<User> {
        policy::require_admin(&ctx.caller, "create users")?;

        let username = new_user.username.trim().to_string();
        let email = new_user.email.trim().to_string();
        let mut errors = Vec::new();
        if username.is_empty() {
            errors.push(FieldError::new("username", "This field is required"));
        } else if username.chars().count() > MAX_USERNAME_LENGTH
            || !username
                .chars()
                .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
        {
            errors.push(FieldError::new(
                "username",
                format!(
                    "Enter a valid username of at most {} letters, digits and @/./+/-/_ characters",
                    MAX_USERNAME_LENGTH
                ),
            ));
        }
        if email.is_empty() {
            errors.push(FieldError::new("email", "This field is required"));
        } else if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            errors.push(FieldError::new("email", "Enter a valid email address"));
        }
        if new_user.password.chars().count() < MIN_PASSWORD_LENGTH {
            errors.push(FieldError::new(
                "password",
                format!("Ensure this field has at least {} characters", MIN_PASSWORD_LENGTH),
            ));
        }
        let role = match new_user.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            None => Some(Role::Viewer),
            Some(raw) => match parse_role(raw) {
                Ok(role) => Some(role),
                Err(AppError::Validation { errors: role_errors }) => {
                    errors.extend(role_errors);
                    None
                }
                Err(other) => return Err(other),
            },
        };
        let Some(role) = role.filter(|_| errors.is_empty()) else {
            return Err(AppError::Validation { errors });
        };

        if let Some(existing) = self.users.find_conflict(&username, &email).await? {
            let field = if existing.username == username { "username" } else { "email" };
            return Err(AppError::conflict(format!("A user with that {} already exists", field)));
        }

        let user = new_user_record(&username, &email, &new_user.password, role);
        self.users.insert_user(&user).await?;

        ctx.logger.info("User created", log_data!("user_id" => user.id, "role" => role.as_str()));
        audit::record(
            self.audit,
            &ctx.logger,
            ctx.audit_entry(
                ActionKind::Upload,
                format!("Created user '{}' with role {}", user.username, user.role),
            )
            .with_entity(EntityRef::user(&user.id)),
        )
        .await;
        Ok(user)
    }

    pub async fn update_user_role(&self, ctx: &RequestContext, id: &str, raw_role: &str) -> AppResult<User> {
        policy::require_admin(&ctx.caller, "change roles")?;
        let role = parse_role(raw_role)?;
        let mut user = self.load(id).await?;
        policy::guard_self_management(
            &ctx.caller,
            &user.id,
            AccountChange::ChangeRole { from: user.role, to: role },
        )?;
        if user.role == role {
            return Ok(user);
        }

        let previous = user.role;
        self.users.update_role(&user.id, role).await?;
        user.role = role;

        audit::record(
            self.audit,
            &ctx.logger,
            ctx.audit_entry(
                ActionKind::Update,
                format!("Changed role of '{}' from {} to {}", user.username, previous, role),
            )
            .with_entity(EntityRef::user(&user.id)),
        )
        .await;
        Ok(user)
    }

    pub async fn delete_user(&self, ctx: &RequestContext, id: &str) -> AppResult<()> {
        policy::require_admin(&ctx.caller, "delete users")?;
        policy::guard_self_management(&ctx.caller, id, AccountChange::Delete)?;
        let user = self.load(id).await?;

        self.users.delete_user(&user.id).await?;
        if let Err(e) = self.sessions.delete_sessions_for(&user.id).await {
            ctx.logger.warn(
                "Failed to revoke sessions of deleted user",
                log_data!("user_id" => user.id, "error" => e.to_string()),
            );
        }

        audit::record(
            self.audit,
            &ctx.logger,
            ctx.audit_entry(ActionKind::Delete, format!("Deleted user '{}'", user.username))
                .with_entity(EntityRef::user(&user.id)),
        )
        .await;
        Ok(())
    }

    pub async fn list_users(&self, ctx: &RequestContext) -> AppResult<Vec<User>> {
        policy::require_admin(&ctx.caller, "list users")?;
        let users = self.users.list_users().await?;
        audit::record(
            self.audit,
            &ctx.logger,
            ctx.audit_entry(ActionKind::View, format!("Viewed user list ({} accounts)", users.len())),
        )
        .await;
        Ok(users)
    }

    /// Admin may read any account; everyone else only their own.
    pub async fn get_user(&self, ctx: &RequestContext, id: &str) -> AppResult<User> {
        if !ctx.caller.is_admin() && ctx.caller.id != id {
            return Err(AppError::forbidden("You may only view your own account"));
        }
        self.load(id).await
    }

    async fn load(&self, id: &str) -> AppResult<User> {
        self.users
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }
}
