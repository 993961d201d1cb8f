use worker::*;

use super::{authenticate, json_response, no_content, read_body, Backend};
use crate::errors::{AppError, AppResult};
use crate::logging::Logger;
use crate::services::{NewUser, UserService};

const USER_FIELDS: &[&str] = &["username", "email", "password", "role"];

pub async fn list_users(req: Request, backend: &Backend, logger: &Logger) -> AppResult<Response> {
    let ctx = authenticate(&req, backend, logger).await?;
    let identity = backend.identity();
    let service = UserService::new(&backend.db, &backend.db, &identity, &backend.db, &backend.config);
    json_response(&service.list_users(&ctx).await?, 200)
}

pub async fn create_user(mut req: Request, backend: &Backend, logger: &Logger) -> AppResult<Response> {
    let ctx = authenticate(&req, backend, logger).await?;
    let body = read_body(&mut req, USER_FIELDS, &[]).await?;
    let new_user = NewUser {
        username: body.payload.text("username").unwrap_or_default(),
        email: body.payload.text("email").unwrap_or_default(),
        password: body.payload.text("password").unwrap_or_default(),
        role: body.payload.text("role"),
    };

    let identity = backend.identity();
    let service = UserService::new(&backend.db, &backend.db, &identity, &backend.db, &backend.config);
    json_response(&service.create_user(&ctx, new_user).await?, 201)
}

pub async fn get_user(req: Request, backend: &Backend, logger: &Logger, id: &str) -> AppResult<Response> {
    let ctx = authenticate(&req, backend, logger).await?;
    let identity = backend.identity();
    let service = UserService::new(&backend.db, &backend.db, &identity, &backend.db, &backend.config);
    json_response(&service.get_user(&ctx, id).await?, 200)
}

/// Only the role of an account can be changed.
pub async fn update_user(mut req: Request, backend: &Backend, logger: &Logger, id: &str) -> AppResult<Response> {
    let ctx = authenticate(&req, backend, logger).await?;
    let body = read_body(&mut req, USER_FIELDS, &[]).await?;
    let role = body
        .payload
        .text("role")
        .ok_or_else(|| AppError::field("role", "This field is required"))?;

    let identity = backend.identity();
    let service = UserService::new(&backend.db, &backend.db, &identity, &backend.db, &backend.config);
    json_response(&service.update_user_role(&ctx, id, &role).await?, 200)
}

pub async fn delete_user(req: Request, backend: &Backend, logger: &Logger, id: &str) -> AppResult<Response> {
    let ctx = authenticate(&req, backend, logger).await?;
    let identity = backend.identity();
    let service = UserService::new(&backend.db, &backend.db, &identity, &backend.db, &backend.config);
    service.delete_user(&ctx, id).await?;
    no_content()
}
