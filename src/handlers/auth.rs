use worker::*;

use super::{authenticate, json_response, no_content, read_body, Backend};
use crate::errors::{AppError, AppResult};
use crate::logging::Logger;
use crate::middleware::AuthMiddleware;
use crate::services::UserService;

/// `POST /api/login/` with `username` and `password`, as JSON or form data.
pub async fn login(mut req: Request, backend: &Backend, logger: &Logger) -> AppResult<Response> {
    let origin = AuthMiddleware::client_ip(&req);
    let body = read_body(&mut req, &["username", "password"], &[]).await?;
    let username = body.payload.text("username").unwrap_or_default();
    let password = body.payload.text("password").unwrap_or_default();

    let identity = backend.identity();
    let service = UserService::new(&backend.db, &backend.db, &identity, &backend.db, &backend.config);
    let login = service
        .login(&username, &password, origin.as_deref(), logger)
        .await?;
    json_response(&login, 200)
}

/// `POST /api/logout/` revokes the presented credential.
pub async fn logout(req: Request, backend: &Backend, logger: &Logger) -> AppResult<Response> {
    let ctx = authenticate(&req, backend, logger).await?;
    let token = AuthMiddleware::bearer_token(&req)?
        .ok_or_else(|| AppError::unauthorized("Authentication credentials were not provided"))?;

    let identity = backend.identity();
    let service = UserService::new(&backend.db, &backend.db, &identity, &backend.db, &backend.config);
    service.logout(&ctx, &token).await?;
    no_content()
}
