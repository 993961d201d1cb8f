//! # Request Routing and Dispatch
//!
//! Maps method and path onto a [`Route`], then dispatches it to a handler.
//! Matching is pure so the route table can be tested without a runtime.
//!
//! ## Supported Routes
//!
//! - `GET /health`
//! - `POST /api/login/`, `POST /api/logout/`
//! - `GET|POST /api/assets/`, `GET /api/assets/mine/`, `GET /api/assets/public/`
//! - `GET|PUT|PATCH|DELETE /api/assets/{id}/`
//! - `GET|POST /api/users/`, `GET|PATCH|DELETE /api/users/{id}/`
//! - `GET /api/activity/logs/`
//! - `OPTIONS *` - CORS preflight requests
//!
//! Trailing slashes are optional.

use std::sync::Arc;
use worker::*;

use crate::config::Config;
use crate::handlers::assets::Listing;
use crate::handlers::{
    activity, assets, auth, finish, handle_health_check, handle_method_not_allowed,
    handle_not_found, users, Backend,
};
use crate::log_data;
use crate::logging::Logger;
use crate::middleware::CorsMiddleware;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Preflight,
    Health,
    Login,
    Logout,
    ListAssets(Listing),
    CreateAsset,
    GetAsset(String),
    UpdateAsset { id: String, partial: bool },
    DeleteAsset(String),
    ListUsers,
    CreateUser,
    GetUser(String),
    UpdateUser(String),
    DeleteUser(String),
    ActivityLogs,
    MethodNotAllowed,
    NotFound,
}

impl Route {
    /// Routes that never need a storage binding.
    fn is_static(&self) -> bool {
        matches!(
            self,
            Route::Preflight | Route::Health | Route::MethodNotAllowed | Route::NotFound
        )
    }
}

pub fn resolve(method: &Method, path: &str) -> Route {
    if *method == Method::Options {
        return Route::Preflight;
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let on = |route: Route, allowed: &[Method]| {
        if allowed.contains(method) {
            route
        } else {
            Route::MethodNotAllowed
        }
    };

    match segments.as_slice() {
        ["health"] => on(Route::Health, &[Method::Get]),
        ["api", "login"] => on(Route::Login, &[Method::Post]),
        ["api", "logout"] => on(Route::Logout, &[Method::Post]),
        ["api", "assets"] => match method {
            Method::Get => Route::ListAssets(Listing::Visible),
            Method::Post => Route::CreateAsset,
            _ => Route::MethodNotAllowed,
        },
        ["api", "assets", "mine"] => on(Route::ListAssets(Listing::Mine), &[Method::Get]),
        ["api", "assets", "public"] => on(Route::ListAssets(Listing::Public), &[Method::Get]),
        ["api", "assets", id] => {
            let id = id.to_string();
            match method {
                Method::Get => Route::GetAsset(id),
                Method::Put => Route::UpdateAsset { id, partial: false },
                Method::Patch => Route::UpdateAsset { id, partial: true },
                Method::Delete => Route::DeleteAsset(id),
                _ => Route::MethodNotAllowed,
            }
        }
        ["api", "users"] => match method {
            Method::Get => Route::ListUsers,
            Method::Post => Route::CreateUser,
            _ => Route::MethodNotAllowed,
        },
        ["api", "users", id] => {
            let id = id.to_string();
            match method {
                Method::Get => Route::GetUser(id),
                Method::Patch => Route::UpdateUser(id),
                Method::Delete => Route::DeleteUser(id),
                _ => Route::MethodNotAllowed,
            }
        }
        ["api", "activity", "logs"] => on(Route::ActivityLogs, &[Method::Get]),
        _ => Route::NotFound,
    }
}

/// Handles incoming HTTP requests and routes them to appropriate handlers.
pub async fn handle_request(req: Request, env: Env, config: Arc<Config>, logger: Logger) -> Result<Response> {
    let method = req.method();
    let path = req.url()?.path().to_string();
    let route = resolve(&method, &path);

    logger.info(
        "Routing request",
        log_data!("method" => method.to_string(), "path" => path),
    );

    if route.is_static() {
        let result = match route {
            Route::Preflight => return CorsMiddleware::handle_preflight(),
            Route::Health => handle_health_check(),
            Route::MethodNotAllowed => handle_method_not_allowed(),
            _ => handle_not_found(),
        };
        return finish(result, &logger);
    }

    let backend = match Backend::from_env(&env, config) {
        Ok(backend) => backend,
        Err(e) => return finish(Err(e.into()), &logger),
    };

    let result = match route {
        Route::Login => auth::login(req, &backend, &logger).await,
        Route::Logout => auth::logout(req, &backend, &logger).await,
        Route::ListAssets(listing) => assets::list_assets(req, &backend, &logger, listing).await,
        Route::CreateAsset => assets::create_asset(req, &backend, &logger).await,
        Route::GetAsset(id) => assets::get_asset(req, &backend, &logger, &id).await,
        Route::UpdateAsset { id, partial } => {
            assets::update_asset(req, &backend, &logger, &id, partial).await
        }
        Route::DeleteAsset(id) => assets::delete_asset(req, &backend, &logger, &id).await,
        Route::ListUsers => users::list_users(req, &backend, &logger).await,
        Route::CreateUser => users::create_user(req, &backend, &logger).await,
        Route::GetUser(id) => users::get_user(req, &backend, &logger, &id).await,
        Route::UpdateUser(id) => users::update_user(req, &backend, &logger, &id).await,
        Route::DeleteUser(id) => users::delete_user(req, &backend, &logger, &id).await,
        Route::ActivityLogs => activity::list_activity(req, &backend, &logger).await,
        Route::Preflight | Route::Health | Route::MethodNotAllowed | Route::NotFound => {
            handle_not_found()
        }
    };
    finish(result, &logger)
}
