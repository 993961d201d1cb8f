//! # Asset Vault - Cloudflare Workers
//!
//! Access-controlled digital asset backend built with Rust and Cloudflare
//! Workers. Assets are uploaded to R2, their metadata lives in D1 together
//! with users, sessions and the audit log, and configuration comes from KV.
//!
//! ## Architecture
//!
//! - **Router**: Maps method and path onto handlers
//! - **Middleware**: CORS, credential extraction, body checks
//! - **Handlers**: Translate HTTP into service calls
//! - **Services**: Asset write path, user management, activity log reads
//! - **Policy / Normalizer / Repository**: Pure authorization, payload
//!   coercion and listing semantics
//! - **Database / Blob**: D1 and R2 adapters behind the storage traits
//! - **Audit**: Append-only activity log
//!
//! ## Core Features
//!
//! - Role based access (Admin / Editor / Viewer) with per-asset ownership
//! - Multipart uploads up to a configurable size limit
//! - Filtered, sorted asset listings that never leak private rows
//! - Audit entries for every mutation, login, logout and sensitive read
//!
//! ## Example Usage
//!
//! ```text
//! POST   /api/login/                 - Obtain a bearer token
//! POST   /api/assets/                - Upload an asset
//! GET    /api/assets/?tags=a,b       - List visible assets
//! PATCH  /api/assets/{id}/           - Partially update an asset
//! GET    /api/activity/logs/         - Read the audit log (Admin)
//! ```

use std::sync::{Arc, OnceLock};
use worker::*;

pub mod audit;
pub mod blob;
pub mod config;
pub mod constants;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod identity;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod normalizer;
pub mod policy;
pub mod repository;
pub mod router;
pub mod services;
pub mod utils;

#[cfg(test)]
mod testing;

use config::Config;
use constants::{HEADER_REQUEST_ID, STORAGE_CONFIG_KV_NAME};
use logging::Logger;

static CONFIG_CACHE: OnceLock<Arc<Config>> = OnceLock::new();

/// Main entry point for the Cloudflare Worker.
///
/// Sets up panic reporting, assigns a request id (reusing a client supplied
/// `X-Request-Id`), loads configuration and delegates to the router.
#[event(fetch)]
pub async fn main(req: Request, env: Env, _ctx: Context) -> Result<Response> {
    console_error_panic_hook::set_once();

    let request_id = req
        .headers()
        .get(HEADER_REQUEST_ID)
        .ok()
        .flatten()
        .filter(|id| !id.is_empty() && id.len() <= 128)
        .unwrap_or_else(utils::generate_request_id);
    let logger = Logger::new(request_id);

    let config = load_config(&env).await?;

    router::handle_request(req, env, config, logger).await
}

async fn load_config(env: &Env) -> Result<Arc<Config>> {
    if let Some(config) = CONFIG_CACHE.get() {
        return Ok(config.clone());
    }

    let kv = env.kv(STORAGE_CONFIG_KV_NAME)?;
    let config = Arc::new(Config::load(&kv).await?);
    let _ = CONFIG_CACHE.set(config.clone());
    Ok(config)
}
