//! # Handlers Module
//!
//! HTTP request handlers for the asset service. Handlers translate transport
//! data into payloads and query structs, call a service, and turn the result
//! into JSON. No authorization or validation decision is made here.
//!
//! ## Request Flow
//!
//! ```text
//! HTTP Request → Router → Handler → Service → Response (+ CORS, request id)
//! ```

use serde::Serialize;
use std::sync::Arc;
use worker::*;

use crate::blob::{R2BlobStore, UploadedFile};
use crate::config::Config;
use crate::database::DatabaseService;
use crate::errors::{AppError, AppResult};
use crate::identity::{IdentityProvider, SessionIdentityProvider};
use crate::log_data;
use crate::logging::Logger;
use crate::middleware::{AuthMiddleware, CorsMiddleware, ValidationMiddleware};
use crate::normalizer::{RawPayload, RawValue};
use crate::services::RequestContext;

pub mod activity;
pub mod assets;
pub mod auth;
pub mod users;

/// Storage bindings resolved once per request.
pub struct Backend {
    pub db: DatabaseService,
    pub blobs: R2BlobStore,
    pub config: Arc<Config>,
}

impl Backend {
    pub fn from_env(env: &Env, config: Arc<Config>) -> Result<Self> {
        Ok(Self {
            db: DatabaseService::new(env.d1(&config.database_name)?),
            blobs: R2BlobStore::new(env.bucket(&config.bucket_name)?),
            config,
        })
    }

    pub fn identity(&self) -> SessionIdentityProvider<'_> {
        SessionIdentityProvider::new(&self.db, &self.db, self.config.session_ttl_hours)
    }
}

/// Resolves the bearer credential into a request context. Every route except
/// health and login goes through here.
pub async fn authenticate(req: &Request, backend: &Backend, logger: &Logger) -> AppResult<RequestContext> {
    let token = AuthMiddleware::bearer_token(req)?
        .ok_or_else(|| AppError::unauthorized("Authentication credentials were not provided"))?;
    let caller = backend
        .identity()
        .resolve(&token)
        .await?
        .ok_or_else(|| AppError::unauthorized("Invalid or expired token"))?;
    Ok(RequestContext::new(
        caller,
        AuthMiddleware::client_ip(req),
        logger.clone(),
    ))
}

/// A request body split into text values and uploaded files.
#[derive(Debug, Default)]
pub struct RequestBody {
    pub payload: RawPayload,
    pub files: Vec<(String, UploadedFile)>,
}

impl RequestBody {
    pub fn take_file(&mut self, key: &str) -> Option<UploadedFile> {
        let index = self.files.iter().position(|(name, _)| name == key)?;
        Some(self.files.remove(index).1)
    }
}

/// Reads a multipart/urlencoded or JSON body. Form bodies have no key
/// enumeration, so only `fields` and `file_fields` are collected from them.
pub async fn read_body(req: &mut Request, fields: &[&str], file_fields: &[&str]) -> AppResult<RequestBody> {
    let content_type = req.headers().get("Content-Type")?.unwrap_or_default();
    if !ValidationMiddleware::is_form(&content_type) {
        let text = req.text().await?;
        return Ok(RequestBody {
            payload: RawPayload::from_json(ValidationMiddleware::json_object(&text)?),
            files: Vec::new(),
        });
    }

    let form = req.form_data().await?;
    let mut body = RequestBody::default();
    for key in fields.iter().chain(file_fields) {
        for entry in form.get_all(key).unwrap_or_default() {
            match entry {
                FormEntry::Field(value) => body.payload.push(*key, RawValue::Text(value)),
                FormEntry::File(file) if file_fields.contains(key) => {
                    let uploaded = UploadedFile {
                        file_name: file.name(),
                        content_type: file.type_(),
                        bytes: file.bytes().await?,
                    };
                    body.files.push((key.to_string(), uploaded));
                }
                FormEntry::File(_) => {
                    return Err(AppError::field(*key, "Expected a text value, got a file"));
                }
            }
        }
    }
    Ok(body)
}

pub fn query_params(req: &Request) -> Result<Vec<(String, String)>> {
    Ok(req
        .url()?
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect())
}

pub fn json_response<T: Serialize>(value: &T, status: u16) -> AppResult<Response> {
    Ok(Response::from_json(value)?.with_status(status))
}

pub fn no_content() -> AppResult<Response> {
    Ok(Response::empty()?.with_status(204))
}

/// Turns a handler result into the final response. Server errors are logged
/// with full detail; the client only sees the generic body.
pub fn finish(result: AppResult<Response>, logger: &Logger) -> Result<Response> {
    let response = match result {
        Ok(response) => response,
        Err(error) => {
            if error.is_server_error() {
                logger.error(
                    "Request failed",
                    log_data!("code" => error.code(), "error" => error.to_string()),
                );
            } else {
                logger.info(
                    "Request rejected",
                    log_data!("status" => error.status_code(), "code" => error.code()),
                );
            }
            match error.to_response() {
                Ok(response) => response,
                Err(_) => Response::error("Internal Server Error", 500)?,
            }
        }
    };
    Ok(CorsMiddleware::apply_headers(response, logger.request_id()))
}

/// Provides a health check endpoint for monitoring and load balancer probes.
pub fn handle_health_check() -> AppResult<Response> {
    json_response(
        &serde_json::json!({
            "status": "healthy",
            "service": env!("CARGO_PKG_NAME"),
            "timestamp": chrono::Utc::now().to_rfc3339()
        }),
        200,
    )
}

pub fn handle_not_found() -> AppResult<Response> {
    Err(AppError::not_found("No route matches this path"))
}

pub fn handle_method_not_allowed() -> AppResult<Response> {
    Err(AppError::method_not_allowed("Method not allowed on this path"))
}
