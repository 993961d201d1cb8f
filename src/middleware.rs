//! # Middleware Components
//!
//! Cross-cutting request/response processing for the asset service.
//!
//! ## Middleware Types
//!
//! - **CORS Middleware**: Preflight responses and CORS headers on every response
//! - **Auth Middleware**: Bearer credential and client address extraction
//! - **Validation Middleware**: Request body shape checks
//!
//! ## Usage Examples
//!
//! ```rust,ignore
//! if req.method() == Method::Options {
//!     return CorsMiddleware::handle_preflight();
//! }
//!
//! let token = AuthMiddleware::bearer_token(&req)?;
//! let response = CorsMiddleware::apply_headers(response, logger.request_id());
//! ```

use serde_json::Value;
use worker::*;

use crate::constants::{
    CORS_ALLOW_HEADERS, CORS_ALLOW_METHODS, CORS_ALLOW_ORIGIN, HEADER_AUTHORIZATION,
    HEADER_CLIENT_IP, HEADER_FORWARDED_FOR, HEADER_REQUEST_ID,
};
use crate::errors::{AppError, AppResult};
use crate::utils::cors_headers;

/// Middleware for handling Cross-Origin Resource Sharing (CORS) requests.
///
/// The current implementation allows all origins (`*`). Authentication uses
/// the `Authorization` header rather than cookies, so no credentials mode is
/// advertised.
pub struct CorsMiddleware;

impl CorsMiddleware {
    /// Adds the CORS headers and the request id to an existing response,
    /// keeping the headers it already carries.
    pub fn apply_headers(mut response: Response, request_id: &str) -> Response {
        let headers = response.headers_mut();
        let _ = headers.set("Access-Control-Allow-Origin", CORS_ALLOW_ORIGIN);
        let _ = headers.set("Access-Control-Allow-Methods", CORS_ALLOW_METHODS);
        let _ = headers.set("Access-Control-Allow-Headers", CORS_ALLOW_HEADERS);
        let _ = headers.set("Access-Control-Expose-Headers", HEADER_REQUEST_ID);
        let _ = headers.set(HEADER_REQUEST_ID, request_id);
        response
    }

    /// Handles CORS preflight requests (OPTIONS method).
    pub fn handle_preflight() -> Result<Response> {
        Ok(Response::empty()?.with_status(204).with_headers(cors_headers()))
    }
}

/// Middleware for reading the caller's credential and network origin.
pub struct AuthMiddleware;

impl AuthMiddleware {
    /// Extracts the token from `Authorization: Bearer <t>` or
    /// `Authorization: Token <t>`. A missing header yields `None`; a present
    /// but malformed one is rejected.
    pub fn bearer_token(req: &Request) -> AppResult<Option<String>> {
        match req.headers().get(HEADER_AUTHORIZATION)? {
            None => Ok(None),
            Some(header) => Self::parse_authorization(&header)
                .map(|token| Some(token.to_string()))
                .ok_or_else(|| AppError::unauthorized("Malformed Authorization header")),
        }
    }

    pub fn parse_authorization(header: &str) -> Option<&str> {
        let (scheme, token) = header.trim().split_once(char::is_whitespace)?;
        let token = token.trim();
        let known = scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("token");
        (known && !token.is_empty() && !token.contains(char::is_whitespace)).then_some(token)
    }

    /// The connecting client's address, preferring Cloudflare's header.
    pub fn client_ip(req: &Request) -> Option<String> {
        let headers = req.headers();
        if let Ok(Some(ip)) = headers.get(HEADER_CLIENT_IP) {
            if !ip.trim().is_empty() {
                return Some(ip.trim().to_string());
            }
        }
        headers
            .get(HEADER_FORWARDED_FOR)
            .ok()
            .flatten()
            .and_then(|forwarded| Self::first_forwarded(&forwarded))
    }

    /// First hop of an `X-Forwarded-For` list.
    pub fn first_forwarded(header: &str) -> Option<String> {
        header
            .split(',')
            .map(str::trim)
            .find(|hop| !hop.is_empty())
            .map(str::to_string)
    }
}

/// Middleware for validating request bodies.
pub struct ValidationMiddleware;

impl ValidationMiddleware {
    /// Parses a JSON request body that must be an object. An empty body is
    /// treated as `{}`.
    pub fn json_object(body: &str) -> AppResult<Value> {
        if body.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        match serde_json::from_str::<Value>(body) {
            Ok(value @ Value::Object(_)) => Ok(value),
            Ok(_) => Err(AppError::field("body", "Expected a JSON object")),
            Err(_) => Err(AppError::field("body", "Invalid JSON in request body")),
        }
    }

    /// Whether a `Content-Type` value announces form data rather than JSON.
    pub fn is_form(content_type: &str) -> bool {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        media_type == "multipart/form-data" || media_type == "application/x-www-form-urlencoded"
    }
}
