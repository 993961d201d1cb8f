//! # Application Constants
//!
//! This module defines application-wide constants used throughout the asset service.
//!
//! ## Binding Names
//!
//! Constants for Cloudflare Worker bindings that must match wrangler.toml configuration.
//!
//! ## Size Limits
//!
//! Upload and pagination limits applied when the KV configuration omits them.
//!
//! ## Headers
//!
//! HTTP header names read or written by the API.

/// Standard KV configuration binding name
pub const STORAGE_CONFIG_KV_NAME: &str = "STORAGE_CONFIG";

/// Key under which the JSON configuration document is stored in KV
pub const CONFIG_KV_KEY: &str = "config";

/// Standard R2 bucket binding name
pub const STORAGE_BUCKET_NAME: &str = "STORAGE_BUCKET";

/// Standard D1 database binding name for assets, users and the activity log
pub const ASSET_DB_NAME: &str = "ASSET_DB";

/// Default maximum file size (100MB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Default bearer credential lifetime in hours
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

/// Default page size for audit log listings
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Upper bound for a requested page size
pub const MAX_PAGE_SIZE: u32 = 10_000;

/// Blob namespace for uploaded asset files
pub const UPLOAD_NAMESPACE: &str = "uploads";

/// Blob namespace for optional asset thumbnails
pub const THUMBNAIL_NAMESPACE: &str = "thumbnails";

/// Header carrying the bearer credential
pub const HEADER_AUTHORIZATION: &str = "Authorization";

/// Header Cloudflare sets to the connecting client address
pub const HEADER_CLIENT_IP: &str = "CF-Connecting-IP";

/// Fallback header for the client address behind other proxies
pub const HEADER_FORWARDED_FOR: &str = "X-Forwarded-For";

/// Header echoing the request id back to clients
pub const HEADER_REQUEST_ID: &str = "X-Request-Id";

/// CORS header for allowed origins
pub const CORS_ALLOW_ORIGIN: &str = "*";

/// CORS header for allowed methods
pub const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";

/// CORS header for allowed headers
pub const CORS_ALLOW_HEADERS: &str = "Content-Type, Authorization, X-Request-Id";
