//! # Configuration Management
//!
//! Configuration is stored in Cloudflare KV storage and loaded at runtime with
//! defaults for every setting.
//!
//! ## Configuration Sources
//!
//! 1. **KV Storage**: Primary configuration source stored under the "config" key
//! 2. **Defaults**: Used when the key is absent, and per field when the stored
//!    document omits a field
//!
//! ## Configuration Options
//!
//! - `database_name`: Name of the D1 database binding
//! - `bucket_name`: Name of the R2 bucket binding
//! - `max_file_size`: Maximum allowed upload size in bytes (default: 100MB)
//! - `default_is_public`: Visibility applied when an upload omits `is_public`
//! - `session_ttl_hours`: Lifetime of issued bearer credentials
//! - `default_page_size` / `max_page_size`: Activity log pagination
//! - `bootstrap_admin`: Credentials used to provision the first Admin account
//!
//! ## Example
//!
//! ```rust,ignore
//! let kv = env.kv("STORAGE_CONFIG")?;
//! let config = Config::load(&kv).await?;
//! println!("Max file size: {} bytes", config.max_file_size);
//! ```

use crate::constants::{
    ASSET_DB_NAME, CONFIG_KV_KEY, DEFAULT_MAX_FILE_SIZE, DEFAULT_PAGE_SIZE,
    DEFAULT_SESSION_TTL_HOURS, MAX_PAGE_SIZE, STORAGE_BUCKET_NAME,
};
use serde::{Deserialize, Serialize};
use worker::kv::KvStore;
use worker::{console_log, Result};

/// Configuration structure for the asset service.
///
/// All fields are public to allow easy access throughout the application.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the D1 database binding. Must match the binding name in wrangler.toml.
    pub database_name: String,

    /// Name of the R2 bucket binding used as the blob store.
    pub bucket_name: String,

    /// Maximum allowed file size in bytes. Uploads above this limit fail validation.
    pub max_file_size: u64,

    /// Visibility assigned to new assets whose payload has no `is_public` value.
    pub default_is_public: bool,

    /// Lifetime of a bearer credential issued at login.
    pub session_ttl_hours: i64,

    /// Page size used when an activity log request does not specify one.
    pub default_page_size: u32,

    /// Largest page size a client may request.
    pub max_page_size: u32,

    /// First Admin account, provisioned on login while the user table is empty.
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

/// Credentials for the initial Admin account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_name: ASSET_DB_NAME.to_string(),
            bucket_name: STORAGE_BUCKET_NAME.to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            default_is_public: true,
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            bootstrap_admin: None,
        }
    }
}

impl Config {
    /// Loads configuration from KV storage with fallback to defaults.
    ///
    /// # Configuration Format
    ///
    /// ```json
    /// {
    ///   "database_name": "ASSET_DB",
    ///   "max_file_size": 104857600,
    ///   "default_is_public": true,
    ///   "bootstrap_admin": { "username": "admin", "email": "admin@example.com", "password": "..." }
    /// }
    /// ```
    ///
    /// # Error Handling
    ///
    /// - If KV storage is accessible but no config exists, uses defaults
    /// - If KV storage throws an error, the error is propagated up
    /// - Invalid JSON in storage will cause parsing errors
    pub async fn load(kv: &KvStore) -> Result<Self> {
        match kv.get(CONFIG_KV_KEY).json().await? {
            Some(config) => {
                console_log!("Configuration loaded from KV storage");
                Ok(config)
            }
            None => {
                console_log!("Config not found in KV, using default");
                Ok(Self::default())
            }
        }
    }

    /// Clamps a requested page size into `1..=max_page_size`.
    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}
