//! # Services
//!
//! Orchestration between the policy gate, the normalizer, the stores and the
//! audit log. Services work on trait objects only, so the same code runs
//! against D1/R2 in the worker and against in-memory stores in tests.
//!
//! ## Request Flow
//!
//! ```text
//! Handler → RequestContext → Service → policy gate → normalize → validate
//!         → persist → audit → response
//! ```

use crate::logging::Logger;
use crate::models::{ActionKind, Caller, NewAuditEntry};

pub mod activity;
pub mod assets;
pub mod users;

pub use activity::ActivityService;
pub use assets::{AssetService, UploadRequest};
pub use users::{LoginResponse, NewUser, UserService};

/// Per-request facts every service call needs.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub caller: Caller,
    pub origin: Option<String>,
    pub logger: Logger,
}

impl RequestContext {
    pub fn new(caller: Caller, origin: Option<String>, logger: Logger) -> Self {
        Self {
            caller,
            origin,
            logger,
        }
    }

    /// Starts an audit entry attributed to this request's caller.
    pub fn audit_entry(&self, action: ActionKind, description: impl Into<String>) -> NewAuditEntry {
        NewAuditEntry::new(&self.caller, action, description).with_origin(self.origin.as_deref())
    }
}
