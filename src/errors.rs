use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use worker::{Error as WorkerError, Response};

pub type AppResult<T> = Result<T, AppError>;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed: {} field(s) rejected", errors.len())]
    Validation { errors: Vec<FieldError> },
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },
    #[error("Forbidden: {message}")]
    Forbidden { message: String },
    #[error("Not found: {message}")]
    NotFound { message: String },
    #[error("Method not allowed: {message}")]
    MethodNotAllowed { message: String },
    #[error("Conflict: {message}")]
    Conflict { message: String },
    #[error("Internal error: {message}")]
    Internal { message: String },
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            errors: vec![FieldError::new(field, message)],
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        AppError::Unauthorized {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound {
            message: message.into(),
        }
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        AppError::MethodNotAllowed {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AppError::Internal {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation { .. } => 400,
            AppError::Unauthorized { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::MethodNotAllowed { .. } => 405,
            AppError::Conflict { .. } => 409,
            AppError::Internal { .. } | AppError::Worker(_) | AppError::Serialization(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "validation_error",
            AppError::Unauthorized { .. } => "unauthorized",
            AppError::Forbidden { .. } => "forbidden",
            AppError::NotFound { .. } => "not_found",
            AppError::MethodNotAllowed { .. } => "method_not_allowed",
            AppError::Conflict { .. } => "conflict",
            AppError::Internal { .. } | AppError::Worker(_) | AppError::Serialization(_) => {
                "internal_error"
            }
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// JSON body sent to the client. Server errors are reported without detail.
    pub fn body(&self) -> Value {
        match self {
            AppError::Validation { errors } => json!({
                "error": {
                    "code": self.code(),
                    "message": "Validation failed",
                    "fields": errors,
                }
            }),
            _ if self.is_server_error() => json!({
                "error": { "code": self.code(), "message": "Internal server error" }
            }),
            AppError::Unauthorized { message }
            | AppError::Forbidden { message }
            | AppError::NotFound { message }
            | AppError::MethodNotAllowed { message }
            | AppError::Conflict { message } => json!({
                "error": { "code": self.code(), "message": message }
            }),
            _ => json!({ "error": { "code": self.code() } }),
        }
    }

    pub fn to_response(&self) -> worker::Result<Response> {
        Ok(Response::from_json(&self.body())?.with_status(self.status_code()))
    }
}

impl From<AppError> for WorkerError {
    fn from(error: AppError) -> Self {
        match error {
            AppError::Worker(e) => e,
            other => WorkerError::RustError(other.to_string()),
        }
    }
}
