// ABOUTME: Centralized error handling system with detailed context and logging
// ABOUTME: Maps domain failures to structured JSON responses without leaking internals

use axum::{
    extract::multipart::MultipartRejection,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;

/// Per-field validation messages, keyed by payload field name.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug)]
pub enum AppError {
    Database(sea_orm::DbErr),
    Validation(FieldErrors),
    InvalidCredentials(String),
    Unauthorized(String),
    Conflict(String),
    NotFound(String),
    MethodNotAllowed,
    Internal(String),
}

impl AppError {
    /// Validation failure on a single field.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        AppError::Validation(errors)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) | AppError::InvalidCredentials(_) | AppError::Conflict(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Database(err) => write!(f, "Database error: {}", err),
            AppError::Validation(fields) => {
                let names: Vec<&str> = fields.keys().map(String::as_str).collect();
                write!(f, "Validation failed: {}", names.join(", "))
            }
            AppError::InvalidCredentials(msg) => write!(f, "Invalid credentials: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::MethodNotAllowed => write!(f, "Method not allowed"),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut fields = None;

        let error_message = match &self {
            AppError::Database(_) => {
                tracing::error!("Database error: {}", self);
                "Database operation failed".to_string()
            }
            AppError::Validation(errors) => {
                tracing::info!("{}", self);
                fields = Some(errors.clone());
                "Invalid input".to_string()
            }
            AppError::InvalidCredentials(msg) => {
                tracing::warn!("Rejected credentials: {}", msg);
                "Unable to authenticate with provided credentials".to_string()
            }
            AppError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized access: {}", msg);
                "Authentication required".to_string()
            }
            AppError::Conflict(msg) => {
                tracing::info!("Conflict: {}", msg);
                msg.clone()
            }
            AppError::NotFound(msg) => {
                tracing::info!("Resource not found: {}", msg);
                "Resource not found".to_string()
            }
            AppError::MethodNotAllowed => "Method not allowed".to_string(),
            AppError::Internal(_) => {
                tracing::error!("Internal error: {}", self);
                "Internal server error".to_string()
            }
        };

        let mut body = json!({
            "error": error_message,
            "status": status.as_u16()
        });
        if let Some(fields) = fields {
            body["fields"] = json!(fields);
        }

        (status, Json(body)).into_response()
    }
}

// Conversion implementations
impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("I/O failure: {}", err))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Background task failed: {}", err))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::invalid("non_field_errors", rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::invalid("image", rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::NotFound(rejection.body_text())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}
