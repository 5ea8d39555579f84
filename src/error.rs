//! Application error types

use crate::validation::FieldError;
use serde::Serialize;
use thiserror::Error;

/// Structured validation failure carrying per-field errors
#[derive(Debug, Clone, Serialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    /// Names of the offending fields, in reported order
    pub fn fields(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.field.clone()).collect()
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let summary: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", summary.join("; "))
    }
}

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Plugin error: {0}")]
    Plugin(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Wrap a list of field errors as a validation failure
    pub fn validation(errors: Vec<FieldError>) -> Self {
        AppError::Validation(ValidationErrors::new(errors))
    }
}

/// Serializable error response for the presentation layer
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
}

impl From<AppError> for ErrorResponse {
    fn from(err: AppError) -> Self {
        let (code, fields) = match &err {
            AppError::Database(_) => ("DATABASE_ERROR", None),
            AppError::Serialization(_) => ("SERIALIZATION_ERROR", None),
            AppError::Http(_) => ("HTTP_ERROR", None),
            AppError::Validation(v) => ("VALIDATION_ERROR", Some(v.errors.clone())),
            AppError::NotFound(_) => ("NOT_FOUND", None),
            AppError::Plugin(_) => ("PLUGIN_ERROR", None),
            AppError::Unsupported(_) => ("UNSUPPORTED", None),
            AppError::Config(_) => ("CONFIG_ERROR", None),
            AppError::Io(_) => ("IO_ERROR", None),
            AppError::Internal(_) => ("INTERNAL_ERROR", None),
        };

        ErrorResponse {
            code: code.to_string(),
            message: err.to_string(),
            fields,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
