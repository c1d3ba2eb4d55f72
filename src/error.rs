//! Typed errors and their HTTP status mapping. Envelopes for errors are built in `response`.

use crate::filter::FilterError;
use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid primary key: resource {resource} column {column}")]
    InvalidPrimaryKey { resource: String, column: String },
    #[error("duplicate {kind}: {name}")]
    Duplicate { kind: &'static str, name: String },
    #[error("unknown column type '{type_name}' for {resource}.{column}")]
    UnknownColumnType {
        resource: String,
        column: String,
        type_name: String,
    },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// One per-field message of a validation failure. `field` is the client-facing (camelCase) name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        FieldError {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Message is an i18n key or free text; translated when the envelope is built.
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("invalid id: {0}")]
    InvalidId(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation: {} field error(s)", errors.len())]
    Validation { errors: Vec<FieldError> },
    #[error("filter: {0}")]
    Filter(#[from] FilterError),
    /// Invariant violated by calling code, not by user input.
    #[error("programming error: {0}")]
    Programming(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

impl AppError {
    pub fn validation(errors: Vec<FieldError>) -> Self {
        AppError::Validation { errors }
    }

    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            errors: vec![FieldError::new(field, message)],
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::InvalidId(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation { .. } | AppError::Filter(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Db(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Config(_) | AppError::Programming(_) | AppError::Db(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::InvalidId(_) => "invalid_id",
            AppError::NotFound(_) => "not_found",
            AppError::Validation { .. } => "validation_error",
            AppError::Filter(_) => "filter_error",
            AppError::Programming(_) => "programming_error",
            AppError::Db(sqlx::Error::RowNotFound) => "not_found",
            AppError::Db(_) => "database_error",
        }
    }

    /// i18n key of the user-facing message.
    pub fn message_key(&self) -> String {
        match self {
            AppError::BadRequest(key) => key.clone(),
            AppError::InvalidId(_) => "error_bad_request".into(),
            AppError::NotFound(_) | AppError::Db(sqlx::Error::RowNotFound) => "error_not_found".into(),
            AppError::Validation { .. } | AppError::Filter(_) => "error_validation".into(),
            AppError::Config(_) | AppError::Programming(_) | AppError::Db(_) => "error_internal".into(),
        }
    }

    /// Per-field details for the `errors` member of an error envelope.
    pub fn field_errors(&self) -> Option<Vec<FieldError>> {
        match self {
            AppError::Validation { errors } => Some(errors.clone()),
            AppError::Filter(e) => Some(vec![FieldError::new("filters", e.to_string())]),
            AppError::InvalidId(raw) => Some(vec![FieldError::new("id", format!("'{}' is not a valid id", raw))]),
            _ => None,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }
}
