use crate::db::errors::DbError;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error as ThisError;
use utoipa::ToSchema;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided, or the credential was rejected
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Authenticated, but the caller's role does not allow the operation
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// The tenant's trial ran out or its subscription lapsed; writes are refused
    #[error("Subscription expired")]
    SubscriptionExpired,

    /// Invalid request data, with the offending fields
    #[error("{message}")]
    Validation { message: String, fields: Vec<FieldError> },

    /// Requested resource not found (or owned by another organization)
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Conflict error, e.g., for unique constraint violations
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Too many requests")]
    TooManyRequests { retry_after_secs: u64 },

    /// A scheduled job pass failed
    #[error("Job {job} failed")]
    Cron {
        job: String,
        #[source]
        source: anyhow::Error,
    },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One offending input field in a `VALIDATION_ERROR` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
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

/// Wire shape of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable kind, e.g. `NOT_FOUND`
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

impl Error {
    /// Shorthand for a validation failure on a single field.
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Error::Validation {
            message: format!("Invalid {field}: {message}"),
            fields: vec![FieldError::new(field, message)],
        }
    }

    pub fn not_found(resource: &str, id: impl ToString) -> Self {
        Error::NotFound {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::Forbidden { .. } | Error::SubscriptionExpired => StatusCode::FORBIDDEN,
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::Cron { .. } | Error::Internal { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. }
                | DbError::CheckViolation { .. }
                | DbError::InvalidReference { .. }
                | DbError::InvalidValue { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Machine-readable error kind surfaced to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Unauthenticated { .. } => "UNAUTHORIZED",
            Error::Forbidden { .. } => "FORBIDDEN",
            Error::SubscriptionExpired => "SUBSCRIPTION_EXPIRED",
            Error::Validation { .. } => "VALIDATION_ERROR",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Conflict { .. } => "DUPLICATE",
            Error::TooManyRequests { .. } => "RATE_LIMITED",
            Error::Cron { .. } => "CRON_ERROR",
            Error::Internal { .. } | Error::Other(_) => "INTERNAL_ERROR",
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "NOT_FOUND",
                DbError::UniqueViolation { .. } => "DUPLICATE",
                DbError::ForeignKeyViolation { .. }
                | DbError::CheckViolation { .. }
                | DbError::InvalidReference { .. }
                | DbError::InvalidValue { .. } => "VALIDATION_ERROR",
                DbError::Other(_) => "INTERNAL_ERROR",
            },
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::Forbidden { message } => message.clone(),
            Error::SubscriptionExpired => "Your subscription has expired. Please update billing to continue.".to_string(),
            Error::Validation { message, .. } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::Conflict { message } => message.clone(),
            Error::TooManyRequests { .. } => "Too many requests, please slow down".to_string(),
            Error::Cron { job, .. } => format!("Job {job} failed"),
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { constraint, .. } => match constraint.as_deref() {
                    Some("contact_groups_name_unique") => "A group with this name already exists".to_string(),
                    Some("tags_name_unique") => "A tag with this name already exists".to_string(),
                    Some("pipeline_stages_position_unique") => "Another stage already occupies this position".to_string(),
                    _ => "Resource already exists".to_string(),
                },
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::InvalidReference { field } => format!("Invalid {field}: not found"),
                DbError::InvalidValue { field, message } => format!("Invalid {field}: {message}"),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
        }
    }

    fn details(&self) -> Option<Vec<FieldError>> {
        match self {
            Error::Validation { fields, .. } if !fields.is_empty() => Some(fields.clone()),
            Error::Database(DbError::InvalidReference { field }) => Some(vec![FieldError::new(*field, "not found")]),
            Error::Database(DbError::InvalidValue { field, message }) => Some(vec![FieldError::new(*field, *message)]),
            _ => None,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) | Error::Cron { .. } => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) | Error::Conflict { .. } => {
                tracing::warn!("Constraint error: {}", self);
            }
            Error::Unauthenticated { .. } | Error::Forbidden { .. } | Error::SubscriptionExpired => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::Validation { .. } | Error::NotFound { .. } | Error::TooManyRequests { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.user_message(),
                details: self.details(),
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let Error::TooManyRequests { retry_after_secs } = self
            && let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
