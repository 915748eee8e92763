use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::validation::FieldError;

/// StoreError
///
/// Failure reported by a persistence collaborator. `UniqueViolation` is the only
/// variant callers are expected to recover from; everything else is a fault.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("store error: {0}")]
    Other(String),
}

impl StoreError {
    /// Converts a raw sqlx error, surfacing unique-index conflicts as `UniqueViolation`.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                return StoreError::UniqueViolation(constraint);
            }
        }
        StoreError::Database(err)
    }
}

/// AppError
///
/// The typed rejections a request can end in. Every variant is rendered into the
/// uniform `ErrorResponse` payload at the boundary; nothing else leaks to the client.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing, malformed or forged token, or a principal whose user is gone.
    #[error("{0}")]
    Authentication(String),
    /// Valid principal, but the subscription policy denies access.
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    Validation {
        message: String,
        details: Vec<String>,
    },
    /// Duplicate unique field (username, email).
    #[error("{0}")]
    Conflict(String),
    /// No-op subscribe/unsubscribe, including a lost creation race.
    #[error("{0}")]
    SubscriptionConflict(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::SubscriptionConflict(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn validation(message: impl Into<String>, errors: Vec<FieldError>) -> Self {
        AppError::Validation {
            message: message.into(),
            details: errors.iter().map(ToString::to_string).collect(),
        }
    }

    fn details(&self) -> Vec<String> {
        match self {
            AppError::Validation { details, .. } => details.clone(),
            other => vec![other.to_string()],
        }
    }
}

/// Store faults become 500s with a generic message; the cause is logged only.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "store operation failed");
        AppError::Internal("Internal server error".to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation {
            message: "Bad request".to_string(),
            details: vec![rejection.body_text()],
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation {
            message: "Bad request".to_string(),
            details: vec![rejection.body_text()],
        }
    }
}

/// ErrorResponse
///
/// Uniform error body returned for every rejected request.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorResponse {
    pub message: String,
    pub details: Vec<String>,
    pub status: u16,
    #[ts(type = "string")]
    pub timestamp: DateTime<Utc>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::Internal(_) => tracing::error!(%status, "request failed"),
            other => tracing::debug!(%status, reason = %other, "request rejected"),
        }

        let body = ErrorResponse {
            message: self.to_string(),
            details: self.details(),
            status: status.as_u16(),
            timestamp: Utc::now(),
        };
        (status, Json(body)).into_response()
    }
}
