// HTTP API error types
use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

use crate::auth::{AuthError, Role};
use crate::database::StoreError;
use crate::middleware::response::error_envelope;

/// Every failure a handler or the gate can surface to a client.
#[derive(Debug, Error)]
pub enum AppError {
    // 401 Unauthorized
    #[error("Authentication required")]
    Unauthenticated,

    // 403 Forbidden
    #[error("Insufficient permissions")]
    Forbidden { required: Role, actual: Role },

    // 404 Not Found
    #[error("{0}")]
    NotFound(String),

    // 400 Bad Request
    #[error("{0}")]
    Validation(String),

    // 409 Conflict
    #[error("{0}")]
    Conflict(String),

    // 500 Internal Server Error
    #[error(transparent)]
    Unhandled(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }

    /// Get HTTP status code
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unhandled(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable reason clients can branch on
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "unauthenticated",
            AppError::Forbidden { .. } => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation",
            AppError::Conflict(_) => "conflict",
            AppError::Unhandled(_) => "internal",
        }
    }

    /// Client-safe message. Unhandled errors never leak their detail.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Unhandled(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unavailable(reason) => {
                tracing::error!("Identity service unavailable: {}", reason);
            }
            other => tracing::debug!("Credential refused: {}", other),
        }
        AppError::Unauthenticated
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { collection, id } => {
                AppError::NotFound(format!("{} '{}' not found", collection, id))
            }
            StoreError::AlreadyExists { collection, id } => {
                AppError::Conflict(format!("{} '{}' already exists", collection, id))
            }
            err @ StoreError::Duplicate { .. } => AppError::Conflict(err.to_string()),
            other => AppError::Unhandled(other.into()),
        }
    }
}

// Automatic HTTP response conversion for Axum
impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        match &self {
            AppError::Unhandled(err) => tracing::error!("Unhandled error: {:#}", err),
            AppError::Forbidden { required, actual } => {
                tracing::warn!(%required, %actual, "Request rejected: role below requirement")
            }
            _ => {}
        }
        let envelope = error_envelope(self.public_message(), self.code());
        (status, axum::Json(envelope)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_taxonomy() {
        assert_eq!(AppError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Forbidden { required: Role::SuperAdmin, actual: Role::Member }.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AppError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::Unhandled(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unhandled_message_is_generic() {
        let err = AppError::Unhandled(anyhow::anyhow!("connection string postgres://secret"));
        assert!(!err.public_message().contains("secret"));
    }

    #[test]
    fn auth_errors_collapse_to_unauthenticated() {
        let err: AppError = AuthError::Expired.into();
        assert!(matches!(err, AppError::Unauthenticated));
        assert_eq!(err.public_message(), "Authentication required");
    }

    #[test]
    fn duplicate_unique_field_maps_to_409() {
        let err: AppError = StoreError::Duplicate {
            collection: "feature_flags",
            field: "key",
            value: "x-flag".into(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert!(err.public_message().contains("x-flag"));
    }

    #[test]
    fn store_not_found_maps_to_404() {
        let err: AppError = StoreError::NotFound { collection: "feature_flags", id: "f1".into() }.into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
