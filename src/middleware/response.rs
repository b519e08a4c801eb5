use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::PaginationConfig;
use crate::error::AppError;

/// The one wire shape every endpoint answers with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub fn success<T: Serialize>(data: T, message: Option<String>) -> Envelope<T> {
    Envelope {
        success: true,
        data: Some(data),
        error: None,
        code: None,
        message,
    }
}

/// Failure envelope carrying a client-safe message and a machine-readable code.
pub fn error_envelope(message: impl Into<String>, code: &'static str) -> Envelope<()> {
    Envelope {
        success: false,
        data: None,
        error: Some(message.into()),
        code: Some(code),
        message: None,
    }
}

/// Failure response for an explicit status code.
pub fn error(message: impl Into<String>, status: StatusCode) -> Response {
    (status, Json(error_envelope(message, code_for_status(status)))).into_response()
}

fn code_for_status(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "validation",
        StatusCode::UNAUTHORIZED => "unauthenticated",
        StatusCode::FORBIDDEN => "forbidden",
        StatusCode::NOT_FOUND => "not_found",
        StatusCode::METHOD_NOT_ALLOWED => "method_not_allowed",
        StatusCode::CONFLICT => "conflict",
        s if s.is_client_error() => "client_error",
        _ => "internal",
    }
}

/// Convert any error into the uniform error envelope. Errors that do not
/// carry a status of their own become 500s.
pub fn handle_api_error(err: impl Into<AppError>) -> Response {
    let err = match err.into() {
        AppError::Unhandled(inner) => match inner.downcast::<AppError>() {
            Ok(specific) => specific,
            Err(inner) => AppError::Unhandled(inner),
        },
        other => other,
    };
    err.into_response()
}

/// One page of a collection plus the metadata needed to fetch the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
}

/// Shape an already-sliced page. Slicing is the caller's job, see [`slice_page`].
pub fn paginated<T: Serialize>(items: Vec<T>, total: usize, page: u32, limit: u32) -> Envelope<Page<T>> {
    success(Page { items, total, page, limit }, None)
}

/// Items `(page-1)*limit .. (page-1)*limit+limit`, clamped to the input.
pub fn slice_page<T: Clone>(items: &[T], page: u32, limit: u32) -> Vec<T> {
    let start = (page.saturating_sub(1) as usize).saturating_mul(limit as usize);
    items.iter().skip(start).take(limit as usize).cloned().collect()
}

/// `page` / `limit` query parameters as they arrive on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    /// Apply defaults and bounds: page defaults to 1, limit to the configured
    /// default and is capped at the configured maximum.
    pub fn resolve(&self, config: &PaginationConfig) -> Result<(u32, u32), AppError> {
        let page = self.page.unwrap_or(1);
        let limit = self.limit.unwrap_or(config.default_limit as i64);

        if page < 1 || page > u32::MAX as i64 {
            return Err(AppError::validation("page must be a positive integer"));
        }
        if limit < 1 {
            return Err(AppError::validation("limit must be a positive integer"));
        }

        Ok((page as u32, limit.min(config.max_limit as i64) as u32))
    }
}

/// Success response with an optional status override, wrapped in the envelope.
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub envelope: Envelope<T>,
    pub status_code: Option<StatusCode>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a successful API response with default 200 status
    pub fn success(data: T) -> Self {
        Self {
            envelope: success(data, None),
            status_code: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.envelope.message = Some(message.into());
        self
    }
}

impl<T: Serialize> From<Envelope<T>> for ApiResponse<T> {
    fn from(envelope: Envelope<T>) -> Self {
        Self {
            envelope,
            status_code: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status_code.unwrap_or(StatusCode::OK);

        // Serialize up front so a bad payload still yields an envelope
        match serde_json::to_value(&self.envelope) {
            Ok(body) => (status, Json(body)).into_response(),
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "success": false,
                        "error": "Failed to serialize response data",
                        "code": "internal"
                    })),
                )
                    .into_response()
            }
        }
    }
}

// Convenience type alias
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;
