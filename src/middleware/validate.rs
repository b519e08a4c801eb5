use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Query, Request,
    },
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// A request body that knows how to check itself once deserialized.
pub trait Validate {
    fn validate(&self) -> Result<(), AppError>;
}

/// JSON body extractor producing a typed, validated command. Schema mismatches
/// and failed checks both surface as 400 `validation` envelopes.
#[derive(Debug)]
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = AppError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(command) = Json::<T>::from_request(request, state)
            .await
            .map_err(|rejection: JsonRejection| AppError::validation(rejection.body_text()))?;

        command.validate()?;
        Ok(ValidJson(command))
    }
}

/// Query string extractor whose rejections use the error envelope instead of
/// axum's plain-text body.
#[derive(Debug)]
pub struct QueryParams<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: QueryRejection| AppError::validation(rejection.body_text()))?;
        Ok(QueryParams(params))
    }
}

/// Field-level helpers shared by the command types.
pub(crate) fn require_text(field: &str, value: &str, max_len: usize) -> Result<(), AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    if trimmed.chars().count() > max_len {
        return Err(AppError::validation(format!("{field} must be at most {max_len} characters")));
    }
    Ok(())
}

pub(crate) fn require_slug(field: &str, value: &str) -> Result<(), AppError> {
    require_text(field, value, 64)?;
    let valid = value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if !valid {
        return Err(AppError::validation(format!(
            "{field} may only contain lowercase letters, digits, '-' and '_'"
        )));
    }
    Ok(())
}

pub(crate) fn require_email(field: &str, value: &str) -> Result<(), AppError> {
    require_text(field, value, 254)?;
    match value.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(AppError::validation(format!("{field} must be an email address"))),
    }
}
