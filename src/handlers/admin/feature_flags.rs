// handlers/admin/feature_flags.rs - /api/admin/feature-flags handlers

use axum::extract::{Path, State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;
use uuid::Uuid;

use super::paged;
use crate::app::AppState;
use crate::database::models::FeatureFlag;
use crate::database::{Filter, StoreError};
use crate::error::AppError;
use crate::middleware::validate::{require_slug, require_text};
use crate::middleware::{ApiResponse, ApiResult, Caller, Page, PageQuery, QueryParams, ValidJson, Validate};

#[derive(Debug, Deserialize)]
pub struct FlagListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateFeatureFlag {
    pub name: String,
    pub key: String,
    pub description: Option<String>,
    pub enabled: Option<bool>,
}

impl Validate for CreateFeatureFlag {
    fn validate(&self) -> Result<(), AppError> {
        require_text("name", &self.name, 120)?;
        require_slug("key", &self.key)?;
        if let Some(description) = &self.description {
            require_text("description", description, 1000)?;
        }
        Ok(())
    }
}

/// Partial update. `key` is immutable once created.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateFeatureFlag {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl Validate for UpdateFeatureFlag {
    fn validate(&self) -> Result<(), AppError> {
        if self.name.is_none() && self.description.is_none() && self.enabled.is_none() {
            return Err(AppError::validation("at least one of name, description, enabled is required"));
        }
        if let Some(name) = &self.name {
            require_text("name", name, 120)?;
        }
        if let Some(description) = &self.description {
            require_text("description", description, 1000)?;
        }
        Ok(())
    }
}

/// GET /api/admin/feature-flags
pub async fn list(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<FlagListQuery>,
) -> ApiResult<Page<FeatureFlag>> {
    let (page, limit) = PageQuery { page: query.page, limit: query.limit }.resolve(&state.config.pagination)?;

    let mut filter = Filter::new();
    if let Some(enabled) = query.enabled {
        filter.insert("enabled".to_string(), enabled.to_string());
    }

    let flags = state.feature_flags().list(&filter).await?;
    Ok(paged(&flags, page, limit))
}

/// GET /api/admin/feature-flags/:id
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<FeatureFlag> {
    Ok(ApiResponse::success(state.feature_flags().get_404(&id).await?))
}

/// POST /api/admin/feature-flags
pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    ValidJson(command): ValidJson<CreateFeatureFlag>,
) -> ApiResult<FeatureFlag> {
    let flags = state.feature_flags();

    let mut by_key = Filter::new();
    by_key.insert("key".to_string(), command.key.clone());
    if !flags.list(&by_key).await?.is_empty() {
        return Err(AppError::conflict(format!("feature flag key '{}' already exists", command.key)));
    }

    let now = Utc::now();
    let flag = FeatureFlag {
        flag_id: Uuid::new_v4().to_string(),
        name: command.name.trim().to_string(),
        key: command.key,
        description: command.description,
        enabled: command.enabled.unwrap_or(true),
        created_by: caller.identity.user_id.clone(),
        created_at: now,
        updated_at: now,
    };

    let flag = state
        .audit
        .commit(
            async {
                flags.create(&flag.flag_id, &flag).await?;
                Ok::<_, StoreError>(flag)
            },
            |flag| {
                caller
                    .audit("feature_flag_created", "feature_flag", &flag.flag_id)
                    .details(json!({ "name": flag.name, "key": flag.key, "enabled": flag.enabled }))
            },
        )
        .await?;

    info!("Feature flag '{}' created by {}", flag.key, caller.identity.user_id);
    Ok(ApiResponse::success(flag))
}

/// PATCH /api/admin/feature-flags/:id
pub async fn update(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    ValidJson(command): ValidJson<UpdateFeatureFlag>,
) -> ApiResult<FeatureFlag> {
    let changes = serde_json::to_value(&command).map_err(anyhow::Error::from)?;

    let mut patch = match changes.clone() {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    patch.insert("updatedAt".to_string(), json!(Utc::now()));

    let flags = state.feature_flags();
    let flag = state
        .audit
        .commit(flags.update(&id, patch), |flag| {
            caller
                .audit("feature_flag_updated", "feature_flag", &flag.flag_id)
                .details(json!({ "changes": changes }))
        })
        .await?;

    info!("Feature flag '{}' updated by {}", flag.key, caller.identity.user_id);
    Ok(ApiResponse::success(flag))
}

/// DELETE /api/admin/feature-flags/:id
pub async fn delete(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<FeatureFlag> {
    let flags = state.feature_flags();
    let flag = state
        .audit
        .commit(
            async {
                let flag = flags.get_404(&id).await?;
                flags.delete(&id).await?;
                Ok::<_, StoreError>(flag)
            },
            |flag| {
                caller
                    .audit("feature_flag_deleted", "feature_flag", &flag.flag_id)
                    .details(json!({ "key": flag.key }))
            },
        )
        .await?;

    info!("Feature flag '{}' deleted by {}", flag.key, caller.identity.user_id);
    Ok(ApiResponse::success(flag).with_message("Feature flag deleted"))
}
