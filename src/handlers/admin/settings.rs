// handlers/admin/settings.rs - /api/admin/settings handlers
//
// Settings are a single document; reads fall back to defaults until the
// first update stores one.

use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::app::AppState;
use crate::auth::Role;
use crate::database::models::Settings;
use crate::database::StoreError;
use crate::error::AppError;
use crate::middleware::validate::require_email;
use crate::middleware::{ApiResponse, ApiResult, Caller, ValidJson, Validate};

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signups_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support_email: Option<String>,
}

impl Validate for UpdateSettings {
    fn validate(&self) -> Result<(), AppError> {
        if self.maintenance_mode.is_none()
            && self.signups_enabled.is_none()
            && self.default_role.is_none()
            && self.support_email.is_none()
        {
            return Err(AppError::validation("no settings supplied"));
        }
        if let Some(email) = &self.support_email {
            require_email("supportEmail", email)?;
        }
        Ok(())
    }
}

impl UpdateSettings {
    fn apply(&self, settings: &mut Settings) {
        if let Some(value) = self.maintenance_mode {
            settings.maintenance_mode = value;
        }
        if let Some(value) = self.signups_enabled {
            settings.signups_enabled = value;
        }
        if let Some(value) = self.default_role {
            settings.default_role = value;
        }
        if let Some(value) = &self.support_email {
            settings.support_email = Some(value.trim().to_string());
        }
    }
}

/// GET /api/admin/settings
pub async fn show(State(state): State<AppState>) -> ApiResult<Settings> {
    let settings = state.settings().find(Settings::DOCUMENT_ID).await?.unwrap_or_default();
    Ok(ApiResponse::success(settings))
}

/// PUT /api/admin/settings
pub async fn update(
    State(state): State<AppState>,
    caller: Caller,
    ValidJson(command): ValidJson<UpdateSettings>,
) -> ApiResult<Settings> {
    let collection = state.settings();
    let mut settings = collection.find(Settings::DOCUMENT_ID).await?.unwrap_or_default();
    command.apply(&mut settings);
    settings.updated_by = Some(caller.identity.user_id.clone());
    settings.updated_at = Some(Utc::now());

    let settings = state
        .audit
        .commit(
            async {
                collection.put(Settings::DOCUMENT_ID, &settings).await?;
                Ok::<_, StoreError>(settings)
            },
            |_| {
                caller
                    .audit("settings_updated", "settings", Settings::DOCUMENT_ID)
                    .details(json!({ "changes": command }))
            },
        )
        .await?;

    info!("Settings updated by {}", caller.identity.user_id);
    Ok(ApiResponse::success(settings))
}
