// handlers/admin/users.rs - /api/admin/users handlers

use axum::extract::{Path, State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use super::paged;
use crate::app::AppState;
use crate::auth::Role;
use crate::database::models::{AdminUser, Settings};
use crate::database::{Filter, StoreError};
use crate::error::AppError;
use crate::middleware::validate::{require_email, require_text};
use crate::middleware::{ApiResponse, ApiResult, Caller, Page, PageQuery, QueryParams, ValidJson, Validate};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub role: Option<Role>,
    pub team_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateUser {
    pub email: String,
    pub display_name: Option<String>,
    pub role: Option<Role>,
    pub team_id: Option<String>,
}

impl Validate for CreateUser {
    fn validate(&self) -> Result<(), AppError> {
        require_email("email", &self.email)?;
        if let Some(name) = &self.display_name {
            require_text("displayName", name, 120)?;
        }
        if let Some(team_id) = &self.team_id {
            require_text("teamId", team_id, 64)?;
        }
        Ok(())
    }
}

/// Profile fields only; role changes go through `PUT /users/:id/role`.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
}

impl Validate for UpdateUser {
    fn validate(&self) -> Result<(), AppError> {
        if self.display_name.is_none() && self.team_id.is_none() && self.disabled.is_none() {
            return Err(AppError::validation("at least one of displayName, teamId, disabled is required"));
        }
        if let Some(name) = &self.display_name {
            require_text("displayName", name, 120)?;
        }
        if let Some(team_id) = &self.team_id {
            require_text("teamId", team_id, 64)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeRole {
    pub role: Role,
}

impl Validate for ChangeRole {
    fn validate(&self) -> Result<(), AppError> {
        Ok(())
    }
}

async fn ensure_team_exists(state: &AppState, team_id: &str) -> Result<(), AppError> {
    if state.teams().find(team_id).await?.is_none() {
        return Err(AppError::validation(format!("teamId '{team_id}' does not reference an existing team")));
    }
    Ok(())
}

/// GET /api/admin/users
pub async fn list(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<UserListQuery>,
) -> ApiResult<Page<AdminUser>> {
    let (page, limit) = PageQuery { page: query.page, limit: query.limit }.resolve(&state.config.pagination)?;

    let mut filter = Filter::new();
    if let Some(role) = query.role {
        filter.insert("role".to_string(), role.as_str().to_string());
    }
    if let Some(team_id) = query.team_id {
        filter.insert("teamId".to_string(), team_id);
    }

    let users = state.users().list(&filter).await?;
    Ok(paged(&users, page, limit))
}

/// GET /api/admin/users/:id
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<AdminUser> {
    Ok(ApiResponse::success(state.users().get_404(&id).await?))
}

/// POST /api/admin/users
pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    ValidJson(command): ValidJson<CreateUser>,
) -> ApiResult<AdminUser> {
    let users = state.users();
    let email = command.email.trim().to_lowercase();

    let mut by_email = Filter::new();
    by_email.insert("email".to_string(), email.clone());
    if !users.list(&by_email).await?.is_empty() {
        return Err(AppError::conflict(format!("a user with email '{email}' already exists")));
    }
    if let Some(team_id) = &command.team_id {
        ensure_team_exists(&state, team_id).await?;
    }

    let role = match command.role {
        Some(role) => role,
        None => state
            .settings()
            .find(Settings::DOCUMENT_ID)
            .await?
            .unwrap_or_default()
            .default_role,
    };

    let now = Utc::now();
    let user = AdminUser {
        user_id: Uuid::new_v4().to_string(),
        email,
        display_name: command.display_name,
        role,
        team_id: command.team_id,
        disabled: false,
        created_at: now,
        updated_at: now,
    };

    let user = state
        .audit
        .commit(
            async {
                users.create(&user.user_id, &user).await?;
                Ok::<_, StoreError>(user)
            },
            |user| {
                caller
                    .audit("user_created", "user", &user.user_id)
                    .details(json!({ "email": user.email, "role": user.role }))
            },
        )
        .await?;

    info!("User {} created with role {} by {}", user.user_id, user.role, caller.identity.user_id);
    Ok(ApiResponse::success(user))
}

/// PATCH /api/admin/users/:id
pub async fn update(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    ValidJson(command): ValidJson<UpdateUser>,
) -> ApiResult<AdminUser> {
    if let Some(team_id) = &command.team_id {
        ensure_team_exists(&state, team_id).await?;
    }

    let changes = serde_json::to_value(&command).map_err(anyhow::Error::from)?;
    let mut patch = match changes.clone() {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    patch.insert("updatedAt".to_string(), json!(Utc::now()));

    let users = state.users();
    let user = state
        .audit
        .commit(users.update(&id, patch), |user| {
            caller
                .audit("user_updated", "user", &user.user_id)
                .details(json!({ "changes": changes }))
        })
        .await?;

    info!("User {} updated by {}", user.user_id, caller.identity.user_id);
    Ok(ApiResponse::success(user))
}

/// PUT /api/admin/users/:id/role
pub async fn change_role(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    ValidJson(command): ValidJson<ChangeRole>,
) -> ApiResult<AdminUser> {
    if id == caller.identity.user_id {
        warn!("User {} attempted to change their own role", id);
        return Err(AppError::validation("you cannot change your own role"));
    }

    let users = state.users();
    let (previous, user) = state
        .audit
        .commit(
            async {
                let previous = users.get_404(&id).await?.role;
                let mut patch = Map::new();
                patch.insert("role".to_string(), json!(command.role));
                patch.insert("updatedAt".to_string(), json!(Utc::now()));
                let user = users.update(&id, patch).await?;
                Ok::<_, StoreError>((previous, user))
            },
            |(previous, user)| {
                caller
                    .audit("user_role_changed", "user", &user.user_id)
                    .details(json!({ "previousRole": previous, "role": user.role }))
            },
        )
        .await?;

    info!(
        "User {} role changed {} -> {} by {}",
        user.user_id, previous, user.role, caller.identity.user_id
    );
    Ok(ApiResponse::success(user))
}
