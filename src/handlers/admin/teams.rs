// handlers/admin/teams.rs - /api/admin/teams handlers

use axum::extract::{Path, State};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::paged;
use crate::app::AppState;
use crate::database::models::Team;
use crate::database::{Filter, StoreError};
use crate::error::AppError;
use crate::middleware::validate::require_text;
use crate::middleware::{ApiResponse, ApiResult, Caller, Page, PageQuery, QueryParams, ValidJson, Validate};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateTeam {
    pub name: String,
    pub owner_id: String,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

impl Validate for CreateTeam {
    fn validate(&self) -> Result<(), AppError> {
        require_text("name", &self.name, 120)?;
        require_text("ownerId", &self.owner_id, 64)?;
        for member in &self.member_ids {
            require_text("memberIds[]", member, 64)?;
        }
        Ok(())
    }
}

/// GET /api/admin/teams
pub async fn list(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<PageQuery>,
) -> ApiResult<Page<Team>> {
    let (page, limit) = query.resolve(&state.config.pagination)?;
    let teams = state.teams().list(&Filter::new()).await?;
    Ok(paged(&teams, page, limit))
}

/// GET /api/admin/teams/:id
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Team> {
    Ok(ApiResponse::success(state.teams().get_404(&id).await?))
}

/// POST /api/admin/teams
pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    ValidJson(command): ValidJson<CreateTeam>,
) -> ApiResult<Team> {
    if state.users().find(&command.owner_id).await?.is_none() {
        return Err(AppError::validation(format!(
            "ownerId '{}' does not reference an existing user",
            command.owner_id
        )));
    }

    // The owner is always a member.
    let mut member_ids = vec![command.owner_id.clone()];
    for member in command.member_ids {
        if !member_ids.contains(&member) {
            member_ids.push(member);
        }
    }

    let team = Team {
        team_id: Uuid::new_v4().to_string(),
        name: command.name.trim().to_string(),
        owner_id: command.owner_id,
        member_ids,
        created_at: Utc::now(),
    };

    let teams = state.teams();
    let team = state
        .audit
        .commit(
            async {
                teams.create(&team.team_id, &team).await?;
                Ok::<_, StoreError>(team)
            },
            |team| {
                caller
                    .audit("team_created", "team", &team.team_id)
                    .details(json!({ "name": team.name, "ownerId": team.owner_id }))
            },
        )
        .await?;

    info!("Team {} created by {}", team.team_id, caller.identity.user_id);
    Ok(ApiResponse::success(team))
}

/// DELETE /api/admin/teams/:id
pub async fn delete(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Team> {
    let teams = state.teams();
    let team = state
        .audit
        .commit(
            async {
                let team = teams.get_404(&id).await?;
                teams.delete(&id).await?;
                Ok::<_, StoreError>(team)
            },
            |team| {
                caller
                    .audit("team_deleted", "team", &team.team_id)
                    .details(json!({ "name": team.name }))
            },
        )
        .await?;

    info!("Team {} deleted by {}", team.team_id, caller.identity.user_id);
    Ok(ApiResponse::success(team).with_message("Team deleted"))
}
