// handlers/admin/audit_logs.rs - GET /api/admin/audit-logs handler

use axum::extract::State;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;

use super::paged;
use crate::app::AppState;
use crate::audit::AuditRecord;
use crate::database::AuditFilter;
use crate::error::AppError;
use crate::middleware::{ApiResult, Page, PageQuery, QueryParams};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub user_id: Option<String>,
    pub resource: Option<String>,
    pub action: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

/// RFC 3339 timestamps, or bare `YYYY-MM-DD` dates covering the whole day.
fn parse_bound(field: &str, value: &str, bound: Bound) -> Result<DateTime<Utc>, AppError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("{field} must be an RFC 3339 timestamp or YYYY-MM-DD")))?;
    let time = match bound {
        Bound::Start => NaiveTime::MIN,
        Bound::End => NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN),
    };
    Ok(date.and_time(time).and_utc())
}

impl AuditLogQuery {
    fn filter(&self) -> Result<AuditFilter, AppError> {
        let start = self
            .start_date
            .as_deref()
            .map(|v| parse_bound("startDate", v, Bound::Start))
            .transpose()?;
        let end = self
            .end_date
            .as_deref()
            .map(|v| parse_bound("endDate", v, Bound::End))
            .transpose()?;

        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(AppError::validation("startDate must not be after endDate"));
            }
        }

        Ok(AuditFilter {
            user_id: self.user_id.clone(),
            resource: self.resource.clone(),
            action: self.action.clone(),
            start,
            end,
        })
    }
}

/// GET /api/admin/audit-logs - newest first
pub async fn list(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<AuditLogQuery>,
) -> ApiResult<Page<AuditRecord>> {
    let (page, limit) = PageQuery { page: query.page, limit: query.limit }.resolve(&state.config.pagination)?;
    let filter = query.filter()?;

    let records = state.audit_log.query(&filter).await?;
    Ok(paged(&records, page, limit))
}
