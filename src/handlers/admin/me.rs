// handlers/admin/me.rs - GET /api/admin/me handler

use crate::auth::CallerIdentity;
use crate::middleware::{ApiResponse, ApiResult, Caller};

/// The identity the gate resolved for this request.
pub async fn me_get(caller: Caller) -> ApiResult<CallerIdentity> {
    Ok(ApiResponse::success(caller.identity))
}
