// handlers/admin/mod.rs - /api/admin route table
//
// Reads of feature flags are open to any authenticated caller; everything
// else, and every mutation, requires super_admin.

use axum::routing::{get, patch, post, put};
use serde::Serialize;

use crate::app::AdminRouter;
use crate::auth::Role;
use crate::middleware::{response, ApiResponse, Page, Policy};

pub mod audit_logs;
pub mod feature_flags;
pub mod me;
pub mod settings;
pub mod teams;
pub mod users;

const SUPER_ADMIN: Policy = Policy::AtLeast(Role::SuperAdmin);

pub fn routes(admin: AdminRouter) -> AdminRouter {
    admin
        .route("/me", Policy::Authenticated, get(me::me_get))
        // Feature flags
        .route("/feature-flags", Policy::Authenticated, get(feature_flags::list))
        .route("/feature-flags", SUPER_ADMIN, post(feature_flags::create))
        .route("/feature-flags/:id", Policy::Authenticated, get(feature_flags::show))
        .route(
            "/feature-flags/:id",
            SUPER_ADMIN,
            patch(feature_flags::update).delete(feature_flags::delete),
        )
        // Users
        .route("/users", SUPER_ADMIN, get(users::list).post(users::create))
        .route("/users/:id", SUPER_ADMIN, get(users::show).patch(users::update))
        .route("/users/:id/role", SUPER_ADMIN, put(users::change_role))
        // Teams
        .route("/teams", SUPER_ADMIN, get(teams::list).post(teams::create))
        .route("/teams/:id", SUPER_ADMIN, get(teams::show).delete(teams::delete))
        // Platform settings
        .route("/settings", SUPER_ADMIN, get(settings::show).put(settings::update))
        // Reporting
        .route("/audit-logs", SUPER_ADMIN, get(audit_logs::list))
}

/// One page of `items` in the paginated envelope.
fn paged<T: Serialize + Clone>(items: &[T], page: u32, limit: u32) -> ApiResponse<Page<T>> {
    response::paginated(response::slice_page(items, page, limit), items.len(), page, limit).into()
}
