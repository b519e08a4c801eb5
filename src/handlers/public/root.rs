// handlers/public/root.rs - GET / handler

use axum::response::Json;
use serde_json::{json, Value};

pub async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Admin API (Rust)",
            "version": version,
            "description": "Role-gated administrative backend with an append-only audit trail",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "me": "/api/admin/me (authenticated)",
                "feature_flags": "/api/admin/feature-flags[/:id] (read: authenticated, write: super_admin)",
                "users": "/api/admin/users[/:id[/role]] (super_admin)",
                "teams": "/api/admin/teams[/:id] (super_admin)",
                "settings": "/api/admin/settings (super_admin)",
                "audit_logs": "/api/admin/audit-logs (super_admin)",
            }
        }
    }))
}
