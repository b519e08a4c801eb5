use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Role;

/// Platform-wide settings, stored as a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub maintenance_mode: bool,
    pub signups_enabled: bool,
    pub default_role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Settings {
    pub const DOCUMENT_ID: &'static str = "global";
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            maintenance_mode: false,
            signups_enabled: true,
            default_role: Role::Member,
            support_email: None,
            updated_by: None,
            updated_at: None,
        }
    }
}
