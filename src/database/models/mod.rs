pub mod feature_flag;
pub mod settings;
pub mod team;
pub mod user;

pub use feature_flag::FeatureFlag;
pub use settings::Settings;
pub use team::Team;
pub use user::AdminUser;

/// Collection names in the document store.
pub mod collections {
    pub const FEATURE_FLAGS: &str = "feature_flags";
    pub const USERS: &str = "users";
    pub const TEAMS: &str = "teams";
    pub const SETTINGS: &str = "settings";

    /// Document field that must be unique within `collection`, enforced by
    /// the store on insert.
    pub fn unique_field(collection: &str) -> Option<&'static str> {
        match collection {
            FEATURE_FLAGS => Some("key"),
            USERS => Some("email"),
            _ => None,
        }
    }
}
