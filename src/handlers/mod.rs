// handlers/mod.rs - Two security tiers
//
// Public (no credential): service info and health.
// Admin (/api/admin/*): every route is registered through `AdminRouter`,
// which requires a policy and layers the gate in front of the handler.

pub mod admin;
pub mod public;
