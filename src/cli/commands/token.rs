use anyhow::Context;
use clap::Args;
use serde_json::json;

use crate::auth::{issue_token, CallerIdentity, Role};
use crate::cli::{utils::output_success, OutputFormat};
use crate::config::config;

#[derive(Debug, Args)]
pub struct TokenArgs {
    #[arg(long, help = "Subject (user id) of the token")]
    pub user_id: String,

    #[arg(long, default_value = "", help = "Email claim")]
    pub email: String,

    #[arg(long, default_value = "member", help = "member, admin or super_admin")]
    pub role: Role,

    #[arg(long, help = "Lifetime in hours (defaults to SECURITY_JWT_EXPIRY_HOURS)")]
    pub hours: Option<u64>,
}

pub fn handle(args: TokenArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let security = &config()?.security;
    let hours = args.hours.unwrap_or(security.jwt_expiry_hours);
    if hours == 0 {
        anyhow::bail!("--hours must be at least 1");
    }

    let identity = CallerIdentity {
        user_id: args.user_id,
        email: args.email,
        role: args.role,
    };
    let ttl = chrono::Duration::hours(i64::try_from(hours).context("--hours is too large")?);
    let token = issue_token(&identity, ttl, security).context("failed to sign token")?;

    output_success(
        output_format,
        &format!("Token for {} ({}) valid for {}h", identity.user_id, identity.role, hours),
        json!({ "token": token, "identity": identity, "expiresInHours": hours }),
        &token,
    )
}
