use clap::Args;

use crate::cli::{utils::output_success, OutputFormat};
use crate::config::{config, AppConfig};

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long, help = "Render as YAML instead of JSON")]
    pub yaml: bool,
}

const REDACTED: &str = "[REDACTED]";

/// Copy of `config` that is safe to print.
pub fn redacted(config: &AppConfig) -> AppConfig {
    let mut config = config.clone();
    if !config.security.jwt_secret.is_empty() {
        config.security.jwt_secret = REDACTED.to_string();
    }
    if let Some(url) = config.database.url.as_mut() {
        if let Ok(mut parsed) = url::Url::parse(url) {
            if parsed.password().is_some() && parsed.set_password(Some(REDACTED)).is_ok() {
                *url = parsed.to_string();
            }
        }
    }
    config
}

pub fn handle(args: ConfigArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let safe = redacted(config()?);

    if args.yaml {
        print!("{}", serde_yaml::to_string(&safe)?);
        return Ok(());
    }

    let text = serde_json::to_string_pretty(&safe)?;
    output_success(
        output_format,
        &format!("Effective configuration ({:?})", safe.environment),
        serde_json::to_value(&safe)?,
        &text,
    )
}
