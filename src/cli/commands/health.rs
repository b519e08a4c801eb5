use std::time::Duration;

use anyhow::Context;
use clap::Args;
use serde_json::Value;

use crate::cli::{utils::output_success, OutputFormat};

#[derive(Debug, Args)]
pub struct HealthArgs {
    #[arg(long, default_value = "http://localhost:3000", help = "Base URL of the server")]
    pub url: String,
}

pub async fn handle(args: HealthArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let base = url::Url::parse(&args.url).with_context(|| format!("invalid --url: {}", args.url))?;
    let endpoint = base.join("/health")?;

    let client = reqwest::Client::new();
    let response = client
        .get(endpoint.clone())
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .with_context(|| format!("could not reach {}", endpoint))?;

    let status = response.status();
    let body: Value = response.json().await.context("health endpoint returned non-JSON body")?;

    if !status.is_success() {
        anyhow::bail!("{} responded {}: {}", endpoint, status, body);
    }

    let failures = body["data"]["audit"]["writeFailures"].as_u64().unwrap_or(0);
    let timeouts = body["data"]["audit"]["writeTimeouts"].as_u64().unwrap_or(0);
    output_success(
        output_format,
        &format!("{} is healthy", base),
        body.clone(),
        &format!(
            "database: {}\naudit write failures: {}\naudit write timeouts: {}",
            body["data"]["database"], failures, timeouts
        ),
    )
}
