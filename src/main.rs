use anyhow::Context;
use endpoint_guard::{config::GuardConfig, init_service, init_tracing};
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // Get config file path from command line or use default
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/guard.yaml".to_string());

    let config = GuardConfig::from_file(&config_path).with_context(|| {
        format!(
            "failed to load configuration from {} (usage: endpoint-guard [config_file])",
            config_path
        )
    })?;

    init_service(config).await.context("endpoint guard stopped")?;

    Ok(())
}
