//! `ha-when`: connect to Home Assistant and run automations

use anyhow::{Context, Result};
use ha_client::HassClient;
use ha_runner::{builtin, AutomationRegistry, Runner, RunnerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let config = RunnerConfig::from_env().context("loading configuration")?;
    info!(url = %config.connect.websocket_url(), "Starting ha-when");

    let client = HassClient::connect(config.connect)
        .await
        .context("connecting to Home Assistant")?;

    let registry = AutomationRegistry::new();
    registry.add(builtin::STATE_LOGGER, builtin::state_logger());

    tokio::select! {
        result = Runner::run(&client, &registry) => {
            let summary = result.context("running automations")?;
            info!(events = summary.events, failures = summary.failures, "Event stream ended");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            client.close().await;
        }
    }

    Ok(())
}
