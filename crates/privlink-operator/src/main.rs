//! privlink-operator - private endpoints for private workload clusters

use std::sync::Arc;

use clap::Parser;
use kube::Client;

use privlink_common::telemetry::{init_logging, init_metrics};
use privlink_operator::config::Config;
use privlink_operator::controller::Context;
use privlink_operator::controller_runner::build_controller;
use privlink_operator::health::{self, HealthState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_logging(config.log_format)?;
    config.validate()?;
    let meter_provider = init_metrics("privlink-operator", config.otlp_endpoint.as_deref())?;

    tracing::info!(
        management_cluster = %config.management_cluster(),
        sync_period_secs = config.sync_period,
        retry_interval_secs = config.retry_interval,
        metrics_export = meter_provider.is_some(),
        "Starting privlink-operator"
    );

    let client = Client::try_default().await?;

    let health_state = HealthState::default();
    let probe_addr = config.health_probe_bind_address;
    let probe_state = health_state.clone();
    tokio::spawn(async move {
        if let Err(e) = health::serve(probe_addr, probe_state).await {
            tracing::error!(error = %e, "Health probe server failed");
        }
    });

    let ctx = Arc::new(Context::new(client.clone(), &config));
    let controller = build_controller(client, ctx);
    health_state.set_ready();

    controller.await;
    tracing::info!("Controller stopped");

    if let Some(provider) = meter_provider {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "Failed to flush metrics");
        }
    }
    Ok(())
}
