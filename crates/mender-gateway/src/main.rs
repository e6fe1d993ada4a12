//! Mender gateway binary.
//!
//! Pulls requests from the JetStream request stream, calls the Mender
//! management API and publishes each result on its response subject.
//!
//! # Environment variables
//!
//! | Variable                              | Default           | Description                          |
//! |---------------------------------------|-------------------|--------------------------------------|
//! | `NATS_URL`                            | `localhost:4222`  | NATS server address(es)              |
//! | `MENDER_STREAM`                       | `MenderUser`      | Stream holding inbound requests      |
//! | `MENDER_CONSUMER`                     | `mender_device`   | Durable consumer name                |
//! | `MENDER_SCHEME`                       | `https`           | Scheme for management API URLs       |
//! | `MENDER_MAX_IN_FLIGHT`                | `16`              | Concurrent message handlers          |
//! | `MENDER_BLOB_ACCOUNT_URL`             | Azure account     | Blob storage endpoint for uploads    |
//! | `MENDER_BLOB_SAS_TOKEN`               | unset             | SAS query string for blob reads      |
//! | `RUST_LOG`                            | `info`            | Log filter (tracing-subscriber)      |
//!
//! See [`GatewayConfig`] for the rest.

use anyhow::Context;
use mender_gateway::{Dispatcher, GatewayConfig, worker};
use mender_nats::{SystemEnv, connect};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env(&SystemEnv);
    tracing::info!(
        servers = ?config.nats.servers,
        auth = %config.nats.auth.description(),
        "Connecting to NATS"
    );

    let nats = connect(&config.nats)
        .await
        .context("failed to connect to NATS")?;
    let jetstream = async_nats::jetstream::new(nats);

    let dispatcher = Dispatcher::from_config(&config, jetstream.clone())
        .context("failed to build HTTP client")?;

    tokio::select! {
        result = worker::run(
            &jetstream,
            &dispatcher,
            &config.stream,
            &config.consumer,
            config.max_in_flight,
        ) => result.context("worker exited with error")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
