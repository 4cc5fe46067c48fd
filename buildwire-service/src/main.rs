//! `buildwire` binary: serves the stdio protocol with the passthrough engine.
//!
//! Logs go to stderr; stdout belongs to the protocol.

mod config;
mod fd_redirect;
mod passthrough;

use std::sync::Arc;

use anyhow::Context;
use buildwire::{ServiceConfig, VersionInfo, run_service};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::Config;
use crate::passthrough::PassthroughEngine;

fn init_tracing(config: &Config) {
    let filter = if config.rust_log {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(config.filter_directives())
    };

    if config.json_logs {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_tracing(&config);

    let mut version = VersionInfo::new();
    if let Some(announced) = &config.version {
        version = version.with_protocol(announced.clone());
    }
    tracing::info!(
        buildwire = version.buildwire,
        protocol = ?version.protocol,
        "Starting buildwire service"
    );

    let output = fd_redirect::protocol_output(config.direct_stdout)
        .context("failed to set up protocol output")?;

    run_service(
        ServiceConfig::new(version.announced()),
        Arc::new(PassthroughEngine::new()),
        tokio::io::stdin(),
        output,
    )
    .await
    .context("service stopped with an error")?;

    Ok(())
}
