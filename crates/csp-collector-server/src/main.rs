// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, process::ExitCode};

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use csp_collector::{collector::CspCollector, config::Config};

#[tokio::main]
pub async fn main() -> ExitCode {
    // read ahead of Config so that configuration errors are logged
    let log_level = env::var("LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    if let Err(e) = init_logging(&log_level) {
        eprintln!("Failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("CSP report collector stopped: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(log_level: &str) -> anyhow::Result<()> {
    let env_filter = format!("h2=off,hyper=off,{log_level}");

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .json()
        .with_env_filter(
            EnvFilter::try_new(env_filter).context("could not parse log level in configuration")?,
        )
        .with_writer(std::io::stdout)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .flatten_event(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    debug!("Logging subsystem enabled");
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env().context("Error creating config on collector startup")?;
    info!(
        port = config.port,
        metrics = ?config.metrics,
        label_policy = %config.label_policy,
        "Loaded configuration"
    );

    let collector = CspCollector::new(config).context("Error creating report metrics")?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => {
                error!("Unable to listen for shutdown signal: {e}");
                return;
            }
        }
        shutdown.cancel();
    });

    collector.start(cancel).await?;
    info!("CSP report collector shut down");
    Ok(())
}
