//! A relay that forwards messages with the given tags from one ControlHost server (e.g. JLigier) to another, reporting
//! the message rate as it goes.
//!
//! The relay stops after forwarding a message whose payload is exactly `stop`, or as soon as either connection fails.

#![deny(missing_docs)]

use anyhow::{Context as _, Error};
use clap::Parser as _;
use controlhost::Session;
use tracing::{error, info};

mod config;
use self::config::Cli;

mod logging;
use self::logging::{fatal_and_exit, initialize_logging};

mod rate;

mod relay;
use self::relay::{Relay, RelaySummary};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = initialize_logging(Some(cli.log_level())) {
        fatal_and_exit(format!("failed to initialize logging: {}", e));
    }

    match run(cli) {
        Ok(summary) => info!("ligier-mirror stopped after forwarding {} messages.", summary.frames_forwarded),
        Err(e) => {
            error!("{:?}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<RelaySummary, Error> {
    // Everything about the configuration is checked before any connection is attempted.
    let config = cli.into_relay_config().context("Invalid configuration.")?;

    info!("Forwarding messages from {} -> {}", config.source, config.target);

    let input = Session::connect(&config.source)
        .with_context(|| format!("Failed to connect to source server {}.", config.source))?;
    let output = Session::connect(&config.target)
        .with_context(|| format!("Failed to connect to target server {}.", config.target))?;

    info!("with the following tags: {}", config.subscriptions.to_request());

    let mut relay = Relay::new(input, output, config.report_interval);
    relay.subscribe(&config.subscriptions)?;

    let summary = relay.run()?;
    Ok(summary)
}
