//! Ticket Service (TicketSrv)
//!
//! Polls Zabbix for long-standing triggers and keeps Request Tracker tickets
//! for them: creates, reopens and reminds.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use common::{CancellationToken, LogConfig};
use tracing::{info, Level};

use ticketsrv::monitor::{MonitoringSource, ZabbixClient};
use ticketsrv::tracker::{RequestTrackerClient, TicketBackend};
use ticketsrv::{TicketService, TicketSrvConfig};

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, env = "TICKETSRV_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    debug: bool,

    /// Info logging
    #[arg(short, long)]
    verbose: bool,

    /// Also log to this file (rotated daily)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log tracker writes instead of sending them
    #[arg(long)]
    noop: bool,

    /// Load and validate the configuration, then exit
    #[arg(long)]
    validate: bool,

    /// Print the effective configuration as YAML, then exit
    #[arg(long)]
    print_config: bool,
}

fn parse_log_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TicketSrvConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if args.noop {
        config.behavior.noop = true;
    }
    if args.log_file.is_some() {
        config.logging.log_file = args.log_file.clone();
    }

    if args.print_config {
        print!("{}", serde_yaml::to_string(&config.redacted())?);
        return Ok(());
    }

    config.validate().context("invalid configuration")?;
    if args.validate {
        println!("Configuration OK");
        return Ok(());
    }

    let mut log_config = LogConfig::new("ticketsrv")
        .with_log_file(config.logging.log_file.clone())
        .with_json(config.logging.json);
    log_config = if args.debug || args.verbose {
        log_config.with_flags(args.debug, args.verbose)
    } else {
        LogConfig {
            level: parse_log_level(&config.logging.level),
            ..log_config
        }
    };
    common::init_with_config(log_config)?;

    info!("Starting Ticket Service...");
    info!(
        "Monitoring: {}, tracker: {} (queue {}, field {})",
        config.monitoring.url, config.tracker.url, config.tracker.queue, config.tracker.custom_field
    );

    let monitor: Arc<dyn MonitoringSource> = Arc::new(ZabbixClient::new(&config.monitoring)?);
    let tracker: Arc<dyn TicketBackend> = Arc::new(RequestTrackerClient::new(&config.tracker)?);
    let service = TicketService::build(&config, monitor, tracker)?;

    let token = CancellationToken::new();
    let shutdown = common::cancel_on_shutdown(token.clone());

    service.run(token.clone()).await;

    token.cancel();
    let _ = shutdown.await;
    info!("Ticket Service exited");
    Ok(())
}
