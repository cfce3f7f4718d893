//! Command-line entry point.
//!
//! Run with: hrs-watchdog EE:74:7D:C9:2A:68

use clap::Parser;
use hrs_watchdog::{
    shutdown_channel, BtleplugTransport, EventSink, FileEventLog, MultiSink, Result, Supervisor,
    SupervisorConfig, TracingEventSink,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Keep a BLE Heart Rate sensor streaming, reconnecting when it goes quiet.
#[derive(Parser, Debug)]
#[command(name = "hrs-watchdog")]
#[command(version)]
struct Cli {
    /// Hardware address of the peripheral, exactly as the platform reports it
    address: String,

    /// Seconds of silence before a check counts as overdue
    #[arg(long, default_value_t = 3, value_name = "SECS")]
    window: u64,

    /// Consecutive overdue checks tolerated before reconnecting
    #[arg(long, default_value_t = 2, value_name = "N")]
    threshold: u32,

    /// Give up a scan after this many seconds (0 scans until interrupted)
    #[arg(long, default_value_t = 30, value_name = "SECS")]
    scan_timeout: u64,

    /// Setup attempts per (re)connect before exiting
    #[arg(long, default_value_t = 5, value_name = "N")]
    connect_attempts: u32,

    /// Append-only event log
    #[arg(long, default_value = "bluetooth.log", value_name = "FILE")]
    event_log: PathBuf,

    /// Do not write the event log file
    #[arg(long)]
    no_event_log: bool,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn config(&self) -> SupervisorConfig {
        let scan_timeout = match self.scan_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        SupervisorConfig::new(self.address.as_str())
            .with_staleness_window(Duration::from_secs(self.window))
            .with_stale_threshold(self.threshold)
            .with_scan_timeout(scan_timeout)
            .with_connect_attempts(self.connect_attempts)
    }

    fn event_sink(&self) -> Result<Arc<dyn EventSink>> {
        let sink = MultiSink::new().with(Arc::new(TracingEventSink));
        if self.no_event_log {
            return Ok(Arc::new(sink));
        }

        let log = FileEventLog::open(&self.event_log)?;
        info!("Writing events to {}", log.path().display());
        Ok(Arc::new(sink.with(Arc::new(log))))
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.config();
    config.validate()?;

    let sink = cli.event_sink()?;
    let supervisor = Supervisor::new(Arc::new(BtleplugTransport::new()), config, sink);

    let (trigger, signal) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            trigger.trigger();
        }
    });

    let result = supervisor.run(signal).await;
    if result.is_err() {
        error!("Last setup phase: {}", supervisor.setup_phase());
    }
    result
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli).await {
        error!(error = %err, "hrs-watchdog failed");
        std::process::exit(err.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_address_is_required() {
        let err = Cli::try_parse_from(["hrs-watchdog"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_flags_map_to_config() {
        let cli = Cli::try_parse_from([
            "hrs-watchdog",
            "EE:74:7D:C9:2A:68",
            "--window",
            "5",
            "--threshold",
            "4",
            "--scan-timeout",
            "0",
        ])
        .unwrap();

        let config = cli.config();
        assert_eq!(config.target.as_str(), "EE:74:7D:C9:2A:68");
        assert_eq!(config.staleness_window, Duration::from_secs(5));
        assert_eq!(config.stale_threshold, 4);
        assert_eq!(config.scan_timeout, None);
        assert_eq!(config.connect_attempts, 5);
    }

    #[test]
    fn test_out_of_range_window_fails_validation() {
        let cli = Cli::try_parse_from([
            "hrs-watchdog",
            "EE:74:7D:C9:2A:68",
            "--window",
            "18446744073709551615",
        ])
        .unwrap();

        let err = cli.config().validate().unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
