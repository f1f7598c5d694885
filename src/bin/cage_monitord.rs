//! cage_monitord - enclosure monitoring daemon
//!
//! This daemon:
//! 1. Captures frames from every configured camera
//! 2. Samples the primary camera into a bounded classification queue
//! 3. Classifies activity remotely when configured, on-device otherwise
//! 4. Polls the enclosure sensors
//! 5. Logs a status summary on a fixed period until Ctrl-C

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use cage_monitor::{Monitor, MonitorConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Monitor a small-animal enclosure")]
struct Args {
    /// Config file (JSON, or TOML when the extension is .toml).
    #[arg(long, env = "CAGE_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds between status summaries.
    #[arg(long, env = "CAGE_MONITOR_STATUS_SECS", default_value_t = 10)]
    status_secs: u64,

    /// Print each status summary to stdout as JSON.
    #[arg(long)]
    json: bool,

    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    run_for_secs: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = MonitorConfig::load_from(args.config.as_deref())?;
    log::info!(
        "cage_monitord {} starting: {} camera(s), primary {}, remote {}",
        env!("CARGO_PKG_VERSION"),
        cfg.cameras.len(),
        cfg.primary_camera,
        cfg.classifier.remote_url.as_deref().unwrap_or("disabled")
    );

    let monitor = Monitor::from_config(&cfg)?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    let period = Duration::from_secs(args.status_secs.max(1));
    let deadline = args
        .run_for_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    log::info!("cage_monitord running (Ctrl-C to stop)");

    loop {
        let wait = match deadline {
            Some(deadline) => period.min(deadline.saturating_duration_since(Instant::now())),
            None => period,
        };
        match rx.recv_timeout(wait) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                log::info!("shutdown signal received, stopping monitor...");
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }

        let report = monitor.board().report();
        for line in report.overlay_lines() {
            log::info!("{}", line);
        }
        if report.breaker.open {
            log::warn!(
                "remote classifier circuit open ({} consecutive failures)",
                report.breaker.consecutive_failures
            );
        }
        log::debug!(
            "broker: offered={} queued={} dropped={} classified={}",
            report.broker.offered,
            report.broker.queued,
            report.broker.dropped,
            report.frames_classified
        );
        if args.json {
            println!("{}", report.to_json()?);
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            log::info!("run time elapsed, stopping monitor...");
            break;
        }
    }

    monitor.stop()
}
