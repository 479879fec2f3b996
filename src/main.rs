//! vcrproxy CLI

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinHandle;
use tracing::info;
use vcrproxy::config::{Config, Mode};
use vcrproxy::logging;
use vcrproxy::proxy::{spawn_console_logger, EventBus, ProxyFleet};
use vcrproxy::replay::Refresher;
use vcrproxy::storage::{FsStore, RecordStore};

const DEFAULT_CONFIG: &str = "vcr.toml";

const LOGGER_DRAIN: Duration = Duration::from_secs(1);

struct Invocation {
    mode: Mode,
    config_path: PathBuf,
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let Some(invocation) = parse_args(&args) else {
        usage();
    };

    if let Err(e) = run(invocation).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn usage() -> ! {
    eprintln!("vcrproxy v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: vcrproxy <command> [config] [--log-level <filter>]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  record    Serve stored responses, record misses from the origin");
    eprintln!("  play      Serve stored responses only, answer misses with 501");
    eprintln!("  replay    Re-issue every stored request and re-record the responses");
    eprintln!();
    eprintln!("The config path defaults to {DEFAULT_CONFIG}.");
    process::exit(1);
}

fn parse_args(args: &[String]) -> Option<Invocation> {
    let mut iter = args.iter();
    let mode = iter.next()?.parse::<Mode>().ok()?;

    let mut config_path = None;
    let mut log_level = None;
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--log-level" => log_level = Some(iter.next()?.clone()),
            flag if flag.starts_with('-') => return None,
            path if config_path.is_none() => config_path = Some(PathBuf::from(path)),
            _ => return None,
        }
    }

    Some(Invocation {
        mode,
        config_path: config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG)),
        log_level,
    })
}

async fn run(invocation: Invocation) -> anyhow::Result<()> {
    let config = Config::from_file(&invocation.config_path)
        .with_context(|| format!("loading {}", invocation.config_path.display()))?;
    logging::init(&config.logging, invocation.log_level.as_deref())?;

    info!(
        "vcrproxy v{} ({:?}), snapshots in {}",
        env!("CARGO_PKG_VERSION"),
        invocation.mode,
        config.snapshots_dir.display()
    );
    let store: Arc<dyn RecordStore> = Arc::new(FsStore::new(config.snapshots_dir.clone()));

    match invocation.mode {
        Mode::Record | Mode::Play => {
            let fleet = ProxyFleet::new(&config, invocation.mode, store)?;
            let logger = spawn_console_logger(fleet.subscribe());

            fleet.run().await?;
            drain(logger).await;
        }
        Mode::Replay => {
            let events = EventBus::default();
            let logger = spawn_console_logger(events.subscribe());

            let refresher = Refresher::new(store)?
                .with_limits(config.limits.clone())
                .with_events(events);
            let report = refresher.refresh_all(&config).await?;
            info!("Replay finished: {report}");

            drop(refresher);
            drain(logger).await;
        }
    }

    Ok(())
}

/// Let the console logger print what is still buffered; open keep-alive
/// connections can hold the bus open, so the wait is bounded
async fn drain(logger: JoinHandle<()>) {
    if tokio::time::timeout(LOGGER_DRAIN, logger).await.is_err() {
        tracing::debug!("Console logger still running at exit");
    }
}
