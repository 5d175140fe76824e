use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ldapsync_engine::{build_pipeline, LogConfig, LogFormat, Scheduler, SyncConfig, DEFAULT_CONFIG_PATH};

/// Exit status after SIGINT.
const EXIT_SIGINT: u8 = 130;
/// Exit status after SIGTERM.
const EXIT_SIGTERM: u8 = 143;

#[derive(Parser)]
#[command(name = "ldapsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "LDAPSYNC_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Run a single cycle regardless of `sync.interval_secs`
    #[arg(long)]
    once: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match SyncConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.check_config {
        println!("{}: configuration is valid", cli.config.display());
        return ExitCode::SUCCESS;
    }

    init_logging(&config.log);

    let pipeline = match build_pipeline(&config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    let interval_secs = if cli.once { 0 } else { config.sync.interval_secs };
    info!(
        config = %cli.config.display(),
        interval_secs,
        "Starting ldapsync"
    );

    let cancel = CancellationToken::new();
    let signal_status = Arc::new(AtomicU8::new(0));
    tokio::spawn(watch_signals(cancel.clone(), Arc::clone(&signal_status)));

    let scheduler = Scheduler::new(pipeline, interval_secs, cancel);
    let summary = scheduler.run().await;

    match signal_status.load(Ordering::Acquire) {
        0 if interval_secs == 0 && summary.last.as_ref().is_some_and(|r| !r.is_success()) => {
            ExitCode::FAILURE
        }
        0 => ExitCode::SUCCESS,
        status => ExitCode::from(status),
    }
}

/// Initialise tracing. `RUST_LOG` wins over the configured level.
fn init_logging(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Record which signal arrived and cancel the scheduler.
///
/// The cycle in progress still runs to completion.
async fn watch_signals(cancel: CancellationToken, status: Arc<AtomicU8>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let code = tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping after the current cycle");
            EXIT_SIGINT
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping after the current cycle");
            EXIT_SIGTERM
        }
    };

    status.store(code, Ordering::Release);
    cancel.cancel();
}
