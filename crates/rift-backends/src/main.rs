use anyhow::Context;
use clap::Parser;
use rift_backends::config::BackendsConfig;
use rift_backends::telemetry::{init_logging, LogFormat};
use rift_backends::Launcher;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "rift-backends", version, about = "Run mock backends from a YAML file")]
struct Args {
    /// Backends configuration file
    #[arg(short, long, env = "RIFT_BACKENDS_CONFIG")]
    config: PathBuf,

    /// Override `start_timeout_ms` from the configuration
    #[arg(long)]
    start_timeout_ms: Option<u64>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_format)?;

    let config = BackendsConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    let timeout = args
        .start_timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.start_timeout());

    let backends = config.into_backends()?;
    // Starting and stopping both block the calling thread.
    let guard = tokio::task::spawn_blocking(move || {
        Launcher::new().start_timeout(timeout).guard(backends)
    })
    .await??;
    info!("All backends started ({} workers)", guard.len());

    tokio::signal::ctrl_c().await.ok();
    info!("Shutting down");
    tokio::task::spawn_blocking(move || drop(guard)).await?;
    Ok(())
}
