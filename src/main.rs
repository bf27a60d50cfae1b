use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use idrive_bridge::bridge::BridgeHandle;
use idrive_bridge::can::{replay, TracingFrameSender};
use idrive_bridge::config::BridgeConfig;
use idrive_bridge::hid::TracingHid;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

const BUS_CHANNEL_CAPACITY: usize = 1000;

#[derive(Parser, Debug)]
#[command(name = "idrive-bridge")]
#[command(about = "Bridge a BMW iDrive controller on CAN to HID keyboard and mouse actions")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Feed frames from a candump log instead of a live bus, `-` for stdin
    #[arg(short, long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Write the default configuration if none exists, then exit
    #[arg(long)]
    write_default_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup()?;

    let config_path = match args.config {
        Some(path) => path,
        None => BridgeConfig::default_path()?,
    };

    if args.write_default_config {
        setup_logging_env(Level::INFO);
        if BridgeConfig::ensure_default_config(&config_path).await? {
            info!("Default configuration written to {}", config_path.display());
        } else {
            info!("Configuration already exists at {}", config_path.display());
        }
        return Ok(());
    }

    let config = BridgeConfig::load_or_default(&config_path)
        .await
        .map_err(|e| eyre!("Failed to load {}: {}", config_path.display(), e))?;
    setup_logging_env(log_level(&config));
    info!("Using configuration {}", config_path.display());

    let (bus_tx, bus_rx) = mpsc::channel(BUS_CHANNEL_CAPACITY);
    let handle = BridgeHandle::spawn(&config, bus_rx, TracingFrameSender, TracingHid::new())
        .map_err(|e| eyre!("Failed to spawn bridge: {}", e))?;
    let stopped = handle.cancellation_token();

    // without a replay source the sender stays here and the bridge idles on
    // keepalives until interrupted
    let _idle_bus = match args.replay {
        Some(path) => {
            info!("Replaying CAN log {}", path.display());
            tokio::spawn(async move {
                match replay::replay_file(&path, bus_tx).await {
                    Ok(count) => info!("Replay finished after {} frames", count),
                    Err(e) => error!("Replay failed: {}", e),
                }
            });
            None
        }
        None => {
            info!("No CAN source configured, running keepalives only");
            Some(bus_tx)
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.map_err(|e| eyre!("Failed to listen for ctrl-c: {}", e))?;
            info!("Interrupted");
        }
        _ = stopped.cancelled() => info!("Bridge stopped on its own"),
    }

    handle
        .shutdown()
        .await
        .map_err(|e| eyre!("Bridge shutdown failed: {}", e))?;
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

/// `RUST_LOG` wins over the configured level when it names a plain level
fn log_level(config: &BridgeConfig) -> Level {
    std::env::var("RUST_LOG")
        .ok()
        .and_then(|value| value.parse().ok())
        .or_else(|| config.logging.level.parse().ok())
        .unwrap_or(Level::INFO)
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
