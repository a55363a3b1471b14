//! prayerlink - headless feed monitor entry point

use clap::{Parser, Subcommand};
use prayerlink::config::ClientConfig;
use prayerlink::observability::init_default_logging;
use prayerlink::session::FeedSession;
use prayerlink::state::ConnectionStatus;
use std::path::PathBuf;
use std::process;
use tokio::signal;
use tokio::time::{interval, Duration};
use tracing::{error, info};

/// Resilient client for the crypto-prayer realtime feed
#[derive(Parser)]
#[command(name = "prayerlink")]
#[command(about = "Resilient STOMP-over-WebSocket client for the crypto-prayer feed")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Broker WebSocket URL override
    #[arg(long, env = "PRAYERLINK_WS_URL")]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and follow the feed until interrupted
    Run,
    /// Validate configuration
    Config {
        /// Show the resolved configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting prayerlink v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config, cli.url) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_feed(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
    url_override: Option<String>,
) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let mut config = match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            ClientConfig::load_from_file(path)?
        }
        None => {
            // Try default locations, fall back to built-in defaults
            let default_paths = ["prayerlink.toml", "config/prayerlink.toml"];

            let mut loaded = None;
            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    loaded = Some(ClientConfig::load_from_file(&path)?);
                    break;
                }
            }
            loaded.unwrap_or_default()
        }
    };

    if let Some(url) = url_override {
        config.broker.url = Some(url);
    }
    config.validate()?;

    Ok(config)
}

async fn run_feed(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Broker URL: {}", config.resolve_broker_url()?);

    let session = FeedSession::start(&config)?;
    let mut link = session.watch_link();
    let mut report = interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Interrupt received; shutting down");
                break;
            }
            changed = link.changed() => {
                if changed.is_err() {
                    error!("Connection task ended unexpectedly");
                    break;
                }
                let state = link.borrow().clone();
                match state.status {
                    ConnectionStatus::Reconnecting => {
                        info!(attempt = state.reconnect_attempt, "Status: reconnecting");
                    }
                    status => info!(%status, "Status changed"),
                }
            }
            _ = report.tick() => {
                session.prune_notices();
                let tally = session.local_tally();
                info!(
                    up = tally.up_count,
                    down = tally.down_count,
                    up_ratio = format!("{:.3}", tally.up_ratio),
                    "Tally"
                );
                if let Ok(ticker) = session.ticker().lock() {
                    if let Some(current) = ticker.current() {
                        info!(symbol = %current.symbol, price = current.price, "Ticker");
                    }
                }
            }
        }
    }

    session.shutdown();
    Ok(())
}

fn handle_config_command(
    config: ClientConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    println!("Configuration is valid");

    if show {
        println!("{}", toml::to_string_pretty(&config)?);
        println!("resolved broker url: {}", config.resolve_broker_url()?);
    }

    Ok(())
}
