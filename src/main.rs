//! pulseox-bridge entry point

use clap::{Parser, Subcommand};
use pulseox_bridge::config::BridgeConfig;
use pulseox_bridge::link::LinkManager;
use pulseox_bridge::observability::{init_default_logging, init_logging, logging};
use pulseox_bridge::protocol::{build_discovery_messages, publish_discovery, TopicMap};
use pulseox_bridge::transport::ble::BtleplugLink;
use pulseox_bridge::transport::mqtt::MqttPublisher;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info, warn, Level};

/// How long startup waits for the broker before publishing discovery anyway
const BROKER_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bridge a BLE pulse oximeter to MQTT
#[derive(Parser)]
#[command(name = "pulseox-bridge")]
#[command(about = "Publish BLE pulse oximeter readings to MQTT")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace); overrides LOG_LEVEL
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the oximeter and publish until interrupted
    Run,
    /// Validate configuration
    Config {
        /// Print the resolved configuration
        #[arg(long)]
        show: bool,
    },
    /// Print Home Assistant discovery topics and payloads
    Discovery,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    info!("Starting pulseox-bridge v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_bridge(&config).await,
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::Discovery => handle_discovery_command(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    if let Commands::Run = cli.command {
        info!("Bridge stopped, exiting with code {}", config.exit_code);
        process::exit(config.exit_code);
    }
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => return init_default_logging(),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let format = logging::LogFormat::parse(&std::env::var("LOG_FORMAT").unwrap_or_default());
    let spans = logging::parse_span_flag(&std::env::var("LOG_SPANS").unwrap_or_default());
    init_logging(level, format, spans);
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(BridgeConfig::load_from_file(path)?)
        }
        None => {
            for path_str in ["pulseox.toml", "config/pulseox.toml"] {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(BridgeConfig::load_from_file(&path)?);
                }
            }
            Err("No configuration file found. Provide one with -c/--config or create pulseox.toml".into())
        }
    }
}

async fn run_bridge(config: &BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let topics = TopicMap::new(config.host(), &config.mqtt.discovery_prefix);
    info!(host = %topics.host(), device = %config.device.address, "Bridge starting");

    let publisher = Arc::new(MqttPublisher::start(config, &topics)?);
    if let Err(e) = publisher.wait_until_connected(BROKER_CONNECT_TIMEOUT).await {
        warn!("Broker not reachable yet, publishes will be dropped until it is: {}", e);
    }
    publish_discovery(publisher.as_ref(), config, &topics).await?;

    let link = BtleplugLink::new(
        config.device.adapter_index,
        Duration::from_secs(config.device.scan_timeout_secs),
    )
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
        }
        let _ = shutdown_tx.send(true);
    });

    let mut manager = LinkManager::new(link, publisher.clone(), topics, config);
    let outcome = manager.run(shutdown_rx).await;

    publisher.shutdown().await;
    Ok(outcome?)
}

fn handle_config_command(
    config: &BridgeConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Resolved configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }
    println!("Configuration is valid");
    Ok(())
}

fn handle_discovery_command(config: &BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let topics = TopicMap::new(config.host(), &config.mqtt.discovery_prefix);
    for message in build_discovery_messages(config, &topics) {
        println!("{}", message.topic);
        println!("{}", serde_json::to_string_pretty(&message.payload)?);
    }
    Ok(())
}
