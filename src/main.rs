//! weewx-wx CLI - Fetch weather from WeeWX MQTT loop packets into overlay files.

use anyhow::{Result, bail};
use clap::Parser;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;
use weewx_wx::{
    client::WxClient, config::Config, stats::MessageStats, subscriber::Subscriber,
};

/// weewx-wx - Fetch weather from a WeeWX MQTT loop packet
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// MQTT host
    #[arg(long, env = "WX_MQTT_HOST")]
    host: Option<String>,

    /// MQTT port
    #[arg(long, env = "WX_MQTT_PORT")]
    port: Option<u16>,

    /// MQTT username
    #[arg(long, env = "WX_MQTT_USERNAME")]
    username: Option<String>,

    /// MQTT password
    #[arg(long, env = "WX_MQTT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// MQTT client identifier
    #[arg(long)]
    client_id: Option<String>,

    /// Topic carrying loop packets
    #[arg(long)]
    topic: Option<String>,

    /// Path of the overlay text file
    #[arg(long)]
    text_output: Option<PathBuf>,

    /// Path of the structured JSON file
    #[arg(long)]
    json_output: Option<PathBuf>,

    /// Only write the text file
    #[arg(long)]
    no_json: bool,

    /// Decimals shown for wind direction
    #[arg(long)]
    wind_dir_precision: Option<usize>,

    /// MQTT keep-alive in seconds
    #[arg(long)]
    keep_alive: Option<u64>,

    /// Disable auto-reconnect
    #[arg(long)]
    no_reconnect: bool,

    /// Give up after N consecutive failed connection attempts (0 = never)
    #[arg(long)]
    max_reconnect_attempts: Option<u32>,

    /// Log statistics every N seconds (0 = never)
    #[arg(short, long)]
    stats_interval: Option<u64>,

    /// Maximum runtime in seconds (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_runtime: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Args {
    /// Apply command-line overrides on top of the file configuration.
    fn apply(self, mut config: Config) -> Config {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(username) = self.username {
            config.username = Some(username);
        }
        if let Some(password) = self.password {
            config.password = Some(password);
        }
        if let Some(client_id) = self.client_id {
            config.client_id = client_id;
        }
        if let Some(topic) = self.topic {
            config.topic = topic;
        }
        if let Some(path) = self.text_output {
            config.text_output = path;
        }
        if let Some(path) = self.json_output {
            config.json_output = path;
        }
        if self.no_json {
            config.json_enabled = false;
        }
        if let Some(precision) = self.wind_dir_precision {
            config.wind_dir_precision = precision;
        }
        if let Some(keep_alive) = self.keep_alive {
            config.keep_alive = keep_alive;
        }
        if self.no_reconnect {
            config.reconnect = false;
        }
        if let Some(attempts) = self.max_reconnect_attempts {
            config.max_reconnect_attempts = attempts;
        }
        if let Some(interval) = self.stats_interval {
            config.stats_interval = interval;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let file_config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let max_runtime = args.max_runtime;
    let config = args.apply(file_config);
    config.validate()?;

    info!("weewx-wx starting...");
    info!("Broker: {}:{}", config.host, config.port);
    info!("Text output: {}", config.text_output.display());
    if config.json_enabled {
        info!("JSON output: {}", config.json_output.display());
    }

    let stats = Arc::new(MessageStats::new());
    let subscriber = Subscriber::new(
        config.output_writer(),
        config.field_formats(),
        Arc::clone(&stats),
    );

    // Create shutdown signal
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    // Handle Ctrl+C
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
        let _ = shutdown_tx_clone.send(true);
    });

    // Optional max runtime
    if max_runtime > 0 {
        let shutdown_tx_clone = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(max_runtime)).await;
            info!("Max runtime reached");
            let _ = shutdown_tx_clone.send(true);
        });
    }

    // Periodic statistics
    if config.stats_interval > 0 {
        let stats_clone = Arc::clone(&stats);
        let stats_interval = config.stats_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(stats_interval));
            interval.tick().await;
            loop {
                interval.tick().await;
                info!("\n{}", stats_clone.summary());
            }
        });
    }

    let client = WxClient::new(config.client_config());
    let mut events = client.connect().await?;

    // Main event loop
    let mut gave_up = false;
    loop {
        tokio::select! {
            // Check for shutdown
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }

            // Handle broker events one at a time
            event = events.recv() => {
                match event {
                    Some(event) => {
                        if subscriber.dispatch(event) == ControlFlow::Break(()) {
                            gave_up = true;
                            break;
                        }
                    }
                    None => {
                        // Channel closed
                        break;
                    }
                }
            }
        }
    }

    // Print final statistics
    println!("\nFINAL STATISTICS");
    println!("{}", stats.summary());

    if gave_up {
        bail!("Could not stay connected to {}:{}", config.host, config.port);
    }

    Ok(())
}
