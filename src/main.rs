use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use xaal_core::*;
use xaal_node::Node;

#[derive(Parser)]
#[command(name = "xaal-sensor")]
#[command(about = "xAAL sensor node publishing encrypted readings over UDP multicast")]
#[command(version = "0.1.0")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sensor node
    Run {
        /// Log frames instead of sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate a default configuration with a fresh device id and key
    Config {
        /// Replace an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Print a fresh base64 shared key
    Keygen,

    /// Show the effective configuration with the key redacted
    Show,
}

async fn load_config(path: Option<&PathBuf>) -> Result<NodeConfig> {
    match path {
        Some(path) => NodeConfig::load_from(path).await,
        None => NodeConfig::load().await,
    }
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use futures_util::stream::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals = match Signals::new([SIGTERM, SIGINT]) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create signal handler: {}", e);
            std::future::pending::<()>().await;
            return;
        }
    };

    if let Some(signal) = signals.next().await {
        info!("Received signal {}, shutting down", signal);
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl-C, shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    match args.command {
        Commands::Config { force } => {
            let path = match args.config {
                Some(path) => path,
                None => NodeConfig::config_path()?,
            };
            let config = NodeConfig::default();
            config.create_at(&path, force).await?;
            println!("Generated default config at: {}", path.display());
            println!("Device id: {}", config.device.uuid);
        }

        Commands::Keygen => {
            println!("{}", SharedKey::generate().to_base64());
        }

        Commands::Show => {
            let config = load_config(args.config.as_ref()).await?;
            let contents = toml::to_string_pretty(&config.redacted())
                .map_err(|e| XaalError::Config(format!("Failed to serialize config: {}", e)))?;
            println!("{}", contents);
        }

        Commands::Run { dry_run } => {
            let config = load_config(args.config.as_ref()).await?;
            info!(
                "Node {} ({}) publishing to {}:{}",
                config.device.uuid, config.device.dev_type, config.network.group, config.network.port
            );

            let mut node = Node::new(&config, dry_run).await?;

            tokio::select! {
                result = node.run() => {
                    result?;
                }
                _ = wait_for_shutdown() => {
                    info!("Sensor node stopped");
                }
            }
        }
    }

    Ok(())
}
