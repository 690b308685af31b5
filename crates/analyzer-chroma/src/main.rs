use analyzer_chroma::{ClientSettings, create_client};
use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Connects to the Chroma server and keeps the client alive until Ctrl+C.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Chroma server host
    #[arg(long)]
    host: Option<String>,

    /// Chroma server HTTP port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,analyzer_chroma=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut settings = ClientSettings::from_env();
    if let Some(host) = cli.host {
        settings.host = host;
    }
    if let Some(port) = cli.port {
        settings.port = port;
    }

    let client = create_client(settings)?;

    match client.heartbeat().await {
        Ok(_) => info!("ChromaDB server reachable on {}", client.base_url()),
        Err(e) => warn!(error = %e, "ChromaDB server not reachable yet"),
    }
    info!("Press Ctrl+C to stop");

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for Ctrl+C");
                }
                break;
            }
            _ = ticker.tick() => {}
        }
    }

    info!("Shutting down ChromaDB client...");
    Ok(())
}
