#![forbid(unsafe_code)]
//! MyCoin node: loads configuration and ledger state, then serves the API.

use clap::Parser;
use mycoin::config::load_config;
use mycoin::node::Node;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
    /// API port (overrides network.api_port)
    #[arg(long)]
    port: Option<u16>,
    /// Ledger state file (overrides storage.path)
    #[arg(long)]
    data: Option<String>,
    /// Keep state in memory only
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;
    if let Some(port) = cli.port {
        config.network.api_port = port;
    }
    if let Some(data) = cli.data {
        config.storage.path = data;
    }
    if cli.in_memory {
        config.storage.in_memory = true;
    }

    let node = Node::init(config)?;
    info!("Serving API on {}", node.api_addr()?);
    node.run().await
}
