use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hush_server::config::ServerConfig;
use hush_server::server::Server;

#[tokio::main]
async fn main() -> Result<()> {
    let json_logs = std::env::var("HUSH_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hush_server=info,hush_sdk=info"));
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = ServerConfig::parse();
    tracing::info!("Starting hushd on {}", config.listen_addr);
    Server::new(config).run().await
}
