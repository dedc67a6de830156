use anyhow::Context;
use mock_service::MockConfig;
use std::net::SocketAddr;
use tracing_subscriber::FmtSubscriber;

const DEFAULT_PORT: u16 = 8080;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter("mock_service=debug,tower_http=info")
        .init();

    let port = match std::env::var("SERVER_PORT") {
        Ok(port) => port.parse().context("SERVER_PORT must be a port number")?,
        Err(_) => DEFAULT_PORT,
    };

    mock_service::run(SocketAddr::from(([0, 0, 0, 0], port)), MockConfig::default()).await
}
