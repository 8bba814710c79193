use color_eyre::eyre::{Result, WrapErr};
use httpecho::behavior::EnvSource;
use httpecho::common::EchoServerTrait;
use httpecho::http::{HttpConfig, HttpEchoServer, listen_port};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("httpecho=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let port = listen_port(&EnvSource).wrap_err("Failed to read listener port")?;
    let config = HttpConfig::default().with_port(port);

    info!(
        address = %config.bind_addr,
        max_connections = config.max_connections,
        "Starting HTTP echo server"
    );

    let server = HttpEchoServer::new(config, EnvSource);
    server.run().await.wrap_err("Failed to run HTTP echo server")?;

    Ok(())
}
