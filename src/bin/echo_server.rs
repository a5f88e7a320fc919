use color_eyre::eyre::{Result, WrapErr};
use httpecho::{EchoServerTrait, Endpoint, HttpConfig, HttpEchoServer};

use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Stdout carries relayed request bodies, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter("httpecho=info")
        .with_writer(std::io::stderr)
        .init();

    // Usage: echo-server [host] [port]
    let endpoint = Endpoint::from_args(std::env::args().skip(1));
    let config = HttpConfig::new(endpoint);

    info!(endpoint = %config.endpoint, "Starting HTTP echo server");

    let server = HttpEchoServer::new(config);
    server
        .run()
        .await
        .wrap_err("Failed to run HTTP echo server")?;

    Ok(())
}
