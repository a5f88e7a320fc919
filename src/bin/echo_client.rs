use color_eyre::eyre::{Result, WrapErr};
use httpecho::{ClientConfig, Endpoint, HttpEchoClient};

use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Stdout carries the response body, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter("httpecho=warn")
        .with_writer(std::io::stderr)
        .init();

    // Usage: echo-client [host] [port] < input
    let endpoint = Endpoint::from_args(std::env::args().skip(1));
    let client = HttpEchoClient::new(ClientConfig::new(endpoint));

    let mut stdout = tokio::io::stdout();
    let status = client
        .send(tokio::io::stdin(), &mut stdout)
        .await
        .wrap_err_with(|| format!("Echo request to {} failed", client.config().endpoint))?;

    debug!(status = status.as_u16(), "Response relayed");

    Ok(())
}
