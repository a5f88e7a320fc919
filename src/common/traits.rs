use crate::Result;
use async_trait::async_trait;
use tokio::io::AsyncWrite;

/// Common trait for echo servers
///
/// This trait defines the interface the echo server binaries drive.
#[async_trait]
pub trait EchoServerTrait {
    /// Starts the echo server and listens for connections
    async fn run(&self) -> Result<()>;

    /// Returns a shutdown signal sender that can be used to gracefully shutdown the server
    fn shutdown_signal(&self) -> tokio::sync::broadcast::Sender<()>;
}

/// Destination for relayed request bodies
///
/// Each echoed request opens its own writer; a request's body is written to
/// it in arrival order and flushed before the response is sent.
pub trait RelayOutput: Clone + Send + Sync + 'static {
    type Writer: AsyncWrite + Unpin + Send;

    /// Opens a writer for one request body
    fn open(&self) -> Self::Writer;
}

/// Relays request bodies to the process's standard output
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutOutput;

impl RelayOutput for StdoutOutput {
    type Writer = tokio::io::Stdout;

    fn open(&self) -> Self::Writer {
        tokio::io::stdout()
    }
}
