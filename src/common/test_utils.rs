use crate::common::RelayOutput;
use crate::http::{HttpConfig, HttpEchoServer};
use crate::network::Endpoint;
use crate::Result;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;
use tokio::task::JoinHandle;

/// In-memory relay output shared by every request of a test server
///
/// Stands in for the server's stdout so tests can inspect relayed bytes.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl CapturedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything relayed so far
    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().map(|buf| buf.clone()).unwrap_or_default()
    }
}

impl RelayOutput for CapturedOutput {
    type Writer = CapturedWriter;

    fn open(&self) -> Self::Writer {
        CapturedWriter {
            inner: self.inner.clone(),
        }
    }
}

/// Writer handed out by [`CapturedOutput`]
#[derive(Debug)]
pub struct CapturedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl AsyncWrite for CapturedWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("captured output lock poisoned"))?;
        inner.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Starts an echo server on an ephemeral loopback port for tests
///
/// Returns the server task, the address it listens on and the output its
/// request bodies are relayed to. The listener is bound before this
/// returns, so clients can connect immediately.
pub async fn spawn_test_server() -> Result<(JoinHandle<Result<()>>, SocketAddr, CapturedOutput)> {
    spawn_test_server_with_config(HttpConfig::new(Endpoint::from_args(["127.0.0.1", "0"]))).await
}

/// Like [`spawn_test_server`] with a custom configuration
pub async fn spawn_test_server_with_config(
    config: HttpConfig,
) -> Result<(JoinHandle<Result<()>>, SocketAddr, CapturedOutput)> {
    let output = CapturedOutput::new();
    let server = HttpEchoServer::with_output(config, output.clone());

    let listener = server.bind().await?;
    let addr = listener.local_addr()?;

    let server_handle = tokio::spawn(async move { server.serve(listener).await });

    Ok((server_handle, addr, output))
}
