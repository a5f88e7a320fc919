use super::body::relay_body;
use super::config::HttpConfig;
use super::protocol::{
    encode_response, read_head, RequestHead, Route, CONTINUE_RESPONSE, RECEIVED_BODY,
};
use crate::common::{EchoServerTrait, RelayOutput, StdoutOutput};
use crate::{EchoError, Result};

use ::http::StatusCode;
use async_trait::async_trait;
use bytes::BytesMut;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::{signal, time::timeout};
use tracing::{debug, error, info, warn, Instrument};

/// HTTP echo server
///
/// Relays the body of every `POST /echo` request to its [`RelayOutput`]
/// (stdout by default) and answers `200 received\n` once the body has been
/// relayed. Every other request is answered with an empty `404`.
///
/// # Examples
///
/// ```no_run
/// use httpecho::{EchoServerTrait, Endpoint, HttpConfig, HttpEchoServer};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = HttpConfig::new(Endpoint::from_args(["localhost", "3000"]));
///     let server = HttpEchoServer::new(config);
///     server.run().await?;
///     Ok(())
/// }
/// ```
pub struct HttpEchoServer<O: RelayOutput = StdoutOutput> {
    config: HttpConfig,
    output: O,
    shutdown_signal: Arc<tokio::sync::broadcast::Sender<()>>,
}

impl HttpEchoServer<StdoutOutput> {
    /// Creates a server that relays request bodies to stdout
    pub fn new(config: HttpConfig) -> Self {
        Self::with_output(config, StdoutOutput)
    }
}

impl<O: RelayOutput> HttpEchoServer<O> {
    /// Creates a server that relays request bodies to `output`
    pub fn with_output(config: HttpConfig, output: O) -> Self {
        let (shutdown_signal, _) = tokio::sync::broadcast::channel(1);
        Self {
            config,
            output,
            shutdown_signal: Arc::new(shutdown_signal),
        }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Binds a listener on the configured endpoint
    ///
    /// The host is resolved first; the first resolved address that binds wins.
    pub async fn bind(&self) -> Result<TcpListener> {
        let endpoint = &self.config.endpoint;
        TcpListener::bind((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| EchoError::Config(format!("Failed to bind {endpoint}: {e}")))
    }

    /// Accepts connections on `listener` until Ctrl-C or the shutdown signal
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "HTTP echo server listening");

        let config = Arc::new(self.config.clone());
        let mut shutdown_rx = self.shutdown_signal.subscribe();

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            debug!(%addr, "Accepted connection");

                            let config = config.clone();
                            let output = self.output.clone();
                            let span = tracing::info_span!("connection", %addr);

                            tokio::spawn(
                                async move {
                                    if let Err(e) = handle_connection(stream, config, output).await {
                                        error!(error = %e, "Error handling connection");
                                    }
                                    debug!("Connection closed");
                                }
                                .instrument(span),
                            );
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = signal::ctrl_c() => {
                    info!("Received shutdown signal, stopping server");
                    break;
                }
                _ = shutdown_rx.recv() => {
                    info!("Received internal shutdown signal, stopping server");
                    break;
                }
            }
        }

        info!("HTTP echo server stopped");
        Ok(())
    }
}

/// Serves requests on one connection until it closes or stops being persistent
async fn handle_connection<O: RelayOutput>(
    stream: TcpStream,
    config: Arc<HttpConfig>,
    output: O,
) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let mut buf = BytesMut::with_capacity(config.buffer_size);
    let mut response = BytesMut::new();
    let mut served = 0u64;

    loop {
        if served > 0 && buf.is_empty() {
            match timeout(config.keep_alive_timeout, reader.readable()).await {
                Ok(ready) => ready?,
                Err(_) => {
                    debug!(requests = served, "Keep-alive timeout");
                    break;
                }
            }
        }

        let head_result = timeout(
            config.header_timeout,
            read_head(&mut reader, &mut buf, config.max_header_size, RequestHead::parse),
        )
        .await;

        let head = match head_result {
            Ok(Ok(Some(head))) => head,
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                let Some(status) = e.rejection_status() else {
                    return Err(e.into());
                };
                warn!(error = %e, status = status.as_u16(), "Rejecting malformed request");
                response.clear();
                encode_response(status, b"", false, &mut response);
                writer.write_all(&response).await?;
                return linger_close(&mut reader, &mut writer, config.close_linger).await;
            }
            Err(_) => {
                warn!(timeout = ?config.header_timeout, "Timed out waiting for request head");
                break;
            }
        };

        let route = Route::for_request(&head);
        info!(method = %head.method, target = %head.target, ?route, "Received request");

        if head.expect_continue {
            writer.write_all(CONTINUE_RESPONSE).await?;
        }

        // the response goes out only after the whole body has been consumed
        let (status, body): (StatusCode, &[u8]) = match route {
            Route::Echo => {
                let mut sink = output.open();
                let relayed =
                    relay_body(&mut reader, &mut buf, head.framing, &mut sink, config.buffer_size)
                        .await?;
                debug!(size = relayed, "Relayed request body");
                (StatusCode::OK, RECEIVED_BODY)
            }
            Route::NotFound => {
                let mut discard = tokio::io::sink();
                let discarded = relay_body(
                    &mut reader,
                    &mut buf,
                    head.framing,
                    &mut discard,
                    config.buffer_size,
                )
                .await?;
                debug!(size = discarded, "Discarded request body");
                (StatusCode::NOT_FOUND, &b""[..])
            }
        };

        response.clear();
        encode_response(status, body, head.keep_alive, &mut response);
        writer.write_all(&response).await?;
        served += 1;

        if !head.keep_alive {
            return linger_close(&mut reader, &mut writer, config.close_linger).await;
        }
    }

    Ok(())
}

/// Sends FIN, then discards whatever the peer still sends for up to `linger`
///
/// Dropping a socket with unread input makes the kernel answer with a reset,
/// which can destroy the last response before the peer reads it.
async fn linger_close<R, W>(reader: &mut R, writer: &mut W, linger: Duration) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer.shutdown().await?;

    match timeout(linger, tokio::io::copy(reader, &mut tokio::io::sink())).await {
        Ok(Ok(discarded)) if discarded > 0 => debug!(size = discarded, "Discarded unread input"),
        Ok(Ok(_)) => {}
        Ok(Err(e)) => debug!(error = %e, "Peer reset while draining"),
        Err(_) => debug!(?linger, "Peer kept sending after close"),
    }
    Ok(())
}

#[async_trait]
impl<O: RelayOutput> EchoServerTrait for HttpEchoServer<O> {
    /// Binds the configured endpoint and serves until shutdown
    async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Returns a shutdown signal sender that can be used to gracefully shutdown the server
    fn shutdown_signal(&self) -> tokio::sync::broadcast::Sender<()> {
        self.shutdown_signal.as_ref().clone()
    }
}
