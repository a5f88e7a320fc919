use super::body::{relay_body, ChunkedEncoder};
use super::config::ClientConfig;
use super::protocol::{encode_echo_request_head, read_head, ResponseHead};
use crate::network::Endpoint;
use crate::{EchoError, Result};

use ::http::StatusCode;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::Encoder;
use tracing::{debug, info, warn};

/// HTTP echo client
///
/// Posts an input stream to `/echo` on the configured endpoint and relays
/// the response body to an output stream. Nothing is buffered beyond one
/// chunk in either direction.
///
/// # Examples
///
/// ```no_run
/// use httpecho::{ClientConfig, Endpoint, HttpEchoClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = HttpEchoClient::new(ClientConfig::new(Endpoint::default()));
///
///     let mut response = Vec::new();
///     let status = client.send(&b"hello world"[..], &mut response).await?;
///     assert_eq!(status, http::StatusCode::OK);
///     assert_eq!(response, b"received\n");
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct HttpEchoClient {
    config: ClientConfig,
}

impl HttpEchoClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sends `input` as the body of `POST /echo` and relays the response body to `output`
    ///
    /// The request body is uploaded while the response is read, so a server
    /// that answers early is still relayed. The response body is written to
    /// `output` whatever its status; the status is returned.
    pub async fn send<R, W>(&self, mut input: R, output: &mut W) -> Result<StatusCode>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let endpoint = &self.config.endpoint;
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
        debug!(%endpoint, peer = ?stream.peer_addr().ok(), "Connected to echo server");

        let (mut reader, mut writer) = stream.into_split();

        let upload = upload_body(&mut input, &mut writer, endpoint, self.config.buffer_size);
        let download = download_response(&mut reader, output, &self.config);
        let (uploaded, status) = tokio::join!(upload, download);

        let status = status?;
        match uploaded {
            Ok(sent) => info!(size = sent, status = status.as_u16(), "Echo request complete"),
            Err(e) => {
                warn!(error = %e, status = status.as_u16(), "Response arrived before the request body was sent")
            }
        }

        Ok(status)
    }
}

/// Writes the request head, then `input` as chunked body pieces as they are read
async fn upload_body<R, W>(
    input: &mut R,
    writer: &mut W,
    endpoint: &Endpoint,
    chunk_size: usize,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut out = BytesMut::new();
    encode_echo_request_head(endpoint, &mut out);
    writer.write_all(&out).await?;
    out.clear();

    let mut encoder = ChunkedEncoder;
    let mut chunk = BytesMut::with_capacity(chunk_size);
    let mut sent = 0u64;

    loop {
        chunk.reserve(chunk_size);
        let n = input.read_buf(&mut chunk).await?;
        if n == 0 {
            break;
        }
        sent += n as u64;

        encoder.encode(chunk.split().freeze(), &mut out)?;
        writer.write_all(&out).await?;
        out.clear();
    }

    encoder.finish(&mut out);
    writer.write_all(&out).await?;
    writer.flush().await?;

    Ok(sent)
}

/// Reads the final response head and relays its body to `output`
async fn download_response<R, W>(
    reader: &mut R,
    output: &mut W,
    config: &ClientConfig,
) -> Result<StatusCode>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(config.buffer_size);

    let head = loop {
        let head = read_head(reader, &mut buf, config.max_header_size, ResponseHead::parse)
            .await?
            .ok_or_else(|| {
                EchoError::Protocol("Connection closed before a response arrived".to_string())
            })?;
        if head.status.is_informational() {
            debug!(status = head.status.as_u16(), "Skipping interim response");
            continue;
        }
        break head;
    };

    let relayed = relay_body(reader, &mut buf, head.framing, output, config.buffer_size).await?;
    debug!(status = head.status.as_u16(), size = relayed, "Relayed response body");

    Ok(head.status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// One-shot server answering with a canned response after reading the request
    async fn canned_server(response: &'static [u8]) -> (tokio::task::JoinHandle<Vec<u8>>, Endpoint) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buffer = [0u8; 1024];
            while !request.ends_with(b"0\r\n\r\n") {
                let n = socket.read(&mut buffer).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buffer[..n]);
            }
            socket.write_all(response).await.unwrap();
            socket.shutdown().await.unwrap();
            request
        });

        (handle, Endpoint::from_args(["127.0.0.1".to_string(), port.to_string()]))
    }

    #[tokio::test]
    async fn test_request_is_chunked_post() {
        let (server, endpoint) =
            canned_server(b"HTTP/1.1 200 OK\r\nContent-Length: 9\r\n\r\nreceived\n").await;
        let client = HttpEchoClient::new(ClientConfig::new(endpoint.clone()));

        let mut output = Vec::new();
        let status = client.send(&b"hello world"[..], &mut output).await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(output, b"received\n");

        let request = String::from_utf8(server.await.unwrap()).unwrap();
        assert!(request.starts_with("POST /echo HTTP/1.1\r\n"));
        assert!(request.contains(&format!("Host: {}\r\n", endpoint.authority())));
        assert!(request.contains("Transfer-Encoding: chunked\r\n"));
        assert!(request.ends_with("\r\n\r\nb\r\nhello world\r\n0\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_empty_input_sends_last_chunk_only() {
        let (server, endpoint) =
            canned_server(b"HTTP/1.1 200 OK\r\nContent-Length: 9\r\n\r\nreceived\n").await;
        let client = HttpEchoClient::new(ClientConfig::new(endpoint));

        let mut output = Vec::new();
        client.send(&b""[..], &mut output).await.unwrap();
        assert_eq!(output, b"received\n");

        let request = server.await.unwrap();
        assert!(request.ends_with(b"\r\n\r\n0\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_chunked_response_and_interim_status() {
        let (_server, endpoint) = canned_server(
            b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nrece\r\n5\r\nived\n\r\n0\r\n\r\n",
        )
        .await;
        let client = HttpEchoClient::new(ClientConfig::new(endpoint));

        let mut output = Vec::new();
        let status = client.send(&b"data"[..], &mut output).await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(output, b"received\n");
    }

    #[tokio::test]
    async fn test_body_until_close_is_relayed() {
        let (_server, endpoint) = canned_server(b"HTTP/1.0 404 Not Found\r\n\r\nnope").await;
        let client = HttpEchoClient::new(ClientConfig::new(endpoint));

        let mut output = Vec::new();
        let status = client.send(&b"data"[..], &mut output).await.unwrap();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(output, b"nope");
    }

    #[tokio::test]
    async fn test_status_returned_when_upload_fails_after_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // answers as soon as the head is in, without waiting for the body
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buffer = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buffer).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buffer[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 9\r\nConnection: close\r\n\r\nreceived\n")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });

        let input = tokio_test::io::Builder::new()
            .read(b"partial")
            .read_error(std::io::Error::other("input went away"))
            .build();

        let client = HttpEchoClient::new(ClientConfig::new(Endpoint::from_args([
            "127.0.0.1".to_string(),
            port.to_string(),
        ])));
        let mut output = Vec::new();
        let status = client.send(input, &mut output).await.unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(output, b"received\n");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = HttpEchoClient::new(ClientConfig::new(Endpoint::from_args([
            "127.0.0.1".to_string(),
            port.to_string(),
        ])));
        let mut output = Vec::new();
        let err = client.send(&b"data"[..], &mut output).await.unwrap_err();
        assert!(matches!(err, EchoError::Io(_)));
    }
}
