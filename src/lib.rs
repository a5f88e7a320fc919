use crate::http::protocol::HttpProtocolError;
use thiserror::Error;

/// Error types for the httpecho library
#[derive(Error, Debug)]
pub enum EchoError {
    /// Socket and stdio errors (bind, connect, read, write)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP framing errors (malformed heads, bad chunked bodies, early EOF)
    #[error("HTTP protocol error: {0}")]
    Protocol(String),

    /// Configuration errors (bad endpoints, bind failures)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<HttpProtocolError> for EchoError {
    fn from(err: HttpProtocolError) -> Self {
        match err {
            HttpProtocolError::Io(e) => EchoError::Io(e),
            other => EchoError::Protocol(other.to_string()),
        }
    }
}

/// Result type for the httpecho library
pub type Result<T> = std::result::Result<T, EchoError>;

pub mod common;
pub mod http;
pub mod network;

// Re-export main types for convenience
pub use crate::http::{ClientConfig, HttpConfig, HttpEchoClient, HttpEchoServer};
pub use common::{EchoServerTrait, RelayOutput, StdoutOutput};
pub use network::Endpoint;
