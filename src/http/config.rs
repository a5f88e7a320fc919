use crate::network::Endpoint;
use std::time::Duration;

/// Configuration for the HTTP echo server
///
/// # Examples
///
/// ```rust
/// use httpecho::http::HttpConfig;
/// use httpecho::Endpoint;
/// use std::time::Duration;
///
/// let config = HttpConfig {
///     endpoint: Endpoint::from_args(["127.0.0.1", "8080"]),
///     buffer_size: 8192,
///     max_header_size: 16 * 1024,
///     header_timeout: Duration::from_secs(60),
///     keep_alive_timeout: Duration::from_secs(5),
///     close_linger: Duration::from_secs(1),
/// };
/// assert_eq!(config.endpoint.port, 8080);
/// ```
///
/// Using the default configuration:
///
/// ```rust
/// use httpecho::http::HttpConfig;
///
/// let config = HttpConfig::default();
/// assert_eq!(config.endpoint.to_string(), "localhost:3000");
/// ```
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Host and port to bind to
    pub endpoint: Endpoint,
    /// Read buffer size for request heads and body relay
    pub buffer_size: usize,
    /// Largest request head accepted before answering 431
    pub max_header_size: usize,
    /// Time allowed for a complete request head to arrive
    pub header_timeout: Duration,
    /// Idle time allowed between requests on a persistent connection
    pub keep_alive_timeout: Duration,
    /// How long unread request bytes are drained after the last response
    pub close_linger: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            buffer_size: 8192,
            max_header_size: 16 * 1024,
            header_timeout: Duration::from_secs(60),
            keep_alive_timeout: Duration::from_secs(5),
            close_linger: Duration::from_secs(1),
        }
    }
}

impl HttpConfig {
    /// Create a configuration bound to the given endpoint with default limits
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ..Self::default()
        }
    }

    /// Set the buffer size
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Set the idle timeout for persistent connections
    pub fn with_keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.keep_alive_timeout = timeout;
        self
    }

    /// Set the time allowed for a complete request head to arrive
    pub fn with_header_timeout(mut self, timeout: Duration) -> Self {
        self.header_timeout = timeout;
        self
    }
}

/// Configuration for the HTTP echo client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Host and port of the echo server
    pub endpoint: Endpoint,
    /// Chunk size for reading input and the response
    pub buffer_size: usize,
    /// Largest response head accepted
    pub max_header_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            buffer_size: 8192,
            max_header_size: 16 * 1024,
        }
    }
}

impl ClientConfig {
    /// Create a configuration targeting the given endpoint
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ..Self::default()
        }
    }

    /// Set the buffer size
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }
}
