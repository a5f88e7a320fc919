use std::fmt;
use std::str::FromStr;

/// Host used when none is given on the command line
pub const DEFAULT_HOST: &str = "localhost";
/// Port used when none is given on the command line, or when it does not parse
pub const DEFAULT_PORT: u16 = 3000;

/// Host and port pair that a server binds to or a client connects to
///
/// The host is kept unresolved so that names such as `localhost` go through
/// the system resolver at bind/connect time.
///
/// # Examples
///
/// ```
/// use httpecho::Endpoint;
///
/// let endpoint = Endpoint::from_args(["0.0.0.0".to_string(), "8080".to_string()]);
/// assert_eq!(endpoint.to_string(), "0.0.0.0:8080");
///
/// let defaults = Endpoint::from_args(Vec::<String>::new());
/// assert_eq!(defaults.to_string(), "localhost:3000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or IP literal
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = crate::EchoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| crate::EchoError::Config(format!("Missing port in endpoint: {s}")))?;
        if host.is_empty() {
            return Err(crate::EchoError::Config(format!("Missing host in endpoint: {s}")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| crate::EchoError::Config(format!("Invalid port in endpoint {s}: {e}")))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl Endpoint {
    /// Builds an endpoint from the positional `[host] [port]` arguments
    ///
    /// An empty host falls back to `localhost`; a missing or non-numeric
    /// port falls back to `3000`. Extra arguments are ignored.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut args = args.into_iter();
        let host = args
            .next()
            .map(|h| h.as_ref().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = args
            .next()
            .and_then(|p| p.as_ref().parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        Self { host, port }
    }

    /// Value for the `Host` request header
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            // bare IPv6 literal
            format!("[{}]:{}", self.host, self.port)
        } else {
            self.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_args() {
        let endpoint = Endpoint::from_args(Vec::<String>::new());
        assert_eq!(endpoint, Endpoint::default());
        assert_eq!(endpoint.host, "localhost");
        assert_eq!(endpoint.port, 3000);
    }

    #[test]
    fn test_host_and_port_args() {
        let endpoint = Endpoint::from_args(["127.0.0.1", "8080"]);
        assert_eq!(endpoint.host, "127.0.0.1");
        assert_eq!(endpoint.port, 8080);
    }

    #[test]
    fn test_host_only() {
        let endpoint = Endpoint::from_args(["example.test"]);
        assert_eq!(endpoint.host, "example.test");
        assert_eq!(endpoint.port, 3000);
    }

    #[test]
    fn test_bad_port_falls_back() {
        assert_eq!(Endpoint::from_args(["localhost", "http"]).port, 3000);
        assert_eq!(Endpoint::from_args(["localhost", "70000"]).port, 3000);
        assert_eq!(Endpoint::from_args(["localhost", ""]).port, 3000);
        assert_eq!(Endpoint::from_args(["localhost", "8080abc"]).port, 3000);
    }

    #[test]
    fn test_port_zero_is_kept() {
        // lets a server bind an ephemeral port
        assert_eq!(Endpoint::from_args(["127.0.0.1", "0"]).port, 0);
    }

    #[test]
    fn test_empty_host_falls_back() {
        let endpoint = Endpoint::from_args(["", "4000"]);
        assert_eq!(endpoint.host, "localhost");
        assert_eq!(endpoint.port, 4000);
    }

    #[test]
    fn test_from_str() {
        let endpoint: Endpoint = "localhost:3000".parse().unwrap();
        assert_eq!(endpoint, Endpoint::default());

        let v6: Endpoint = "::1:9000".parse().unwrap();
        assert_eq!(v6.host, "::1");
        assert_eq!(v6.port, 9000);

        assert!("localhost".parse::<Endpoint>().is_err());
        assert!(":3000".parse::<Endpoint>().is_err());
        assert!("localhost:port".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_display_and_authority() {
        let endpoint = Endpoint::from_args(["127.0.0.1", "8080"]);
        assert_eq!(endpoint.to_string(), "127.0.0.1:8080");
        assert_eq!(endpoint.authority(), "127.0.0.1:8080");

        let v6 = Endpoint::from_args(["::1", "8080"]);
        assert_eq!(v6.authority(), "[::1]:8080");
    }
}
