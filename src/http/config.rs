use super::handler::DEFAULT_MAX_RESPONSE_SIZE;
use crate::behavior::BehaviorSource;
use crate::{EchoError, Result};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Listener port, read once at startup
pub const PORT_VAR: &str = "PORT";
/// Port used when `PORT` is not set
pub const DEFAULT_PORT: u16 = 8080;

/// Configuration for the HTTP echo server
///
/// # Examples
///
/// ```rust
/// use httpecho::http::HttpConfig;
/// use std::time::Duration;
///
/// let config = HttpConfig::default()
///     .with_port(9000)
///     .with_max_connections(500)
///     .with_read_timeout(Duration::from_secs(5));
///
/// assert_eq!(config.bind_addr.port(), 9000);
/// assert_eq!(config.max_connections, 500);
/// ```
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Network address to bind to
    pub bind_addr: SocketAddr,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Initial size of each connection's read buffer
    pub buffer_size: usize,
    /// How long a connection may sit idle waiting for request bytes
    pub read_timeout: Duration,
    /// Write timeout for responses
    pub write_timeout: Duration,
    /// Maximum number of header lines in a request
    pub max_headers: usize,
    /// Maximum size of a request line plus headers, in bytes
    pub max_head_size: usize,
    /// Bodies larger than this are treated as unreadable
    pub max_body_size: usize,
    /// Upper bound on the size `RESPONSE_SIZE` may pad a response to
    pub max_response_size: usize,
    /// Value of the `Server` response header, if any
    pub server_name: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_connections: 1000,
            buffer_size: 8192,
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            max_headers: 100,
            max_head_size: 1024 * 1024,
            max_body_size: 10 * 1024 * 1024,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            server_name: None,
        }
    }
}

impl HttpConfig {
    /// Binds all interfaces on `port`
    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }

    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn with_max_response_size(mut self, max_response_size: usize) -> Self {
        self.max_response_size = max_response_size;
        self
    }

    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = Some(server_name.into());
        self
    }
}

/// Resolves the listener port from `PORT`
///
/// Unlike the per-request overrides, a bad port is an error: silently binding
/// somewhere else would hide the misconfiguration.
pub fn listen_port<S: BehaviorSource + ?Sized>(source: &S) -> Result<u16> {
    match source.lookup(PORT_VAR) {
        None => Ok(DEFAULT_PORT),
        Some(value) if value.is_empty() => Ok(DEFAULT_PORT),
        Some(value) => value
            .parse()
            .map_err(|e| EchoError::Config(format!("Invalid {PORT_VAR} {value:?}: {e}"))),
    }
}
