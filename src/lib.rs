use crate::http::HttpProtocolError;
use thiserror::Error;

/// Error types for the httpecho library
#[derive(Error, Debug)]
pub enum EchoError {
    /// Network errors (bind, accept, connect, read, write)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed HTTP on the wire
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// UTF-8 encoding errors
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl From<HttpProtocolError> for EchoError {
    fn from(err: HttpProtocolError) -> Self {
        match err {
            HttpProtocolError::Io(e) => EchoError::Io(e),
            HttpProtocolError::HttpParse(msg) => EchoError::Protocol(msg),
            HttpProtocolError::InvalidResponse(msg) => EchoError::Protocol(msg),
            HttpProtocolError::IncompleteResponse => {
                EchoError::Protocol("Incomplete HTTP response".to_string())
            }
        }
    }
}

/// Result type for the httpecho library
pub type Result<T> = std::result::Result<T, EchoError>;

pub mod behavior;
pub mod common;
pub mod http;

// Re-export main types for convenience
pub use behavior::{Behavior, BehaviorSource, EnvSource, MapSource};
pub use common::{EchoClient, EchoServerTrait};
pub use crate::http::{EchoHandler, EchoRequest, EchoResponse, HttpConfig, HttpEchoClient, HttpEchoServer};
