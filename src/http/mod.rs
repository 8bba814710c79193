//! HTTP echo server implementation
//!
//! Requests of any method on any path are answered with a plain-text
//! reflection of their method, path, headers and body. See
//! [`handler::render`] for the exact format.

pub mod client;
pub mod codec;
pub mod config;
pub mod handler;
pub mod request;
pub mod server;


pub use client::{ClientConfig, ClientConfigBuilder, ClientRequest, EchoReply, HttpEchoClient};
pub use codec::{HttpCodec, HttpProtocolError, Inbound, Outbound};
pub use config::{DEFAULT_PORT, HttpConfig, PORT_VAR, listen_port};
pub use handler::{DEFAULT_MAX_RESPONSE_SIZE, EchoHandler, EchoResponse, pad, render};
pub use request::{EchoRequest, HeaderMultimap, canonical_header_name, target_path};
pub use server::HttpEchoServer;
