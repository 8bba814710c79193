use super::codec::{HttpProtocolError, body_allowed};
use crate::common::EchoClient;
use crate::{EchoError, Result};
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use http::{Method, StatusCode};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Configuration for HTTP echo clients
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Read timeout for operations
    pub read_timeout: Duration,
    /// Write timeout for operations
    pub write_timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Buffer size for reading data
    pub buffer_size: usize,
    /// Maximum response size to prevent memory exhaustion
    pub max_response_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            buffer_size: 8192,
            max_response_size: 64 * 1024 * 1024,
        }
    }
}

/// Builder for client configuration
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    pub fn max_response_size(mut self, size: usize) -> Self {
        self.config.max_response_size = size;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// A request as sent by [`HttpEchoClient`]
///
/// Headers go on the wire exactly as given, in order. `Content-Length` is
/// added only when the body is non-empty.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    pub method: Method,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl ClientRequest {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target)
    }

    pub fn post(target: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(Method::POST, target).body(body)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_slice(self.method.as_str().as_bytes());
        dst.put_u8(b' ');
        dst.put_slice(self.target.as_bytes());
        dst.put_slice(b" HTTP/1.1\r\n");
        for (name, value) in &self.headers {
            dst.put_slice(name.as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        if !self.body.is_empty() {
            dst.put_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }
        dst.put_slice(b"\r\n");
        dst.put_slice(&self.body);
    }
}

/// A response read by [`HttpEchoClient`]
#[derive(Debug, Clone)]
pub struct EchoReply {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl EchoReply {
    /// First value of the named header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body as UTF-8 text
    pub fn text(&self) -> Result<String> {
        Ok(String::from_utf8(self.body.to_vec())?)
    }

    /// Whether the server announced it will close the connection
    pub fn closes_connection(&self) -> bool {
        self.header("connection")
            .is_some_and(|v| v.eq_ignore_ascii_case("close"))
    }
}

struct ResponseHead {
    status: StatusCode,
    headers: Vec<(String, String)>,
    content_length: Option<usize>,
}

/// HTTP/1.1 client for talking to an echo server
///
/// One connection is reused for consecutive requests as long as the server
/// keeps it alive.
///
/// # Examples
///
/// ```no_run
/// use httpecho::http::{ClientRequest, HttpEchoClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let addr = "127.0.0.1:8080".parse()?;
///     let mut client = HttpEchoClient::connect(addr).await?;
///
///     let reply = client
///         .send(&ClientRequest::get("/test").header("User-Agent", "test"))
///         .await?;
///     println!("{} {}", reply.status, reply.text()?);
///     Ok(())
/// }
/// ```
pub struct HttpEchoClient {
    stream: TcpStream,
    config: ClientConfig,
    buffer: BytesMut,
}

impl HttpEchoClient {
    /// Connect with default configuration
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with_config(addr, ClientConfig::default()).await
    }

    /// Connect to a server with custom configuration
    pub async fn connect_with_config(addr: SocketAddr, config: ClientConfig) -> Result<Self> {
        let stream = timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| EchoError::Timeout("Connection timeout".to_string()))??;
        let buffer = BytesMut::with_capacity(config.buffer_size);
        Ok(Self {
            stream,
            config,
            buffer,
        })
    }

    /// Get client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sends one request and reads its response
    pub async fn send(&mut self, request: &ClientRequest) -> Result<EchoReply> {
        let mut out = BytesMut::new();
        request.encode(&mut out);

        timeout(self.config.write_timeout, async {
            self.stream.write_all(&out).await?;
            self.stream.flush().await
        })
        .await
        .map_err(|_| EchoError::Timeout("Write timeout".to_string()))??;

        self.read_reply(&request.method).await
    }

    /// Sends a `GET` for `target`
    pub async fn get(&mut self, target: &str) -> Result<EchoReply> {
        self.send(&ClientRequest::get(target)).await
    }

    async fn read_reply(&mut self, method: &Method) -> Result<EchoReply> {
        let head = loop {
            if let Some(head) = self.parse_head()? {
                if head.status.is_informational() {
                    continue;
                }
                break head;
            }
            if self.fill().await? == 0 {
                return Err(HttpProtocolError::IncompleteResponse.into());
            }
        };

        let body = if *method == Method::HEAD || !body_allowed(head.status) {
            Bytes::new()
        } else if let Some(len) = head.content_length {
            if len > self.config.max_response_size {
                return Err(EchoError::Config(format!(
                    "Response too large: {len} bytes, max allowed: {}",
                    self.config.max_response_size
                )));
            }
            while self.buffer.len() < len {
                if self.fill().await? == 0 {
                    return Err(HttpProtocolError::IncompleteResponse.into());
                }
            }
            self.buffer.split_to(len).freeze()
        } else {
            // No length: the body runs until the server closes the connection.
            while self.fill().await? > 0 {}
            self.buffer.split().freeze()
        };

        Ok(EchoReply {
            status: head.status,
            headers: head.headers,
            body,
        })
    }

    fn parse_head(&mut self) -> Result<Option<ResponseHead>> {
        let mut headers = [httparse::EMPTY_HEADER; 64];
        let mut response = httparse::Response::new(&mut headers);

        let parsed_len = match response.parse(&self.buffer) {
            Ok(httparse::Status::Complete(parsed_len)) => parsed_len,
            Ok(httparse::Status::Partial) => return Ok(None),
            Err(e) => return Err(HttpProtocolError::HttpParse(e.to_string()).into()),
        };

        let status = response
            .code
            .and_then(|code| StatusCode::from_u16(code).ok())
            .ok_or_else(|| HttpProtocolError::InvalidResponse("missing status code".to_string()))?;

        let mut content_length = None;
        let mut header_list = Vec::with_capacity(response.headers.len());
        for header in response.headers.iter() {
            let value = String::from_utf8_lossy(header.value).into_owned();
            if header.name.eq_ignore_ascii_case("content-length") {
                content_length = Some(value.trim().parse::<usize>().map_err(|_| {
                    HttpProtocolError::InvalidResponse(format!("bad Content-Length {value:?}"))
                })?);
            }
            header_list.push((header.name.to_string(), value));
        }

        self.buffer.advance(parsed_len);
        Ok(Some(ResponseHead {
            status,
            headers: header_list,
            content_length,
        }))
    }

    async fn fill(&mut self) -> Result<usize> {
        if self.buffer.len() > self.config.max_response_size {
            return Err(EchoError::Config(format!(
                "Response too large: more than {} bytes",
                self.config.max_response_size
            )));
        }
        timeout(self.config.read_timeout, self.stream.read_buf(&mut self.buffer))
            .await
            .map_err(|_| EchoError::Timeout("Read timeout".to_string()))?
            .map_err(EchoError::from)
    }
}

#[async_trait]
impl EchoClient for HttpEchoClient {
    /// POSTs `data` to `/` and returns the echoed response body
    async fn echo(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let reply = self
            .send(&ClientRequest::post("/", Bytes::copy_from_slice(data)))
            .await?;
        Ok(reply.body.to_vec())
    }
}
