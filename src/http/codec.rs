use super::config::HttpConfig;
use super::handler::EchoResponse;
use super::request::{EchoRequest, HeaderMultimap, target_path};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use http::{Method, StatusCode, Version};
use std::fmt::Write as _;
use std::io;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

/// Interim response sent to clients waiting on `Expect: 100-continue`
pub const CONTINUE_RESPONSE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Upper bound on what a `Content-Length` header alone may make us allocate
const INITIAL_BODY_CAPACITY: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum HttpProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("HTTP parsing error: {0}")]
    HttpParse(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Incomplete response")]
    IncompleteResponse,
}

/// Something the server has to answer
#[derive(Debug)]
pub enum Inbound {
    /// A request ready for the echo handler
    ///
    /// `close` is set when the body could not be read; the connection must be
    /// closed after answering since its framing can no longer be trusted.
    Request { request: EchoRequest, close: bool },
    /// The request head was unusable; answer with this status and close
    Rejected(StatusCode),
}

/// Response ready to be written to the wire
#[derive(Debug, Clone)]
pub struct Outbound {
    pub status: StatusCode,
    pub body: Bytes,
    /// `false` for responses to `HEAD`
    pub include_body: bool,
    pub keep_alive: bool,
}

impl Outbound {
    pub fn echo(response: EchoResponse, method: &Method, keep_alive: bool) -> Self {
        Self {
            status: response.status,
            body: response.body,
            include_body: *method != Method::HEAD,
            keep_alive,
        }
    }

    /// Plain-text error answer, always closing the connection
    pub fn rejection(status: StatusCode) -> Self {
        Self {
            status,
            body: Bytes::from(format!("{} {}", status.as_u16(), reason_phrase(status))),
            include_body: true,
            keep_alive: false,
        }
    }
}

/// Reason phrase for the status line; codes without one get `status code <n>`
pub fn reason_phrase(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("status code {}", status.as_u16()))
}

/// Statuses whose responses must not carry a body
pub fn body_allowed(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

#[derive(Debug)]
enum Framing {
    Length(usize),
    Chunked(ChunkState),
}

#[derive(Debug, Clone, Copy)]
enum ChunkState {
    Size,
    Data(usize),
    DataEnd,
    Trailers,
}

#[derive(Debug)]
enum DecodeState {
    Head,
    Body {
        request: EchoRequest,
        framing: Framing,
        body: BytesMut,
    },
    /// Framing was lost; everything else on the connection is discarded
    Closed,
}

/// HTTP/1.x server codec
///
/// Decodes requests (head plus `Content-Length` or chunked body) and encodes
/// echo responses.
#[derive(Debug)]
pub struct HttpCodec {
    state: DecodeState,
    max_headers: usize,
    max_head_size: usize,
    max_body_size: usize,
    server_name: Option<String>,
    continue_pending: bool,
}

impl HttpCodec {
    pub fn new(config: &HttpConfig) -> Self {
        Self {
            state: DecodeState::Head,
            max_headers: config.max_headers,
            max_head_size: config.max_head_size,
            max_body_size: config.max_body_size,
            server_name: config.server_name.clone(),
            continue_pending: false,
        }
    }

    /// Returns `true` once per request whose client is waiting for `100 Continue`
    pub fn take_continue(&mut self) -> bool {
        std::mem::take(&mut self.continue_pending)
    }

    fn decode_head(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>, HttpProtocolError> {
        let mut headers = vec![httparse::EMPTY_HEADER; self.max_headers];
        let mut req = httparse::Request::new(&mut headers);

        let parsed_len = match req.parse(src) {
            Ok(httparse::Status::Complete(parsed_len)) => parsed_len,
            Ok(httparse::Status::Partial) => {
                if src.len() > self.max_head_size {
                    return Ok(Some(self.reject(src, StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE)));
                }
                return Ok(None);
            }
            Err(httparse::Error::TooManyHeaders) => {
                return Ok(Some(self.reject(src, StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE)));
            }
            Err(e) => {
                debug!(error = %e, "Failed to parse request head");
                return Ok(Some(self.reject(src, StatusCode::BAD_REQUEST)));
            }
        };

        let method = req.method.and_then(|m| Method::from_bytes(m.as_bytes()).ok());
        let (Some(method), Some(target)) = (method, req.path) else {
            return Ok(Some(self.reject(src, StatusCode::BAD_REQUEST)));
        };
        let version = match req.version {
            Some(0) => Version::HTTP_10,
            _ => Version::HTTP_11,
        };

        let Some(path) = target_path(target) else {
            debug!(request_target = target, "Malformed escape in request target");
            return Ok(Some(self.reject(src, StatusCode::BAD_REQUEST)));
        };

        let mut headers: HeaderMultimap = req
            .headers
            .iter()
            .map(|h| (h.name, Bytes::copy_from_slice(h.value)))
            .collect();
        let framing = body_framing(&headers);
        strip_transport_headers(&mut headers, &framing);

        let request = EchoRequest {
            method,
            path,
            version,
            headers,
            body: Bytes::new(),
        };
        src.advance(parsed_len);

        let framing = match framing {
            Ok(framing) => framing,
            Err(reason) => {
                debug!(reason, "Unreadable request body");
                return Ok(Some(self.unreadable_body(src, request)));
            }
        };

        match framing {
            Framing::Length(0) => {
                return Ok(Some(Inbound::Request {
                    request,
                    close: false,
                }));
            }
            Framing::Length(len) if len > self.max_body_size => {
                debug!(len, limit = self.max_body_size, "Request body too large");
                return Ok(Some(self.unreadable_body(src, request)));
            }
            _ => {}
        }

        self.continue_pending = request.version == Version::HTTP_11
            && request.headers.contains_token("expect", "100-continue");

        let capacity = match framing {
            Framing::Length(len) => len.min(INITIAL_BODY_CAPACITY),
            Framing::Chunked(_) => 0,
        };
        self.state = DecodeState::Body {
            request,
            framing,
            body: BytesMut::with_capacity(capacity),
        };
        self.decode_body(src)
    }

    fn decode_body(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>, HttpProtocolError> {
        let max_body_size = self.max_body_size;
        let progress = match &mut self.state {
            DecodeState::Body {
                framing: Framing::Length(remaining),
                body,
                ..
            } => {
                let n = (*remaining).min(src.len());
                body.extend_from_slice(&src.split_to(n));
                *remaining -= n;
                Ok(*remaining == 0)
            }
            DecodeState::Body {
                framing: Framing::Chunked(state),
                body,
                ..
            } => decode_chunks(state, body, src, max_body_size),
            _ => return Ok(None),
        };

        match progress {
            Ok(false) => Ok(None),
            Ok(true) => match std::mem::replace(&mut self.state, DecodeState::Head) {
                DecodeState::Body {
                    mut request, body, ..
                } => {
                    self.continue_pending = false;
                    request.body = body.freeze();
                    Ok(Some(Inbound::Request {
                        request,
                        close: false,
                    }))
                }
                _ => Ok(None),
            },
            Err(reason) => {
                debug!(reason, "Unreadable request body");
                match std::mem::replace(&mut self.state, DecodeState::Closed) {
                    DecodeState::Body { request, .. } => Ok(Some(self.unreadable_body(src, request))),
                    _ => Ok(None),
                }
            }
        }
    }

    fn reject(&mut self, src: &mut BytesMut, status: StatusCode) -> Inbound {
        self.close(src);
        Inbound::Rejected(status)
    }

    fn unreadable_body(&mut self, src: &mut BytesMut, request: EchoRequest) -> Inbound {
        self.close(src);
        Inbound::Request {
            request,
            close: true,
        }
    }

    fn close(&mut self, src: &mut BytesMut) {
        src.clear();
        self.continue_pending = false;
        self.state = DecodeState::Closed;
    }
}

/// Drops the headers consumed by the transport so they are not echoed
///
/// `Host` and `Transfer-Encoding` never reach the handler. A chunked body
/// also discards any `Content-Length`.
fn strip_transport_headers(headers: &mut HeaderMultimap, framing: &Result<Framing, &'static str>) {
    headers.remove("host");
    headers.remove("transfer-encoding");
    if let Ok(Framing::Chunked(_)) = framing {
        headers.remove("content-length");
    }
}

fn body_framing(headers: &HeaderMultimap) -> Result<Framing, &'static str> {
    let transfer_encoding = headers.get_all("transfer-encoding");
    if !transfer_encoding.is_empty() {
        let last = transfer_encoding
            .iter()
            .flat_map(|value| value.split(|&b| b == b','))
            .map(|coding| coding.trim_ascii())
            .filter(|coding| !coding.is_empty())
            .last();
        return match last {
            Some(coding) if coding.eq_ignore_ascii_case(b"chunked") => {
                Ok(Framing::Chunked(ChunkState::Size))
            }
            _ => Err("unsupported transfer encoding"),
        };
    }

    let mut length = None;
    for value in headers.get_all("content-length") {
        let parsed = std::str::from_utf8(value)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .ok_or("invalid content length")?;
        match length {
            Some(previous) if previous != parsed => return Err("conflicting content lengths"),
            _ => length = Some(parsed),
        }
    }
    Ok(Framing::Length(length.unwrap_or(0)))
}

/// Advances the chunked decoder as far as `src` allows; `Ok(true)` once the
/// terminating chunk and trailers have been consumed
fn decode_chunks(
    state: &mut ChunkState,
    body: &mut BytesMut,
    src: &mut BytesMut,
    max_body_size: usize,
) -> Result<bool, &'static str> {
    loop {
        match *state {
            ChunkState::Size => match httparse::parse_chunk_size(src) {
                Ok(httparse::Status::Complete((consumed, size))) => {
                    src.advance(consumed);
                    let size = usize::try_from(size).map_err(|_| "chunk too large")?;
                    if body.len().saturating_add(size) > max_body_size {
                        return Err("body too large");
                    }
                    *state = if size == 0 {
                        ChunkState::Trailers
                    } else {
                        ChunkState::Data(size)
                    };
                }
                Ok(httparse::Status::Partial) => return Ok(false),
                Err(_) => return Err("invalid chunk size"),
            },
            ChunkState::Data(remaining) => {
                if src.is_empty() {
                    return Ok(false);
                }
                let n = remaining.min(src.len());
                body.extend_from_slice(&src.split_to(n));
                *state = match remaining - n {
                    0 => ChunkState::DataEnd,
                    left => ChunkState::Data(left),
                };
            }
            ChunkState::DataEnd => {
                if src.len() < 2 {
                    return Ok(false);
                }
                if &src[..2] != b"\r\n" {
                    return Err("missing chunk terminator");
                }
                src.advance(2);
                *state = ChunkState::Size;
            }
            ChunkState::Trailers => {
                let Some(end) = src.iter().position(|&b| b == b'\n') else {
                    return Ok(false);
                };
                let line = src.split_to(end + 1);
                if line.trim_ascii().is_empty() {
                    return Ok(true);
                }
            }
        }
    }
}

impl Decoder for HttpCodec {
    type Item = Inbound;
    type Error = HttpProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.state {
            DecodeState::Head => self.decode_head(src),
            DecodeState::Body { .. } => self.decode_body(src),
            DecodeState::Closed => {
                src.clear();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(inbound) = self.decode(src)? {
            return Ok(Some(inbound));
        }
        match std::mem::replace(&mut self.state, DecodeState::Closed) {
            // Peer went away mid-body: answer what we know of the request.
            DecodeState::Body { request, .. } => Ok(Some(self.unreadable_body(src, request))),
            _ => {
                src.clear();
                Ok(None)
            }
        }
    }
}

impl Encoder<Outbound> for HttpCodec {
    type Error = HttpProtocolError;

    fn encode(&mut self, item: Outbound, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let fmt_err = |_: std::fmt::Error| HttpProtocolError::HttpParse("failed to format response head".to_string());
        let with_body = body_allowed(item.status);

        write!(
            dst,
            "HTTP/1.1 {} {}\r\n",
            item.status.as_u16(),
            reason_phrase(item.status)
        )
        .map_err(fmt_err)?;
        write!(
            dst,
            "Date: {}\r\n",
            chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT")
        )
        .map_err(fmt_err)?;
        if let Some(server) = &self.server_name {
            write!(dst, "Server: {server}\r\n").map_err(fmt_err)?;
        }
        if with_body {
            dst.put_slice(b"Content-Type: text/plain; charset=utf-8\r\n");
            write!(dst, "Content-Length: {}\r\n", item.body.len()).map_err(fmt_err)?;
        }
        if item.keep_alive {
            dst.put_slice(b"Connection: keep-alive\r\n");
        } else {
            dst.put_slice(b"Connection: close\r\n");
        }
        dst.put_slice(b"\r\n");

        if with_body && item.include_body {
            dst.put_slice(&item.body);
        }
        Ok(())
    }
}
