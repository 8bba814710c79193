use super::request::EchoRequest;
use crate::behavior::{Behavior, BehaviorSource, EnvSource};
use bytes::{BufMut, Bytes, BytesMut};
use http::StatusCode;
use tokio::time::Instant;
use tracing::{info, warn};

/// Byte used to pad responses up to the requested size
pub const PADDING_BYTE: u8 = b'x';
/// Largest body `RESPONSE_SIZE` may pad to unless configured otherwise
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 64 * 1024 * 1024;

/// Response produced by the echo handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Turns a request into its textual echo
///
/// The handler keeps no state between requests. Behavior overrides are
/// resolved from its [`BehaviorSource`] on every call.
///
/// # Examples
///
/// ```
/// use httpecho::behavior::MapSource;
/// use httpecho::http::{EchoHandler, EchoRequest};
/// use http::{Method, StatusCode};
///
/// # tokio_test::block_on(async {
/// let handler = EchoHandler::new(MapSource::new().with("STATUS_CODE", "404"));
/// let request = EchoRequest::new(Method::GET, "/test").with_header("User-Agent", "test");
///
/// let response = handler.handle(request).await;
/// assert_eq!(response.status, StatusCode::NOT_FOUND);
/// assert_eq!(
///     response.body,
///     "Method: GET\n\nPath: /test\n\nHeaders:\nUser-Agent: test\n\n"
/// );
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct EchoHandler<S = EnvSource> {
    source: S,
    max_response_size: usize,
}

impl<S: BehaviorSource + Default> Default for EchoHandler<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S: BehaviorSource> EchoHandler<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
        }
    }

    /// Caps the size `RESPONSE_SIZE` can pad a body to
    ///
    /// Rendered bodies longer than the cap are still sent whole.
    pub fn with_max_response_size(mut self, max_response_size: usize) -> Self {
        self.max_response_size = max_response_size;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn max_response_size(&self) -> usize {
        self.max_response_size
    }

    /// Answers one request
    ///
    /// Never fails: bad overrides fall back to their defaults and the body has
    /// already been reduced to empty by the transport if it could not be read.
    ///
    /// The transport receives the whole body (answering `Expect: 100-continue`
    /// on the way) before calling this, so `DELAY` starts once the request is
    /// complete. Callers still wait at least `DELAY` for the response.
    pub async fn handle(&self, request: EchoRequest) -> EchoResponse {
        let start = Instant::now();
        let behavior = Behavior::resolve(&self.source);

        if let Some(delay) = behavior.delay {
            tokio::time::sleep(delay).await;
        }

        let target = behavior.response_size.map(|size| {
            if size > self.max_response_size {
                warn!(
                    requested = size,
                    limit = self.max_response_size,
                    "Response size clamped"
                );
            }
            size.min(self.max_response_size)
        });

        let mut body = render(&request);
        pad(&mut body, target);

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(
            method = %request.method,
            path = %request.path,
            status = behavior.status.as_u16(),
            time_ms = format_args!("{elapsed_ms:.3}"),
            "Echoed request"
        );

        EchoResponse {
            status: behavior.status,
            body: body.freeze(),
        }
    }
}

/// Renders the method, path, headers and body of a request
///
/// Header values are joined with `", "`. The `Body:` block is only present
/// for a non-empty body, which is copied verbatim.
pub fn render(request: &EchoRequest) -> BytesMut {
    let mut out = BytesMut::with_capacity(128 + request.body.len());

    out.put_slice(b"Method: ");
    out.put_slice(request.method.as_str().as_bytes());
    out.put_slice(b"\n\nPath: ");
    out.put_slice(request.path.as_bytes());
    out.put_slice(b"\n\nHeaders:\n");

    for (name, values) in request.headers.iter() {
        out.put_slice(name.as_bytes());
        out.put_slice(b": ");
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                out.put_slice(b", ");
            }
            out.put_slice(value);
        }
        out.put_u8(b'\n');
    }
    out.put_u8(b'\n');

    if !request.body.is_empty() {
        out.put_slice(b"Body: ");
        out.put_slice(&request.body);
        out.put_u8(b'\n');
    }

    out
}

/// Appends [`PADDING_BYTE`] until `body` is `target` bytes long
///
/// Bodies already at or above the target are left untouched.
pub fn pad(body: &mut BytesMut, target: Option<usize>) {
    if let Some(target) = target.filter(|&target| target > body.len()) {
        body.put_bytes(PADDING_BYTE, target - body.len());
    }
}
