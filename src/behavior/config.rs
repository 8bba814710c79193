use super::source::BehaviorSource;
use http::StatusCode;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Artificial latency in milliseconds
pub const DELAY_VAR: &str = "DELAY";
/// Response status code
pub const STATUS_CODE_VAR: &str = "STATUS_CODE";
/// Minimum response body length in bytes
pub const RESPONSE_SIZE_VAR: &str = "RESPONSE_SIZE";

/// A single override that could not be used
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BehaviorError {
    #[error("{key}={value:?} is not a valid integer")]
    NotAnInteger { key: &'static str, value: String },
    #[error("{key}={value} is not a usable final status code")]
    InvalidStatus { key: &'static str, value: u16 },
}

/// Behavior overrides resolved for one request
///
/// # Examples
///
/// ```
/// use httpecho::behavior::{Behavior, MapSource};
/// use http::StatusCode;
///
/// let source = MapSource::new()
///     .with("STATUS_CODE", "abc")
///     .with("RESPONSE_SIZE", "128");
/// let behavior = Behavior::resolve(&source);
///
/// assert_eq!(behavior.status, StatusCode::OK);
/// assert_eq!(behavior.response_size, Some(128));
/// assert_eq!(behavior.delay, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Behavior {
    /// How long to hold the request before responding
    pub delay: Option<Duration>,
    /// Status to answer with
    pub status: StatusCode,
    /// Pad the body with `x` up to this many bytes
    pub response_size: Option<usize>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            delay: None,
            status: StatusCode::OK,
            response_size: None,
        }
    }
}

impl Behavior {
    /// Resolves every override independently, logging and discarding the bad ones
    pub fn resolve<S: BehaviorSource + ?Sized>(source: &S) -> Self {
        Self {
            delay: settle(Self::delay(source)),
            status: settle(Self::status(source)).unwrap_or(StatusCode::OK),
            response_size: settle(Self::response_size(source)),
        }
    }

    /// `DELAY`, as a non-negative number of milliseconds
    pub fn delay<S: BehaviorSource + ?Sized>(
        source: &S,
    ) -> std::result::Result<Option<Duration>, BehaviorError> {
        let millis: Option<u64> = parse_var(source, DELAY_VAR)?;
        Ok(millis.map(Duration::from_millis))
    }

    /// `STATUS_CODE`, restricted to final statuses (200-999)
    pub fn status<S: BehaviorSource + ?Sized>(
        source: &S,
    ) -> std::result::Result<Option<StatusCode>, BehaviorError> {
        let Some(code) = parse_var::<S, u16>(source, STATUS_CODE_VAR)? else {
            return Ok(None);
        };
        match StatusCode::from_u16(code) {
            Ok(status) if !status.is_informational() => Ok(Some(status)),
            _ => Err(BehaviorError::InvalidStatus {
                key: STATUS_CODE_VAR,
                value: code,
            }),
        }
    }

    /// `RESPONSE_SIZE`, in bytes
    pub fn response_size<S: BehaviorSource + ?Sized>(
        source: &S,
    ) -> std::result::Result<Option<usize>, BehaviorError> {
        parse_var(source, RESPONSE_SIZE_VAR)
    }
}

fn parse_var<S, T>(source: &S, key: &'static str) -> std::result::Result<Option<T>, BehaviorError>
where
    S: BehaviorSource + ?Sized,
    T: FromStr,
{
    let Some(value) = source.lookup(key) else {
        return Ok(None);
    };
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| BehaviorError::NotAnInteger { key, value })
}

/// Treats an unusable override as if it were unset
fn settle<T>(result: std::result::Result<Option<T>, BehaviorError>) -> Option<T> {
    result.unwrap_or_else(|e| {
        debug!(error = %e, "Ignoring behavior override");
        None
    })
}
