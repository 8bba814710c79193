use std::collections::HashMap;

/// A place to look up behavior overrides by name
///
/// Implementations must be cheap to query: the handler performs one lookup
/// per override on every request.
pub trait BehaviorSource: Send + Sync {
    /// Returns the raw value for `key`, or `None` when it is not set
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Reads overrides from the process environment at lookup time
///
/// Values are never cached, so changing the environment of a running process
/// (e.g. via a debugger or `/proc` tooling) takes effect on the next request.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl BehaviorSource for EnvSource {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed set of overrides, useful for tests and embedding
///
/// # Examples
///
/// ```
/// use httpecho::behavior::{BehaviorSource, MapSource};
///
/// let source = MapSource::new().with("STATUS_CODE", "404");
/// assert_eq!(source.lookup("STATUS_CODE").as_deref(), Some("404"));
/// assert_eq!(source.lookup("DELAY"), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    values: HashMap<String, String>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an override, replacing any previous value for `key`
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl<K, V> FromIterator<(K, V)> for MapSource
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl BehaviorSource for MapSource {
    fn lookup(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
