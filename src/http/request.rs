use bytes::Bytes;
use http::{Method, Version};
use percent_encoding::percent_decode_str;
use std::collections::BTreeMap;

/// Canonical form of a header name: the first letter and every letter
/// following a `-` upper-cased, all other letters lower-cased
///
/// Names containing anything other than token characters are returned
/// unchanged.
///
/// # Examples
///
/// ```
/// use httpecho::http::canonical_header_name;
///
/// assert_eq!(canonical_header_name("user-agent"), "User-Agent");
/// assert_eq!(canonical_header_name("X-FORWARDED-FOR"), "X-Forwarded-For");
/// assert_eq!(canonical_header_name("te"), "Te");
/// ```
pub fn canonical_header_name(name: &str) -> String {
    if !name.bytes().all(is_token_byte) {
        return name.to_string();
    }

    let mut upper = true;
    name.chars()
        .map(|c| {
            let mapped = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            mapped
        })
        .collect()
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// Request headers keyed by canonical name
///
/// Names that differ only in case are merged into one entry; values keep the
/// order in which they arrived. Iteration is in ascending byte order of the
/// canonical names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMultimap {
    entries: BTreeMap<String, Vec<Bytes>>,
}

impl HeaderMultimap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value under the canonical form of `name`
    pub fn append(&mut self, name: &str, value: impl Into<Bytes>) {
        self.entries
            .entry(canonical_header_name(name))
            .or_default()
            .push(value.into());
    }

    /// All values for `name`, matched case-insensitively
    pub fn get_all(&self, name: &str) -> &[Bytes] {
        self.entries
            .get(&canonical_header_name(name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether any value for `name` contains `token` as a comma-separated element
    pub fn contains_token(&self, name: &str, token: &str) -> bool {
        self.get_all(name).iter().any(|value| {
            value
                .split(|&b| b == b',')
                .any(|part| part.trim_ascii().eq_ignore_ascii_case(token.as_bytes()))
        })
    }

    /// Removes every value for `name`, returning them in arrival order
    pub fn remove(&mut self, name: &str) -> Option<Vec<Bytes>> {
        self.entries.remove(&canonical_header_name(name))
    }

    /// Number of distinct header names
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Bytes])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }
}

impl<N, V> FromIterator<(N, V)> for HeaderMultimap
where
    N: AsRef<str>,
    V: Into<Bytes>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.append(name.as_ref(), value);
        }
        headers
    }
}

/// One fully received HTTP request
#[derive(Debug, Clone)]
pub struct EchoRequest {
    pub method: Method,
    /// Percent-decoded path component of the request target, without the
    /// query string
    pub path: String,
    pub version: Version,
    pub headers: HeaderMultimap,
    pub body: Bytes,
}

impl EchoRequest {
    /// Builds a request with no headers, no body and HTTP/1.1
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            version: Version::HTTP_11,
            headers: HeaderMultimap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<Bytes>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Whether the client asked to keep the connection open after this request
    pub fn keep_alive(&self) -> bool {
        if self.headers.contains_token("connection", "close") {
            return false;
        }
        match self.version {
            Version::HTTP_10 | Version::HTTP_09 => {
                self.headers.contains_token("connection", "keep-alive")
            }
            _ => true,
        }
    }
}

/// Extracts the percent-decoded path from a request target
///
/// Handles origin-form (`/a?b`), absolute-form (`http://host/a?b`) and the
/// asterisk form used by `OPTIONS *`. Escapes decoding to invalid UTF-8 are
/// replaced with U+FFFD. Returns `None` when a `%` is not followed by two hex
/// digits.
///
/// ```
/// use httpecho::http::target_path;
///
/// assert_eq!(target_path("/a%20b/caf%C3%A9?q=1").as_deref(), Some("/a b/café"));
/// assert_eq!(target_path("/100%"), None);
/// ```
pub fn target_path(target: &str) -> Option<String> {
    let raw = match target.parse::<http::Uri>() {
        Ok(uri) if uri.scheme().is_some() || target.starts_with('/') => uri.path().to_string(),
        _ => target
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    if !has_valid_escapes(&raw) {
        return None;
    }
    Some(percent_decode_str(&raw).decode_utf8_lossy().into_owned())
}

fn has_valid_escapes(path: &str) -> bool {
    let bytes = path.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escape = bytes.get(i + 1..i + 3);
            if !escape.is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit)) {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}
