//! Request descriptor seen by the routing engine.
//!
//! The transport layer owns real requests; it only has to expose them
//! through [`MockRequest`] for the engine to match and mutate them.
//! [`http::Request`] implements it directly.

use crate::error::RequestError;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::uri::{PathAndQuery, Uri};
use http::Method;
use std::fmt;

/// Narrow view of an outgoing or incoming request.
pub trait MockRequest {
    /// HTTP method
    fn method(&self) -> &str;

    /// Request path, without the query string
    fn path(&self) -> &str;

    /// Add a header unless one with the same name (case-insensitive) is
    /// already present. Returns whether the header was added.
    fn add_header(&mut self, name: &str, value: &str) -> bool;

    /// Raw query string, without the leading `?`
    fn query(&self) -> Option<&str>;

    /// Replace the raw query string. Returns `false` if the resulting URI
    /// would be invalid, in which case the request is unchanged.
    fn set_query(&mut self, query: &str) -> bool;
}

/// In-memory request descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl RequestDescriptor {
    /// Build a descriptor from a method and a URI (absolute or origin-form).
    ///
    /// A `#fragment` is never part of a request target and is dropped.
    pub fn new(method: &str, uri: &str) -> Result<Self, RequestError> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| RequestError::InvalidMethod(method.to_string()))?;

        let target = uri.split_once('#').map_or(uri, |(target, _)| target);
        let uri = target
            .parse::<Uri>()
            .map_err(|e| RequestError::InvalidUri {
                uri: uri.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Vec::new(),
        })
    }

    /// Append a header, keeping any existing values of the same name.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, RequestError> {
        let (name, value) = parse_header(name, value)
            .ok_or_else(|| RequestError::InvalidHeader(name.to_string()))?;
        self.headers.append(name, value);
        Ok(self)
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header (case-insensitive lookup).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }
}

impl MockRequest for RequestDescriptor {
    fn method(&self) -> &str {
        self.method.as_str()
    }

    fn path(&self) -> &str {
        self.uri.path()
    }

    fn add_header(&mut self, name: &str, value: &str) -> bool {
        add_header_to(&mut self.headers, name, value)
    }

    fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    fn set_query(&mut self, query: &str) -> bool {
        match with_query(&self.uri, query) {
            Some(uri) => {
                self.uri = uri;
                true
            }
            None => false,
        }
    }
}

impl<B> MockRequest for http::Request<B> {
    fn method(&self) -> &str {
        http::Request::method(self).as_str()
    }

    fn path(&self) -> &str {
        self.uri().path()
    }

    fn add_header(&mut self, name: &str, value: &str) -> bool {
        add_header_to(self.headers_mut(), name, value)
    }

    fn query(&self) -> Option<&str> {
        self.uri().query()
    }

    fn set_query(&mut self, query: &str) -> bool {
        match with_query(self.uri(), query) {
            Some(uri) => {
                *self.uri_mut() = uri;
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.method, self.uri)?;
        for (name, value) in &self.headers {
            writeln!(f, "{}: {}", name, String::from_utf8_lossy(value.as_bytes()))?;
        }
        Ok(())
    }
}

fn parse_header(name: &str, value: &str) -> Option<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
    let value = HeaderValue::from_str(value).ok()?;
    Some((name, value))
}

fn add_header_to(headers: &mut HeaderMap, name: &str, value: &str) -> bool {
    let Some((name, value)) = parse_header(name, value) else {
        return false;
    };
    if headers.contains_key(&name) {
        return false;
    }
    headers.insert(name, value);
    true
}

/// Same URI with its query replaced.
fn with_query(uri: &Uri, query: &str) -> Option<Uri> {
    let path_and_query = PathAndQuery::try_from(format!("{}?{}", uri.path(), query)).ok()?;
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query);
    Uri::from_parts(parts).ok()
}
