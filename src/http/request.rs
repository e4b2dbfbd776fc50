//! Inbound request shape handed to the dispatcher by the transport.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// HTTP method enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    /// Any extension method, kept verbatim.
    #[serde(untagged)]
    Other(String),
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Delete => write!(f, "DELETE"),
            Method::Patch => write!(f, "PATCH"),
            Method::Head => write!(f, "HEAD"),
            Method::Options => write!(f, "OPTIONS"),
            Method::Other(name) => write!(f, "{}", name),
        }
    }
}

impl From<&str> for Method {
    fn from(name: &str) -> Self {
        match name {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "PATCH" => Method::Patch,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            other => Method::Other(other.to_string()),
        }
    }
}

impl From<&hyper::Method> for Method {
    fn from(method: &hyper::Method) -> Self {
        Method::from(method.as_str())
    }
}

/// One inbound call: `{method, path, headerSource, bodySource}`.
///
/// `path` is the raw request target including the leading slash and the
/// optional query string, exactly as the transport received it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// HTTP method.
    pub method: Method,
    /// Raw request path, query string included.
    pub path: String,
    /// Request headers in arrival order.
    pub headers: Vec<(String, String)>,
    /// Raw request body.
    #[serde(default)]
    pub body: Bytes,
}

impl DispatchRequest {
    /// Create a new request with no headers and an empty body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Shorthand for a `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Add a header to the request.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Get the first header with the given name, compared case-insensitively.
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }
}

impl Default for DispatchRequest {
    fn default() -> Self {
        Self::get("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_round_trips_through_str() {
        assert_eq!(Method::from("POST"), Method::Post);
        assert_eq!(Method::from("PROPFIND"), Method::Other("PROPFIND".into()));
        assert_eq!(Method::Other("PROPFIND".into()).to_string(), "PROPFIND");
        assert_eq!(Method::from(&hyper::Method::DELETE), Method::Delete);
    }

    #[test]
    fn header_lookup_ignores_case() {
        let request = DispatchRequest::get("/").header("Content-Type", "text/plain");
        assert_eq!(request.get_header("content-type"), Some("text/plain"));
        assert_eq!(request.get_header("accept"), None);
    }
}
