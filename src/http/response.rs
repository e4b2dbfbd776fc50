//! Response head and streamed body handed back to the transport.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::stream::{Stream, StreamExt};

use crate::app::DispatchError;
use crate::dispatch::encoder::EncodedStream;

/// Status line written to the transport, e.g. `200 OK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLine {
    pub code: u16,
    pub reason: &'static str,
}

impl StatusLine {
    pub const OK: StatusLine = StatusLine::new(200, "OK");

    pub const fn new(code: u16, reason: &'static str) -> Self {
        Self { code, reason }
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason)
    }
}

/// Ordered response header list. Names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList(Vec<(String, String)>);

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any existing ones with the same name.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Replace every header with this name by a single one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.0.push((name, value.into()));
    }

    /// Remove all headers with this name.
    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// First value for this name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a str> + 'n
    where
        'a: 'n,
    {
        self.0
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<(String, String)>> for HeaderList {
    fn from(headers: Vec<(String, String)>) -> Self {
        HeaderList(headers)
    }
}

impl Extend<(String, String)> for HeaderList {
    fn extend<I: IntoIterator<Item = (String, String)>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

impl IntoIterator for HeaderList {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A committed response: status line and headers, plus a lazily produced
/// body.
///
/// By the time a `Response` exists the head is final. Body bytes are only
/// produced when the body is polled.
#[derive(Debug)]
pub struct Response {
    pub status: StatusLine,
    pub headers: HeaderList,
    pub body: ResponseBody,
}

impl Response {
    /// Drain the body and return it with the head. Mostly useful in tests
    /// and in-process callers.
    pub async fn into_parts(self) -> Result<(StatusLine, HeaderList, Bytes), DispatchError> {
        let body = self.body.collect().await?;
        Ok((self.status, self.headers, body))
    }
}

/// Response body as a stream of encoded chunks.
///
/// Either a complete buffer (error responses, no-content responses) or a
/// stream driven by the response encoder that tears the request context
/// down when it finishes, fails or is dropped.
pub struct ResponseBody {
    inner: Inner,
}

enum Inner {
    Full(Option<Bytes>),
    Streaming(EncodedStream),
}

impl ResponseBody {
    /// A zero-length body.
    pub fn empty() -> Self {
        Self {
            inner: Inner::Full(None),
        }
    }

    /// A complete body produced in one piece.
    pub fn full(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Self::empty();
        }
        Self {
            inner: Inner::Full(Some(bytes)),
        }
    }

    pub(crate) fn streaming(stream: EncodedStream) -> Self {
        Self {
            inner: Inner::Streaming(stream),
        }
    }

    /// Whether the body was produced in one piece rather than streamed.
    pub fn is_full(&self) -> bool {
        matches!(self.inner, Inner::Full(_))
    }

    /// Concatenate every chunk. Fails with the first mid-stream failure.
    pub async fn collect(mut self) -> Result<Bytes, DispatchError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner {
            Inner::Full(ref bytes) => f
                .debug_tuple("ResponseBody::Full")
                .field(&bytes.as_ref().map(|b| b.len()).unwrap_or(0))
                .finish(),
            Inner::Streaming(_) => f.write_str("ResponseBody::Streaming"),
        }
    }
}

impl Stream for ResponseBody {
    type Item = Result<Bytes, DispatchError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.get_mut().inner {
            Inner::Full(ref mut bytes) => Poll::Ready(bytes.take().map(Ok)),
            Inner::Streaming(ref mut stream) => Pin::new(stream).poll_next(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_list_set_replaces_case_insensitively() {
        let mut headers = HeaderList::new();
        headers.add("Set-Cookie", "a=1");
        headers.add("set-cookie", "b=2");
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get_all("SET-COOKIE").count(), 2);

        headers.set("content-type", "application/json");
        assert_eq!(headers.len(), 3);
        assert_eq!(headers.get("Content-Type"), Some("application/json"));
    }

    #[test]
    fn header_lookup_outlives_name() {
        let mut headers = HeaderList::new();
        headers.add("Location", "/home");

        let location = {
            let name = String::from("location");
            headers.get(&name)
        };
        let all: Vec<&str> = {
            let name = String::from("LOCATION");
            headers.get_all(&name).collect()
        };
        assert_eq!(location, Some("/home"));
        assert_eq!(all, vec!["/home"]);
    }

    #[test]
    fn status_line_display() {
        assert_eq!(StatusLine::OK.to_string(), "200 OK");
        assert_eq!(StatusLine::new(304, "Not Modified").to_string(), "304 Not Modified");
    }

    #[tokio::test]
    async fn full_body_yields_once() {
        let body = ResponseBody::full("hello");
        assert!(body.is_full());
        assert_eq!(body.collect().await.unwrap(), Bytes::from("hello"));

        let empty = ResponseBody::full(Bytes::new());
        assert_eq!(empty.collect().await.unwrap().len(), 0);
    }
}
