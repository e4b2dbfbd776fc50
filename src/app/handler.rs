//! Root controller contract and the shapes a controller may return.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};

use crate::app::{DispatchError, RequestContext};

/// One unit of body output, before encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Text(String),
    Bytes(Bytes),
}

impl From<&str> for Chunk {
    fn from(text: &str) -> Self {
        Chunk::Text(text.to_string())
    }
}

impl From<String> for Chunk {
    fn from(text: String) -> Self {
        Chunk::Text(text)
    }
}

impl From<Bytes> for Chunk {
    fn from(bytes: Bytes) -> Self {
        Chunk::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(bytes: Vec<u8>) -> Self {
        Chunk::Bytes(bytes.into())
    }
}

impl From<&'static [u8]> for Chunk {
    fn from(bytes: &'static [u8]) -> Self {
        Chunk::Bytes(Bytes::from_static(bytes))
    }
}

/// Lazily produced chunks. Each element is pulled on demand.
pub type ChunkStream = BoxStream<'static, Result<Chunk, DispatchError>>;

/// Chunks of an already materialized collection.
pub type ChunkIter = Box<dyn Iterator<Item = Chunk> + Send>;

/// What a controller returns.
pub enum Body {
    /// A single text chunk.
    Text(String),
    /// A single byte chunk.
    Bytes(Bytes),
    /// A lazy sequence. Its first element is pulled before the response
    /// head is committed.
    Stream(ChunkStream),
    /// Any other collection of chunks, enumerated in order.
    Iter(ChunkIter),
    /// No body at all.
    Empty,
}

impl Body {
    pub fn text(text: impl Into<String>) -> Self {
        Body::Text(text.into())
    }

    pub fn bytes(bytes: impl Into<Bytes>) -> Self {
        Body::Bytes(bytes.into())
    }

    pub fn empty() -> Self {
        Body::Empty
    }

    /// Wrap a lazy sequence of chunks.
    pub fn stream<S, T, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        T: Into<Chunk>,
        E: Into<DispatchError>,
    {
        Body::Stream(
            stream
                .map(|item| {
                    item.map(Into::<Chunk>::into)
                        .map_err(Into::<DispatchError>::into)
                })
                .boxed(),
        )
    }

    /// Wrap any collection of chunks.
    pub fn iter<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Chunk> + 'static,
        I::IntoIter: Send + 'static,
    {
        Body::Iter(Box::new(items.into_iter().map(Into::<Chunk>::into)))
    }

    /// Whether this body counts as "nothing": `Empty` or a zero-length
    /// single chunk.
    pub fn is_falsy(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Text(text) => text.is_empty(),
            Body::Bytes(bytes) => bytes.is_empty(),
            Body::Stream(_) | Body::Iter(_) => false,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Body::Bytes(bytes) => f.debug_tuple("Bytes").field(bytes).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
            Body::Iter(_) => f.write_str("Iter(..)"),
            Body::Empty => f.write_str("Empty"),
        }
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(bytes.into())
    }
}

impl From<()> for Body {
    fn from(_: ()) -> Self {
        Body::Empty
    }
}

impl<T: Into<Body>> From<Option<T>> for Body {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Body::Empty)
    }
}

/// Classify a loosely typed value.
///
/// Strings become a single chunk and arrays of strings a chunk collection.
/// `null`, `false`, `0`, `""` and `[]` are treated as no body. Anything else
/// is not a response body.
impl TryFrom<serde_json::Value> for Body {
    type Error = DispatchError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value;

        match value {
            Value::Null | Value::Bool(false) => Ok(Body::Empty),
            Value::Number(ref n) if n.as_f64() == Some(0.0) => Ok(Body::Empty),
            Value::String(text) => Ok(Body::Text(text)),
            Value::Array(items) if items.is_empty() => Ok(Body::Empty),
            Value::Array(items) => {
                let chunks = items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(text) => Ok(Chunk::Text(text)),
                        other => Err(DispatchError::InvalidResponseShape(format!(
                            "collection element must be a string, got {}",
                            json_kind(&other)
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Body::iter(chunks))
            }
            other => Err(DispatchError::InvalidResponseShape(format!(
                "controller response must be text, bytes, a stream or a collection, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;

    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// The root of the handler chain.
///
/// Receives the request context and the ordered path segments of the
/// request (possibly none) and produces the response body.
#[async_trait]
pub trait Controller: Send + Sync {
    async fn call(
        &self,
        ctx: &mut RequestContext,
        segments: Vec<String>,
    ) -> Result<Body, DispatchError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "root"
    }
}

/// A synchronous controller built from a function or closure.
pub struct FnController<F> {
    f: F,
}

/// Use a plain function or closure as the root controller.
pub fn from_fn<F>(f: F) -> FnController<F>
where
    F: Fn(&mut RequestContext, Vec<String>) -> Result<Body, DispatchError> + Send + Sync,
{
    FnController { f }
}

#[async_trait]
impl<F> Controller for FnController<F>
where
    F: Fn(&mut RequestContext, Vec<String>) -> Result<Body, DispatchError> + Send + Sync,
{
    async fn call(
        &self,
        ctx: &mut RequestContext,
        segments: Vec<String>,
    ) -> Result<Body, DispatchError> {
        (self.f)(ctx, segments)
    }
}
