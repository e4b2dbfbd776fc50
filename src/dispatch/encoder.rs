//! Turning a controller's return value into a stream of encoded chunks.
//!
//! [`ResponseEncoder::prepare`] classifies the [`Body`] before anything is
//! committed to the transport. For a lazy sequence it pulls the first
//! element right away, so a failure raised before the first chunk still
//! becomes a proper error response. Everything after that is pulled one
//! chunk at a time by [`EncodedStream`] while the transport writes the body.
//!
//! A failure after the head was committed cannot change the status any
//! more. It is logged, surfaced as a trailing chunk in debug mode (a
//! best-effort diagnostic, not a wire format) and then returned as the
//! stream's error so the transport aborts the connection.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::app::{Body, Chunk, ChunkIter, ChunkStream, DispatchError};
use crate::dispatch::dispatcher::Teardown;


//------------ Charset -------------------------------------------------------

/// Charset used to encode text chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Charset {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8", alias = "UTF-8")]
    Utf8,
    #[serde(rename = "iso-8859-1", alias = "latin-1", alias = "latin1")]
    Latin1,
    #[serde(rename = "us-ascii", alias = "ascii")]
    Ascii,
}

impl Charset {
    /// Name as used in a `Content-Type` charset parameter.
    pub fn name(&self) -> &'static str {
        match self {
            Charset::Utf8 => "utf-8",
            Charset::Latin1 => "iso-8859-1",
            Charset::Ascii => "us-ascii",
        }
    }

    /// Encode `text`, failing on the first unrepresentable character.
    pub fn encode(&self, text: String) -> Result<Bytes, DispatchError> {
        let limit = match self {
            Charset::Utf8 => return Ok(Bytes::from(text)),
            Charset::Latin1 => 0xFF,
            Charset::Ascii => 0x7F,
        };
        text.chars()
            .enumerate()
            .map(|(pos, ch)| {
                let code = u32::from(ch);
                if code <= limit {
                    Ok(code as u8)
                } else {
                    Err(DispatchError::Encoding {
                        charset: self.name(),
                        reason: format!("character {:?} at position {} is out of range", ch, pos),
                    })
                }
            })
            .collect::<Result<Vec<u8>, _>>()
            .map(Bytes::from)
    }
}


//------------ ResponseEncoder -----------------------------------------------

/// Classifies bodies and encodes chunks.
#[derive(Debug, Clone, Copy)]
pub struct ResponseEncoder {
    charset: Charset,
}

impl ResponseEncoder {
    pub fn new(charset: Charset) -> Self {
        Self { charset }
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Encode one chunk. Byte chunks pass through untouched.
    pub fn encode(&self, chunk: Chunk) -> Result<Bytes, DispatchError> {
        match chunk {
            Chunk::Text(text) => self.charset.encode(text),
            Chunk::Bytes(bytes) => Ok(bytes),
        }
    }

    /// Classify `body` and pull whatever must be known before the head is
    /// committed.
    ///
    /// - text or bytes: encoded into exactly one chunk;
    /// - lazy sequence: the first element is pulled and encoded, the rest
    ///   stays in the sequence; a sequence that ends before its first
    ///   element is an internal failure;
    /// - other collection: kept as an iterator, nothing is pulled;
    /// - empty: no chunks at all.
    pub async fn prepare(&self, body: Body) -> Result<PreparedBody, DispatchError> {
        if body.is_falsy() {
            return Ok(PreparedBody::empty());
        }

        match body {
            Body::Text(text) => Ok(PreparedBody::single(self.encode(Chunk::Text(text))?)),
            Body::Bytes(bytes) => Ok(PreparedBody::single(bytes)),
            Body::Stream(mut stream) => match stream.next().await {
                Some(first) => Ok(PreparedBody {
                    first: Some(self.encode(first?)?),
                    source: ChunkSource::Stream(stream),
                }),
                None => Err(DispatchError::InvalidResponseShape(
                    "lazy body ended before producing its first chunk".to_string(),
                )),
            },
            Body::Iter(iter) => Ok(PreparedBody {
                first: None,
                source: ChunkSource::Iter(iter),
            }),
            Body::Empty => Ok(PreparedBody::empty()),
        }
    }
}


//------------ PreparedBody --------------------------------------------------

/// A classified body, ready to be streamed.
pub struct PreparedBody {
    first: Option<Bytes>,
    source: ChunkSource,
}

pub(crate) enum ChunkSource {
    Exhausted,
    Stream(ChunkStream),
    Iter(ChunkIter),
}

impl PreparedBody {
    fn empty() -> Self {
        Self {
            first: None,
            source: ChunkSource::Exhausted,
        }
    }

    fn single(bytes: Bytes) -> Self {
        Self {
            first: Some(bytes),
            source: ChunkSource::Exhausted,
        }
    }

    /// The chunk already pulled and encoded, if any.
    pub fn first(&self) -> Option<&Bytes> {
        self.first.as_ref()
    }

    /// Whether more chunks may follow the first one.
    pub fn has_more(&self) -> bool {
        !matches!(self.source, ChunkSource::Exhausted)
    }
}


//------------ EncodedStream -------------------------------------------------

/// The streamed success body.
///
/// Owns the request context through its [`Teardown`] and runs it exactly
/// once: when the source is exhausted, when a failure is surfaced, or from
/// `Drop` if the transport gives up on the body early.
pub(crate) struct EncodedStream {
    first: Option<Bytes>,
    source: ChunkSource,
    encoder: ResponseEncoder,
    debug: bool,
    trailer: Option<Bytes>,
    failure: Option<DispatchError>,
    teardown: Option<Teardown>,
}

impl EncodedStream {
    pub(crate) fn new(
        prepared: PreparedBody,
        encoder: ResponseEncoder,
        debug: bool,
        teardown: Teardown,
    ) -> Self {
        Self {
            first: prepared.first,
            source: prepared.source,
            encoder,
            debug,
            trailer: None,
            failure: None,
            teardown: Some(teardown),
        }
    }

    fn fail(&mut self, err: DispatchError) {
        self.source = ChunkSource::Exhausted;
        error!(
            error = %err,
            trace = %err.trace(),
            "failure while serving the response"
        );
        if self.debug {
            self.trailer = Some(Bytes::from(err.to_string()));
        }
        self.failure = Some(err);
    }

    fn finish(&mut self, failure: Option<&DispatchError>) {
        if let Some(teardown) = self.teardown.take() {
            teardown.run(failure);
        }
    }
}

impl Stream for EncodedStream {
    type Item = Result<Bytes, DispatchError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(first) = this.first.take() {
            return Poll::Ready(Some(Ok(first)));
        }

        loop {
            if let Some(trailer) = this.trailer.take() {
                return Poll::Ready(Some(Ok(trailer)));
            }
            if let Some(err) = this.failure.take() {
                this.finish(Some(&err));
                return Poll::Ready(Some(Err(err)));
            }

            let next = match this.source {
                ChunkSource::Exhausted => None,
                ChunkSource::Iter(ref mut iter) => iter.next().map(Ok),
                ChunkSource::Stream(ref mut stream) => match stream.poll_next_unpin(cx) {
                    Poll::Ready(item) => item,
                    Poll::Pending => return Poll::Pending,
                },
            };

            match next {
                Some(Ok(chunk)) => match this.encoder.encode(chunk) {
                    Ok(bytes) => return Poll::Ready(Some(Ok(bytes))),
                    Err(err) => this.fail(err),
                },
                Some(Err(err)) => this.fail(err),
                None => {
                    this.source = ChunkSource::Exhausted;
                    this.finish(None);
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl Drop for EncodedStream {
    fn drop(&mut self) {
        if self.teardown.is_some() {
            debug!("response body dropped before completion");
            self.finish(Some(&DispatchError::Aborted));
        }
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_stream(
        items: Vec<&'static str>,
        pulled: Arc<AtomicUsize>,
    ) -> Body {
        Body::stream(stream::iter(items).map(move |item| {
            pulled.fetch_add(1, Ordering::SeqCst);
            Ok::<_, DispatchError>(item)
        }))
    }

    #[test]
    fn charsets_encode() {
        assert_eq!(Charset::Utf8.encode("héllo".into()).unwrap(), Bytes::from("héllo"));
        assert_eq!(
            Charset::Latin1.encode("é".into()).unwrap(),
            Bytes::from_static(&[0xE9])
        );
        assert!(matches!(
            Charset::Ascii.encode("é".into()),
            Err(DispatchError::Encoding { charset: "us-ascii", .. })
        ));
    }

    #[tokio::test]
    async fn single_chunk_bodies() {
        let encoder = ResponseEncoder::new(Charset::Utf8);

        let prepared = encoder.prepare(Body::from("Index")).await.unwrap();
        assert_eq!(prepared.first(), Some(&Bytes::from("Index")));
        assert!(!prepared.has_more());

        let prepared = encoder.prepare(Body::bytes(&b"\x00\x01"[..])).await.unwrap();
        assert_eq!(prepared.first().map(|b| b.len()), Some(2));
    }

    #[tokio::test]
    async fn falsy_bodies_prepare_empty() {
        let encoder = ResponseEncoder::new(Charset::Utf8);
        for body in [Body::Empty, Body::from(""), Body::from(Vec::<u8>::new())] {
            let prepared = encoder.prepare(body).await.unwrap();
            assert!(prepared.first().is_none());
            assert!(!prepared.has_more());
        }
    }

    #[tokio::test]
    async fn stream_prefetches_exactly_one_element() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let encoder = ResponseEncoder::new(Charset::Utf8);

        let prepared = encoder
            .prepare(counting_stream(vec!["a", "b", "c"], pulled.clone()))
            .await
            .unwrap();

        assert_eq!(pulled.load(Ordering::SeqCst), 1);
        assert_eq!(prepared.first(), Some(&Bytes::from("a")));
        assert!(prepared.has_more());
    }

    #[tokio::test]
    async fn stream_failing_before_first_element_fails_prepare() {
        let encoder = ResponseEncoder::new(Charset::Utf8);
        let body = Body::stream(stream::iter(vec![Err::<&str, _>(
            DispatchError::from(crate::http::HttpStatus::not_found()),
        )]));

        let result = encoder.prepare(body).await;
        assert!(matches!(result, Err(DispatchError::Status(_))));
    }

    #[tokio::test]
    async fn empty_stream_fails_prepare() {
        let encoder = ResponseEncoder::new(Charset::Utf8);
        let body = Body::stream(stream::empty::<Result<String, DispatchError>>());
        let result = encoder.prepare(body).await;
        assert!(matches!(result, Err(DispatchError::InvalidResponseShape(_))));
    }

    #[tokio::test]
    async fn iterables_are_not_prefetched() {
        let encoder = ResponseEncoder::new(Charset::Utf8);
        let prepared = encoder.prepare(Body::iter(vec!["x", "y"])).await.unwrap();
        assert!(prepared.first().is_none());
        assert!(prepared.has_more());
    }

    #[tokio::test]
    async fn unencodable_single_chunk_fails_prepare() {
        let encoder = ResponseEncoder::new(Charset::Ascii);
        let result = encoder.prepare(Body::from("naïve")).await;
        assert!(matches!(result, Err(DispatchError::Encoding { .. })));
    }
}
