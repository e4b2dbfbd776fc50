//! HTTP server mounting a [`Dispatcher`] on hyper.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, LengthLimitError, Limited, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::app::DispatchError;
use crate::dispatch::Dispatcher;
use crate::http::{DispatchRequest, HttpStatus, Method, Response};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body type handed to hyper. An error aborts the connection.
pub type HyperBody = UnsyncBoxBody<Bytes, DispatchError>;

/// HTTP/1.1 server running one task per connection.
pub struct HttpServer {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
}

impl HttpServer {
    /// Bind to the address configured in the dispatcher's config.
    pub async fn bind(dispatcher: Dispatcher) -> Result<Self, BoxError> {
        let addr: SocketAddr = dispatcher.config().bind_addr().parse()?;
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            dispatcher: Arc::new(dispatcher),
        })
    }

    /// The address actually bound, useful with port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// Serve until the process ends.
    pub async fn run(self) -> Result<(), BoxError> {
        let (_keep_open, shutdown) = watch::channel(false);
        self.serve(shutdown).await
    }

    /// Serve until `shutdown` changes.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> Result<(), BoxError> {
        info!("HTTP server listening on {}", self.local_addr()?);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, remote_addr) = accepted?;
                    let io = TokioIo::new(stream);
                    let dispatcher = self.dispatcher.clone();

                    tokio::task::spawn(async move {
                        let service = service_fn(move |req| {
                            let dispatcher = dispatcher.clone();
                            async move { handle_request(req, dispatcher, remote_addr).await }
                        });

                        if let Err(err) = http1::Builder::new()
                            .serve_connection(io, service)
                            .await
                        {
                            error!("Error serving connection from {}: {:?}", remote_addr, err);
                        }
                    });
                }
                _ = shutdown.changed() => {
                    info!("HTTP server shutting down");
                    break;
                }
            }
        }

        self.dispatcher.hooks().shutdown();
        Ok(())
    }
}

/// Handle an incoming HTTP request.
async fn handle_request(
    req: Request<Incoming>,
    dispatcher: Arc<Dispatcher>,
    remote_addr: SocketAddr,
) -> Result<hyper::Response<HyperBody>, Infallible> {
    debug!("Handling request: {} {} from {}", req.method(), req.uri(), remote_addr);

    let request = match convert_request(req, dispatcher.config().max_body_size).await {
        Ok(request) => request,
        Err(status) => {
            warn!("Rejecting request from {}: {}", remote_addr, status);
            return Ok(build_response(dispatcher.error_response(&status.into())));
        }
    };

    Ok(build_response(dispatcher.dispatch(request).await))
}

/// Convert a hyper request into a [`DispatchRequest`].
async fn convert_request(
    req: Request<Incoming>,
    max_body_size: usize,
) -> Result<DispatchRequest, HttpStatus> {
    let (parts, body) = req.into_parts();

    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let body = match Limited::new(body, max_body_size).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) if err.is::<LengthLimitError>() => {
            return Err(HttpStatus::payload_too_large())
        }
        Err(err) => {
            return Err(HttpStatus::bad_request().with_extra_information(err.to_string()))
        }
    };

    Ok(DispatchRequest {
        method: Method::from(&parts.method),
        path,
        headers,
        body,
    })
}

/// Build a hyper response whose body streams the dispatcher's chunks.
fn build_response(response: Response) -> hyper::Response<HyperBody> {
    let status = hyper::StatusCode::from_u16(response.status.code).unwrap_or_else(|_| {
        warn!(
            "Invalid status code {}, falling back to 500 Internal Server Error",
            response.status.code
        );
        hyper::StatusCode::INTERNAL_SERVER_ERROR
    });

    let mut headers = HeaderMap::new();
    for (name, value) in response.headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!("Dropping invalid response header {:?}", name),
        }
    }

    let body = StreamBody::new(response.body.map_ok(Frame::data)).boxed_unsync();
    let mut hyper_response = hyper::Response::new(body);
    *hyper_response.status_mut() = status;
    *hyper_response.headers_mut() = headers;
    hyper_response
}
