//! End-to-end tests running the HTTP server on a local port.

use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full};
use hyper::client::conn::http1;
use hyper::Request;
use hyper_util::rt::TokioIo;
use lathe::prelude::*;
use tokio::net::TcpStream;
use tokio::sync::watch;

#[controller]
async fn site(ctx: &mut RequestContext, segments: Vec<String>) -> Result<Body, DispatchError> {
    match segments.as_slice() {
        [] => Ok(Body::from("Index")),
        [first] if first == "echo" => Ok(Body::from(ctx.body().clone())),
        [first, n] if first == "count" => {
            let n: u32 = n.parse().map_err(|_| HttpStatus::bad_request())?;
            let numbers = (1..=n).map(|i| Ok::<_, DispatchError>(i.to_string()));
            Ok(Body::stream(futures::stream::iter(numbers)))
        }
        _ => Err(HttpStatus::not_found().into()),
    }
}

async fn start(config: AppConfig) -> (SocketAddr, watch::Sender<bool>) {
    let dispatcher = Dispatcher::new(SiteController::new(), config.host("127.0.0.1").port(0));
    let server = HttpServer::bind(dispatcher).await.unwrap();
    let addr = server.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        server.serve(shutdown_rx).await.unwrap();
    });
    (addr, shutdown_tx)
}

async fn send<B>(addr: SocketAddr, request: Request<B>) -> (u16, hyper::HeaderMap, Bytes)
where
    B: hyper::body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut sender, conn) = http1::handshake(TokioIo::new(stream)).await.unwrap();
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let response = sender.send_request(request).await.unwrap();
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

fn get(addr: SocketAddr, path: &str) -> Request<Empty<Bytes>> {
    Request::builder()
        .uri(path)
        .header("Host", addr.to_string())
        .body(Empty::new())
        .unwrap()
}

#[tokio::test]
async fn test_server_serves_root() {
    let (addr, shutdown) = start(AppConfig::new()).await;

    let (status, _, body) = send(addr, get(addr, "/")).await;
    assert_eq!(status, 200);
    assert_eq!(body, "Index");

    shutdown.send(true).unwrap();
}

#[tokio::test]
async fn test_server_streams_body() {
    let (addr, shutdown) = start(AppConfig::new()).await;

    let (status, _, body) = send(addr, get(addr, "/count/3")).await;
    assert_eq!(status, 200);
    assert_eq!(body, "123");

    shutdown.send(true).unwrap();
}

#[tokio::test]
async fn test_server_maps_errors() {
    let (addr, shutdown) = start(AppConfig::new()).await;

    let (status, headers, body) = send(addr, get(addr, "/nowhere")).await;
    assert_eq!(status, 404);
    assert_eq!(headers.get("content-type").unwrap(), "text/plain");

    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["statusCode"], 404);
    assert_eq!(value["message"], "Not Found");
    assert!(value["stackTrace"].is_null());

    shutdown.send(true).unwrap();
}

#[tokio::test]
async fn test_server_passes_request_body() {
    let (addr, shutdown) = start(AppConfig::new()).await;

    let request = Request::builder()
        .method("POST")
        .uri("/echo")
        .header("Host", addr.to_string())
        .body(Full::new(Bytes::from_static(b"ping")))
        .unwrap();
    let (status, _, body) = send(addr, request).await;
    assert_eq!(status, 200);
    assert_eq!(body, "ping");

    shutdown.send(true).unwrap();
}

#[tokio::test]
async fn test_server_rejects_oversized_body() {
    let (addr, shutdown) = start(AppConfig::new().max_body_size(4)).await;

    let request = Request::builder()
        .method("POST")
        .uri("/echo")
        .header("Host", addr.to_string())
        .body(Full::new(Bytes::from_static(b"far too long")))
        .unwrap();
    let (status, _, body) = send(addr, request).await;
    assert_eq!(status, 413);

    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["statusCode"], 413);

    shutdown.send(true).unwrap();
}
