//! # Lathe - a minimal HTTP application runtime
//!
//! Lathe dispatches every inbound request to a single root controller. The
//! request path is split into segments, the controller turns them into a
//! response body, and the runtime streams that body back or, when anything
//! fails, answers with a structured JSON error.
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!  request ─▶│ HttpServer (hyper, one task per connection)  │
//!            └──────────────────────┬───────────────────────┘
//!                                   ▼
//!            ┌──────────────────────────────────────────────┐
//!            │ Dispatcher                                   │
//!            │   RequestContext ─▶ Hooks ─▶ Controller      │
//!            │         │                       │            │
//!            │         │        ok ┌───────────┴──────┐ err │
//!            │         │           ▼                  ▼     │
//!            │         │   ResponseEncoder      ErrorMapper │
//!            │         └──────── teardown, exactly once ─── │
//!            └──────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lathe::prelude::*;
//!
//! #[controller]
//! async fn root(ctx: &mut RequestContext, segments: Vec<String>) -> Result<Body, DispatchError> {
//!     match segments.as_slice() {
//!         [] => Ok(Body::from("Index")),
//!         [name] => Ok(Body::from(format!("Hello, {}!", name))),
//!         _ => Err(HttpStatus::not_found().into()),
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let dispatcher = Dispatcher::new(RootController::new(), AppConfig::new().port(8080));
//!     HttpServer::bind(dispatcher).await?.run().await
//! }
//! ```
//!
//! ## Response bodies
//!
//! A controller returns a [`Body`](app::Body): a single text or byte chunk,
//! a lazy stream of chunks, any other collection of chunks, or nothing. A
//! lazy stream has its first element pulled before the response head is
//! committed, so a failure before the first chunk still produces a proper
//! error response.
//!
//! ## Errors
//!
//! Returning [`HttpStatus`](http::HttpStatus) maps to that status. Every
//! other failure becomes a `500` with a generic message. The error body
//! looks like:
//!
//! ```text
//! {"statusCode": 404, "message": "Not Found", "stackTrace": null, "messageFa": null}
//! ```
//!
//! `stackTrace` is only filled in debug mode.

pub mod app;
pub mod dispatch;
pub mod http;
pub mod runtime;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::app::{
        from_fn, Body, Chunk, Controller, DispatchError, Hooks, Identity, RequestContext,
    };
    pub use crate::dispatch::{Charset, Dispatcher};
    pub use crate::http::{Cookie, DispatchRequest, HttpStatus, Method, Response};
    pub use crate::runtime::{AppConfig, HttpServer};
    pub use async_trait::async_trait;
    pub use lathe_macro::controller;
}

// Re-export for convenience
pub use app::{Body, Controller, DispatchError, RequestContext};
pub use dispatch::Dispatcher;
pub use http::{DispatchRequest, HttpStatus, Response};
pub use runtime::{AppConfig, HttpServer};
