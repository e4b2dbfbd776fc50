//! Lathe - example server
//!
//! Mounts a small demo site on the HTTP server:
//!
//! - `/` answers `Index`
//! - `/hello/<name>` greets `<name>`
//! - `/count/<n>` streams the numbers `1..=n`
//! - `/info` answers a JSON document about the request
//! - `/boom` fails with an internal error
//! - anything else is a `404`

use futures::stream;
use lathe::prelude::*;
use tracing_subscriber::EnvFilter;

/// Logs the request lifecycle.
struct AccessLog;

impl Hooks for AccessLog {
    fn app_init(&self) {
        tracing::info!("Demo site initialized");
    }

    fn begin_request(&self, ctx: &mut RequestContext) -> Result<(), DispatchError> {
        if let Some(user) = ctx.header("X-User") {
            let identity = Identity::new(user);
            ctx.set_identity(identity);
        }
        Ok(())
    }

    fn request_exited(&self, ctx: &RequestContext, failure: Option<&DispatchError>) {
        match failure {
            Some(err) => tracing::info!("{} {} failed: {}", ctx.method(), ctx.raw_path(), err),
            None => tracing::info!("{} {}", ctx.method(), ctx.raw_path()),
        }
    }

    fn shutdown(&self) {
        tracing::info!("Demo site stopped");
    }
}

#[controller(name = "demo")]
async fn site(ctx: &mut RequestContext, segments: Vec<String>) -> Result<Body, DispatchError> {
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

    match segments.as_slice() {
        [] => Ok(Body::from("Index")),
        ["hello", name] => {
            ctx.set_content_type("text/plain");
            Ok(Body::from(format!("Hello, {}!", name)))
        }
        ["count", n] => {
            let n: u32 = n
                .parse()
                .map_err(|_| HttpStatus::bad_request().with_extra_information("not a number"))?;
            let numbers = (1..=n).map(|i| Ok::<_, DispatchError>(format!("{}\n", i)));
            Ok(Body::stream(stream::iter(numbers)))
        }
        ["info"] => {
            ctx.set_content_type("application/json");
            let info = serde_json::json!({
                "method": ctx.method().to_string(),
                "path": ctx.path(),
                "query": ctx.query(),
                "identity": ctx.identity().map(|identity| identity.id.clone()),
            });
            Ok(Body::from(serde_json::to_string(&info)?))
        }
        ["boom"] => Err(anyhow::anyhow!("the demo controller blew up").into()),
        _ => Err(HttpStatus::not_found().into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Lathe demo server...");

    let config = AppConfig::new()
        .host("0.0.0.0")
        .port(8080)
        .debug(std::env::var("LATHE_DEBUG").is_ok());

    let dispatcher = Dispatcher::with_hooks(SiteController::new(), AccessLog, config);
    let server = HttpServer::bind(dispatcher).await?;

    tracing::info!("Try: curl http://localhost:8080/hello/world");
    tracing::info!("Try: curl http://localhost:8080/count/5");
    tracing::info!("Try: curl http://localhost:8080/boom");

    server.run().await
}
