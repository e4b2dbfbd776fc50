//! Application lifecycle hooks.

use crate::app::{DispatchError, RequestContext};

/// Optional extension points around each request.
///
/// Every method has a no-op default, so an application only overrides the
/// hooks it needs. The dispatcher holds one `Hooks` value for its whole
/// lifetime.
///
/// Order on the success path: `begin_request`, controller, `begin_response`,
/// head committed, body streamed, `end_response`, `request_exited`. On the
/// error path `begin_response` is skipped.
pub trait Hooks: Send + Sync {
    /// Called once when the dispatcher is built.
    fn app_init(&self) {}

    /// Called after the context is entered and before the controller runs.
    /// A failure here is mapped to an error response.
    fn begin_request(&self, _ctx: &mut RequestContext) -> Result<(), DispatchError> {
        Ok(())
    }

    /// Called before the response head is committed on the success path,
    /// before cookies are flattened into headers.
    fn begin_response(&self, _ctx: &mut RequestContext) {}

    /// Called after the response has been produced, on every path.
    fn end_response(&self, _ctx: &RequestContext) {}

    /// Called exactly once per request when its context exits.
    fn request_exited(&self, _ctx: &RequestContext, _failure: Option<&DispatchError>) {}

    /// Called when the server stops accepting connections.
    fn shutdown(&self) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl Hooks for NoHooks {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::DispatchRequest;
    use crate::runtime::AppConfig;

    #[test]
    fn default_hooks_do_nothing() {
        let hooks = NoHooks;
        let mut ctx = RequestContext::new(DispatchRequest::get("/a"), &AppConfig::new());

        hooks.app_init();
        assert!(hooks.begin_request(&mut ctx).is_ok());
        hooks.begin_response(&mut ctx);
        hooks.end_response(&ctx);
        hooks.request_exited(&ctx, Some(&DispatchError::Aborted));
        hooks.shutdown();

        assert!(ctx.response_headers().is_empty());
        assert!(ctx.cookies().is_empty());
    }
}
