//! The request dispatcher.

use std::sync::Arc;

use tracing::{debug, Instrument};

use crate::app::{Controller, DispatchError, Hooks, NoHooks, RequestContext};
use crate::dispatch::encoder::{EncodedStream, PreparedBody, ResponseEncoder};
use crate::dispatch::error_mapper::ErrorMapper;
use crate::http::{DispatchRequest, Response, ResponseBody, StatusLine};
use crate::runtime::AppConfig;

/// Runs the post-response hook and exits the context.
///
/// Consuming `self` makes both happen at most once.
pub(crate) struct Teardown {
    ctx: RequestContext,
    hooks: Arc<dyn Hooks>,
}

impl Teardown {
    pub(crate) fn new(ctx: RequestContext, hooks: Arc<dyn Hooks>) -> Self {
        Self { ctx, hooks }
    }

    pub(crate) fn run(self, failure: Option<&DispatchError>) {
        let Teardown { ctx, hooks } = self;
        hooks.end_response(&ctx);
        ctx.exit(hooks.as_ref(), failure);
    }
}

/// Dispatches one request at a time to the root controller.
///
/// A request moves through these states:
///
/// ```text
/// Idle -> RequestEntered -> HandlerInvoked -> Streaming     -> Exited
///                                          \-> ErrorProduced -> Exited
/// ```
///
/// The dispatcher itself is immutable and shared between concurrent
/// requests. Each call to [`Dispatcher::dispatch`] owns its own
/// [`RequestContext`].
pub struct Dispatcher {
    root: Arc<dyn Controller>,
    hooks: Arc<dyn Hooks>,
    config: Arc<AppConfig>,
    encoder: ResponseEncoder,
    errors: ErrorMapper,
}

impl Dispatcher {
    /// Create a dispatcher without hooks.
    pub fn new(root: impl Controller + 'static, config: AppConfig) -> Self {
        Self::with_hooks(root, NoHooks, config)
    }

    /// Create a dispatcher and run the `app_init` hook.
    pub fn with_hooks(
        root: impl Controller + 'static,
        hooks: impl Hooks + 'static,
        config: AppConfig,
    ) -> Self {
        hooks.app_init();
        Self {
            root: Arc::new(root),
            hooks: Arc::new(hooks),
            encoder: ResponseEncoder::new(config.response_charset),
            errors: ErrorMapper::new(&config),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn hooks(&self) -> &dyn Hooks {
        self.hooks.as_ref()
    }

    /// Serve one request.
    ///
    /// The returned [`Response`] carries the final status line and headers.
    /// Failures before that point are already mapped into an error
    /// response. The only failures left are mid-stream ones, which surface
    /// as errors of the body stream.
    pub async fn dispatch(&self, request: DispatchRequest) -> Response {
        let mut ctx = RequestContext::new(request, &self.config);
        ctx.enter();
        let span = ctx.span().clone();

        match self.invoke(&mut ctx).instrument(span).await {
            Ok(prepared) => self.commit(ctx, prepared),
            Err(err) => self.reject(ctx, err),
        }
    }

    /// Error response for a request rejected by the transport before a
    /// context could be created.
    pub fn error_response(&self, err: &DispatchError) -> Response {
        let mapped = self.errors.map(err, None);
        Response {
            status: mapped.status,
            headers: mapped.headers,
            body: ResponseBody::full(mapped.body),
        }
    }

    /// RequestEntered -> HandlerInvoked.
    async fn invoke(&self, ctx: &mut RequestContext) -> Result<PreparedBody, DispatchError> {
        self.hooks.begin_request(ctx)?;

        let segments = ctx.segments().to_vec();
        debug!(controller = self.root.name(), ?segments, "invoking controller");
        let body = self.root.call(ctx, segments).await?;

        self.encoder.prepare(body).await
    }

    /// HandlerInvoked -> Streaming.
    fn commit(&self, mut ctx: RequestContext, prepared: PreparedBody) -> Response {
        self.hooks.begin_response(&mut ctx);
        ctx.flatten_cookies();

        let headers = ctx.response_headers().clone();
        let debug = ctx.is_debug();
        let teardown = Teardown::new(ctx, self.hooks.clone());

        Response {
            status: StatusLine::OK,
            headers,
            body: ResponseBody::streaming(EncodedStream::new(
                prepared,
                self.encoder,
                debug,
                teardown,
            )),
        }
    }

    /// RequestEntered/HandlerInvoked -> ErrorProduced.
    fn reject(&self, ctx: RequestContext, err: DispatchError) -> Response {
        let response = {
            let _guard = ctx.span().enter();
            let mapped = self.errors.map(&err, ctx.identity());
            Response {
                status: mapped.status,
                headers: mapped.headers,
                body: ResponseBody::full(mapped.body),
            }
        };
        Teardown::new(ctx, self.hooks.clone()).run(Some(&err));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{from_fn, Body};
    use crate::http::{Cookie, HttpStatus};
    use futures::stream::{self, StreamExt};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, event: impl Into<String>) {
            self.events.lock().unwrap().push(event.into());
        }
    }

    impl Hooks for Recorder {
        fn app_init(&self) {
            self.push("app_init");
        }

        fn begin_request(&self, _ctx: &mut RequestContext) -> Result<(), DispatchError> {
            self.push("begin_request");
            Ok(())
        }

        fn begin_response(&self, ctx: &mut RequestContext) {
            self.push("begin_response");
            ctx.cookies_mut().set(Cookie::new("seen", "1"));
        }

        fn end_response(&self, _ctx: &RequestContext) {
            self.push("end_response");
        }

        fn request_exited(&self, _ctx: &RequestContext, failure: Option<&DispatchError>) {
            match failure {
                Some(DispatchError::Aborted) => self.push("exit:aborted"),
                Some(_) => self.push("exit:failed"),
                None => self.push("exit"),
            }
        }
    }

    fn exits(recorder: &Recorder) -> usize {
        recorder
            .events()
            .iter()
            .filter(|e| e.starts_with("exit"))
            .count()
    }

    fn streaming_root() -> impl Controller {
        from_fn(|_ctx: &mut RequestContext, _segments: Vec<String>| {
            let items = vec![
                Ok("a".to_string()),
                Ok("b".to_string()),
                Err(DispatchError::from(anyhow::anyhow!("source went away"))),
            ];
            Ok(Body::stream(stream::iter(items)))
        })
    }

    #[tokio::test]
    async fn success_path_hook_order() {
        let recorder = Recorder::default();
        let root = from_fn(|_ctx: &mut RequestContext, _segments: Vec<String>| {
            Ok(Body::from("Index"))
        });
        let dispatcher = Dispatcher::with_hooks(root, recorder.clone(), AppConfig::new());

        let response = dispatcher.dispatch(DispatchRequest::get("/")).await;
        assert_eq!(response.headers.get("Set-Cookie"), Some("seen=1"));
        assert_eq!(
            recorder.events(),
            vec!["app_init", "begin_request", "begin_response"]
        );

        let (_, _, body) = response.into_parts().await.unwrap();
        assert_eq!(body, "Index");
        assert_eq!(
            recorder.events(),
            vec!["app_init", "begin_request", "begin_response", "end_response", "exit"]
        );
    }

    #[tokio::test]
    async fn error_path_skips_begin_response() {
        let recorder = Recorder::default();
        let root = from_fn(|_ctx: &mut RequestContext, _segments: Vec<String>| {
            Err(HttpStatus::not_found().into())
        });
        let dispatcher = Dispatcher::with_hooks(root, recorder.clone(), AppConfig::new());

        let response = dispatcher.dispatch(DispatchRequest::get("/missing")).await;
        assert_eq!(response.status.code, 404);
        assert!(response.headers.get("Set-Cookie").is_none());
        assert_eq!(
            recorder.events(),
            vec!["app_init", "begin_request", "end_response", "exit:failed"]
        );
    }

    #[tokio::test]
    async fn failing_begin_request_is_mapped() {
        struct Deny;

        impl Hooks for Deny {
            fn begin_request(&self, _ctx: &mut RequestContext) -> Result<(), DispatchError> {
                Err(HttpStatus::unauthorized().into())
            }
        }

        let root = from_fn(|_ctx: &mut RequestContext, _segments: Vec<String>| {
            panic!("controller must not run")
        });
        let dispatcher = Dispatcher::with_hooks(root, Deny, AppConfig::new());
        let response = dispatcher.dispatch(DispatchRequest::get("/")).await;
        assert_eq!(response.status.code, 401);
    }

    #[tokio::test]
    async fn mid_stream_failure_tears_down_once() {
        let recorder = Recorder::default();
        let dispatcher =
            Dispatcher::with_hooks(streaming_root(), recorder.clone(), AppConfig::new());

        let mut response = dispatcher.dispatch(DispatchRequest::get("/")).await;
        assert_eq!(response.status, StatusLine::OK);

        assert_eq!(response.body.next().await.unwrap().unwrap(), "a");
        assert_eq!(response.body.next().await.unwrap().unwrap(), "b");
        assert!(response.body.next().await.unwrap().is_err());
        assert!(response.body.next().await.is_none());
        drop(response);

        assert_eq!(exits(&recorder), 1);
        assert_eq!(recorder.events().last().map(String::as_str), Some("exit:failed"));
    }

    #[tokio::test]
    async fn mid_stream_failure_in_debug_adds_trailer() {
        let dispatcher = Dispatcher::new(streaming_root(), AppConfig::new().debug(true));

        let mut response = dispatcher.dispatch(DispatchRequest::get("/")).await;
        let mut chunks = Vec::new();
        let mut failed = false;
        while let Some(item) = response.body.next().await {
            match item {
                Ok(bytes) => chunks.push(String::from_utf8_lossy(&bytes).into_owned()),
                Err(_) => failed = true,
            }
        }

        assert!(failed);
        assert_eq!(chunks, vec!["a", "b", "source went away"]);
    }

    #[tokio::test]
    async fn dropped_body_aborts_once() {
        let recorder = Recorder::default();
        let dispatcher =
            Dispatcher::with_hooks(streaming_root(), recorder.clone(), AppConfig::new());

        let mut response = dispatcher.dispatch(DispatchRequest::get("/")).await;
        assert_eq!(response.body.next().await.unwrap().unwrap(), "a");
        drop(response);

        assert_eq!(exits(&recorder), 1);
        assert_eq!(recorder.events().last().map(String::as_str), Some("exit:aborted"));
    }

    #[test]
    fn lazy_stream_is_not_pulled_past_first_element_before_commit() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let root = from_fn(move |_ctx: &mut RequestContext, _segments: Vec<String>| {
            let counter = counter.clone();
            Ok(Body::stream(stream::iter(["x", "y", "z"]).map(move |item| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, DispatchError>(item)
            })))
        });
        let dispatcher = Dispatcher::new(root, AppConfig::new());

        let mut response = tokio_test::block_on(dispatcher.dispatch(DispatchRequest::get("/")));
        assert_eq!(pulled.load(Ordering::SeqCst), 1);

        let mut next = tokio_test::task::spawn(response.body.next());
        let first = tokio_test::assert_ready!(next.poll());
        assert_eq!(first.unwrap().unwrap(), "x");
        drop(next);
        assert_eq!(pulled.load(Ordering::SeqCst), 1);

        let body = tokio_test::block_on(response.body.collect()).unwrap();
        assert_eq!(body, "yz");
        assert_eq!(pulled.load(Ordering::SeqCst), 3);
    }
}
