//! Per-request execution context.

use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, Span};

use crate::app::{DispatchError, Hooks};
use crate::dispatch::encoder::Charset;
use crate::http::cookies::parse_cookie_header;
use crate::http::{CookieJar, DispatchRequest, HeaderList, Method};
use crate::runtime::AppConfig;

/// The caller a request is being served for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable identifier, echoed in the `X-Identity` header on errors.
    pub id: String,
    /// Roles granted to the caller.
    pub roles: Vec<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Normalize a raw request path into `(path, segments)`.
///
/// The query string is dropped, trailing slashes and the leading slash are
/// stripped, and the rest is split on `/` into non-empty segments. Segments
/// are not URL-decoded.
pub fn normalize_path(raw: &str) -> (String, Vec<String>) {
    let path = raw.split('?').next().unwrap_or_default();
    let path = path.trim_end_matches('/');
    let path = path.strip_prefix('/').unwrap_or(path);
    let segments = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();
    (path.to_string(), segments)
}

/// State owned by exactly one inbound call.
///
/// A context is created and entered by the dispatcher, threaded through the
/// hooks and the controller as `&mut RequestContext`, and consumed by
/// [`RequestContext::exit`]. Since `exit` takes `self`, a context cannot be
/// exited twice.
#[derive(Debug)]
pub struct RequestContext {
    method: Method,
    raw_path: String,
    path: String,
    segments: Vec<String>,
    headers: Vec<(String, String)>,
    body: Bytes,
    request_cookies: Vec<(String, String)>,
    response_headers: HeaderList,
    cookies: CookieJar,
    identity: Option<Identity>,
    debug: bool,
    charset: Charset,
    span: Span,
    entered_at: Option<Instant>,
}

impl RequestContext {
    /// Create a context for `request`, copying the policy flags from
    /// `config`.
    pub fn new(request: DispatchRequest, config: &AppConfig) -> Self {
        let (path, segments) = normalize_path(&request.path);
        let request_cookies = request
            .headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("cookie"))
            .flat_map(|(_, value)| parse_cookie_header(value))
            .collect();

        Self {
            method: request.method,
            raw_path: request.path,
            path,
            segments,
            headers: request.headers,
            body: request.body,
            request_cookies,
            response_headers: HeaderList::new(),
            cookies: CookieJar::new(),
            identity: None,
            debug: config.debug,
            charset: config.response_charset,
            span: Span::none(),
            entered_at: None,
        }
    }

    /// Activate the context for this request.
    pub fn enter(&mut self) {
        self.span = tracing::debug_span!(
            "request",
            method = %self.method,
            path = %self.raw_path,
        );
        self.entered_at = Some(Instant::now());
        let _guard = self.span.enter();
        debug!("request entered");
    }

    /// Deactivate and consume the context.
    ///
    /// `failure` is the failure that ended the request, if any. This never
    /// fails.
    pub fn exit(self, hooks: &dyn Hooks, failure: Option<&DispatchError>) {
        hooks.request_exited(&self, failure);

        let _guard = self.span.enter();
        let elapsed = self.entered_at.map(|at| at.elapsed());
        match failure {
            Some(err) => debug!(?elapsed, error = %err, "request exited with failure"),
            None => debug!(?elapsed, "request exited"),
        }
    }

    /// Span opened when the context was entered.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path as received, query string included.
    pub fn raw_path(&self) -> &str {
        &self.raw_path
    }

    /// Normalized path without leading/trailing slashes or query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Decoded query string parameters, in order.
    pub fn query(&self) -> Vec<(String, String)> {
        match self.raw_path.split_once('?') {
            Some((_, query)) => form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Request headers in arrival order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First request header with this name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Raw request body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn request_cookies(&self) -> &[(String, String)] {
        &self.request_cookies
    }

    pub fn request_cookie(&self, name: &str) -> Option<&str> {
        self.request_cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// Cookies to be set on the response.
    pub fn cookies_mut(&mut self) -> &mut CookieJar {
        &mut self.cookies
    }

    pub fn response_headers(&self) -> &HeaderList {
        &self.response_headers
    }

    pub fn response_headers_mut(&mut self) -> &mut HeaderList {
        &mut self.response_headers
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.response_headers.add(name, value)
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.response_headers.set(name, value)
    }

    /// Set `Content-Type`, appending the response charset for text types.
    pub fn set_content_type(&mut self, content_type: &str) {
        let value = if content_type.starts_with("text/") || content_type.ends_with("json") {
            format!("{}; charset={}", content_type, self.charset.name())
        } else {
            content_type.to_string()
        };
        self.response_headers.set("Content-Type", value)
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn set_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Move accumulated cookies into the response headers.
    pub(crate) fn flatten_cookies(&mut self) {
        let cookies = std::mem::take(&mut self.cookies);
        self.response_headers.extend(cookies.output());
    }
}
