//! Recognized HTTP status failures.
//!
//! A controller signals a well-known outcome (404, a redirect, 304, ...) by
//! returning [`HttpStatus`] as its error. The error mapper turns it into a
//! complete response using the [`StatusDescriptor`] it carries.

use std::fmt;

use super::response::{HeaderList, StatusLine};

/// Associates a failure kind with its status code and reason phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusDescriptor {
    /// Numeric status code.
    pub code: u16,
    /// Canonical reason phrase.
    pub reason: &'static str,
}

impl StatusDescriptor {
    pub const NO_CONTENT: StatusDescriptor = StatusDescriptor::new(204, "No Content");
    pub const MOVED_PERMANENTLY: StatusDescriptor =
        StatusDescriptor::new(301, "Moved Permanently");
    pub const FOUND: StatusDescriptor = StatusDescriptor::new(302, "Found");
    pub const NOT_MODIFIED: StatusDescriptor = StatusDescriptor::new(304, "Not Modified");
    pub const TEMPORARY_REDIRECT: StatusDescriptor =
        StatusDescriptor::new(307, "Temporary Redirect");
    pub const BAD_REQUEST: StatusDescriptor = StatusDescriptor::new(400, "Bad Request");
    pub const UNAUTHORIZED: StatusDescriptor = StatusDescriptor::new(401, "Unauthorized");
    pub const FORBIDDEN: StatusDescriptor = StatusDescriptor::new(403, "Forbidden");
    pub const NOT_FOUND: StatusDescriptor = StatusDescriptor::new(404, "Not Found");
    pub const METHOD_NOT_ALLOWED: StatusDescriptor =
        StatusDescriptor::new(405, "Method Not Allowed");
    pub const NOT_ACCEPTABLE: StatusDescriptor = StatusDescriptor::new(406, "Not Acceptable");
    pub const CONFLICT: StatusDescriptor = StatusDescriptor::new(409, "Conflict");
    pub const GONE: StatusDescriptor = StatusDescriptor::new(410, "Gone");
    pub const PRECONDITION_FAILED: StatusDescriptor =
        StatusDescriptor::new(412, "Precondition Failed");
    pub const PAYLOAD_TOO_LARGE: StatusDescriptor =
        StatusDescriptor::new(413, "Payload Too Large");
    pub const UNSUPPORTED_MEDIA_TYPE: StatusDescriptor =
        StatusDescriptor::new(415, "Unsupported Media Type");
    pub const INTERNAL_SERVER_ERROR: StatusDescriptor =
        StatusDescriptor::new(500, "Internal Server Error");
    pub const BAD_GATEWAY: StatusDescriptor = StatusDescriptor::new(502, "Bad Gateway");
    pub const SERVICE_UNAVAILABLE: StatusDescriptor =
        StatusDescriptor::new(503, "Service Unavailable");

    pub const fn new(code: u16, reason: &'static str) -> Self {
        Self { code, reason }
    }

    /// Look up the canonical reason phrase for an arbitrary code.
    ///
    /// Codes that cannot appear on a status line (outside `100..=999`)
    /// become `500 Internal Server Error`.
    pub fn from_code(code: u16) -> Self {
        if !Self::is_valid_code(code) {
            return Self::INTERNAL_SERVER_ERROR;
        }
        let reason = hyper::StatusCode::from_u16(code)
            .ok()
            .and_then(|status| status.canonical_reason())
            .unwrap_or("Unknown Status");
        Self { code, reason }
    }

    fn is_valid_code(code: u16) -> bool {
        (100..=999).contains(&code)
    }

    /// The status line this descriptor produces.
    pub fn status_line(&self) -> StatusLine {
        StatusLine::new(self.code, self.reason)
    }
}

/// A recognized status failure raised by controller code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpStatus {
    /// Status code and reason phrase.
    pub descriptor: StatusDescriptor,
    /// Replaces the default error headers entirely when set.
    pub headers: Option<HeaderList>,
    /// Overrides the `statusCode` field of the error envelope.
    pub custom_code: Option<u16>,
    /// Localized message for the envelope's `messageFa` field.
    pub localized_message: Option<String>,
    /// Extra context written to the error log only.
    pub extra_information: Option<String>,
}

impl HttpStatus {
    /// Create a status failure for an arbitrary code.
    pub fn new(code: u16) -> Self {
        Self::from_descriptor(StatusDescriptor::from_code(code))
    }

    /// Create a status failure from a descriptor. A descriptor whose code
    /// cannot appear on a status line is replaced by 500.
    pub fn from_descriptor(descriptor: StatusDescriptor) -> Self {
        let descriptor = if StatusDescriptor::is_valid_code(descriptor.code) {
            descriptor
        } else {
            StatusDescriptor::INTERNAL_SERVER_ERROR
        };
        Self {
            descriptor,
            headers: None,
            custom_code: None,
            localized_message: None,
            extra_information: None,
        }
    }

    pub fn bad_request() -> Self {
        Self::from_descriptor(StatusDescriptor::BAD_REQUEST)
    }

    pub fn unauthorized() -> Self {
        Self::from_descriptor(StatusDescriptor::UNAUTHORIZED)
    }

    pub fn forbidden() -> Self {
        Self::from_descriptor(StatusDescriptor::FORBIDDEN)
    }

    pub fn not_found() -> Self {
        Self::from_descriptor(StatusDescriptor::NOT_FOUND)
    }

    pub fn method_not_allowed() -> Self {
        Self::from_descriptor(StatusDescriptor::METHOD_NOT_ALLOWED)
    }

    pub fn not_acceptable() -> Self {
        Self::from_descriptor(StatusDescriptor::NOT_ACCEPTABLE)
    }

    pub fn conflict() -> Self {
        Self::from_descriptor(StatusDescriptor::CONFLICT)
    }

    pub fn gone() -> Self {
        Self::from_descriptor(StatusDescriptor::GONE)
    }

    pub fn precondition_failed() -> Self {
        Self::from_descriptor(StatusDescriptor::PRECONDITION_FAILED)
    }

    pub fn payload_too_large() -> Self {
        Self::from_descriptor(StatusDescriptor::PAYLOAD_TOO_LARGE)
    }

    pub fn unsupported_media_type() -> Self {
        Self::from_descriptor(StatusDescriptor::UNSUPPORTED_MEDIA_TYPE)
    }

    pub fn internal_server_error() -> Self {
        Self::from_descriptor(StatusDescriptor::INTERNAL_SERVER_ERROR)
    }

    pub fn bad_gateway() -> Self {
        Self::from_descriptor(StatusDescriptor::BAD_GATEWAY)
    }

    pub fn service_unavailable() -> Self {
        Self::from_descriptor(StatusDescriptor::SERVICE_UNAVAILABLE)
    }

    pub fn no_content() -> Self {
        Self::from_descriptor(StatusDescriptor::NO_CONTENT)
    }

    pub fn not_modified() -> Self {
        Self::from_descriptor(StatusDescriptor::NOT_MODIFIED)
    }

    /// 301 with a `Location` header.
    pub fn moved_permanently(location: impl Into<String>) -> Self {
        Self::redirect(StatusDescriptor::MOVED_PERMANENTLY, location)
    }

    /// 302 with a `Location` header.
    pub fn found(location: impl Into<String>) -> Self {
        Self::redirect(StatusDescriptor::FOUND, location)
    }

    /// 307 with a `Location` header.
    pub fn temporary_redirect(location: impl Into<String>) -> Self {
        Self::redirect(StatusDescriptor::TEMPORARY_REDIRECT, location)
    }

    fn redirect(descriptor: StatusDescriptor, location: impl Into<String>) -> Self {
        Self::from_descriptor(descriptor).with_header("Location", location)
    }

    /// Replace the error response headers.
    pub fn with_headers(mut self, headers: HeaderList) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Append one header to the replacement header set.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HeaderList::new)
            .add(name, value);
        self
    }

    pub fn with_custom_code(mut self, code: u16) -> Self {
        self.custom_code = Some(code);
        self
    }

    pub fn with_localized_message(mut self, message: impl Into<String>) -> Self {
        self.localized_message = Some(message.into());
        self
    }

    pub fn with_extra_information(mut self, info: impl Into<String>) -> Self {
        self.extra_information = Some(info.into());
        self
    }

    /// Status code and reason phrase as written to the status line.
    pub fn status_format(&self) -> (u16, &'static str) {
        (self.descriptor.code, self.descriptor.reason)
    }

    pub fn status_line(&self) -> StatusLine {
        self.descriptor.status_line()
    }

    /// Code reported in the error envelope: the override wins.
    pub fn envelope_code(&self) -> u16 {
        self.custom_code.unwrap_or(self.descriptor.code)
    }
}

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.descriptor.code, self.descriptor.reason)
    }
}

impl std::error::Error for HttpStatus {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_phrase_comes_from_canonical_table() {
        assert_eq!(HttpStatus::new(418).descriptor.reason, "I'm a teapot");
        assert_eq!(HttpStatus::new(599).descriptor.reason, "Unknown Status");
        assert_eq!(HttpStatus::not_found().to_string(), "404 Not Found");
    }

    #[test]
    fn out_of_range_codes_become_internal_error() {
        for code in [0, 50, 99, 1000] {
            let status = HttpStatus::new(code);
            assert_eq!(status.status_line(), StatusLine::new(500, "Internal Server Error"));
            assert_eq!(status.envelope_code(), 500);
        }

        let status = HttpStatus::from_descriptor(StatusDescriptor::new(42, "Odd"));
        assert_eq!(status.status_format(), (500, "Internal Server Error"));
        assert_eq!(HttpStatus::new(999).status_line().code, 999);
    }

    #[test]
    fn custom_code_overrides_envelope_code_only() {
        let status = HttpStatus::bad_request().with_custom_code(4001);
        assert_eq!(status.envelope_code(), 4001);
        assert_eq!(status.status_line().code, 400);
    }

    #[test]
    fn redirects_carry_location() {
        let status = HttpStatus::found("/login");
        let headers = status.headers.as_ref().map(|h| h.get("location"));
        assert_eq!(headers, Some(Some("/login")));
        assert_eq!(status.status_format(), (302, "Found"));
    }
}
