//! Mapping failures to complete error responses.

use std::collections::BTreeSet;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::app::{DispatchError, Identity};
use crate::http::{HeaderList, StatusDescriptor, StatusLine};
use crate::runtime::AppConfig;

/// Message used for every failure that is not a recognized status.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

/// Localized counterpart of [`INTERNAL_ERROR_MESSAGE`].
pub const INTERNAL_ERROR_MESSAGE_FA: &str = "خطای داخلی سرور";

/// JSON body of an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub message: String,
    #[serde(rename = "stackTrace")]
    pub stack_trace: Option<String>,
    #[serde(rename = "messageFa")]
    pub localized_message: Option<String>,
}

/// Structured record logged for 400 and 500 failures.
///
/// Always carries the full trace, whatever the debug setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorLogRecord {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub message: String,
    #[serde(rename = "extraInformation")]
    pub extra_information: Option<String>,
    #[serde(rename = "stackTrace")]
    pub stack_trace: String,
}

/// A complete error response.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub status: StatusLine,
    pub headers: HeaderList,
    pub envelope: ErrorEnvelope,
    /// Serialized envelope, or empty for no-content status codes.
    pub body: Bytes,
}

/// Converts failures into error responses under the configured policy.
#[derive(Debug, Clone)]
pub struct ErrorMapper {
    debug: bool,
    no_content: BTreeSet<u16>,
    content_type: String,
}

impl ErrorMapper {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            debug: config.debug,
            no_content: config.no_content_statuses.clone(),
            content_type: config.error_content_type.clone(),
        }
    }

    /// Build the response for `err`.
    ///
    /// `identity` is the caller bound to the request, if any; its id is
    /// echoed in an `X-Identity` header.
    pub fn map(&self, err: &DispatchError, identity: Option<&Identity>) -> ErrorResponse {
        let trace = err.trace();
        let mut headers = HeaderList::new();
        headers.add("Content-Type", self.content_type.as_str());

        let (status, mut envelope) = match err {
            DispatchError::Status(status) => {
                match status.headers {
                    Some(ref overrides) if !overrides.is_empty() => headers = overrides.clone(),
                    _ => {}
                }
                let (_, reason) = status.status_format();
                let envelope = ErrorEnvelope {
                    status_code: status.envelope_code(),
                    message: reason.to_string(),
                    stack_trace: None,
                    localized_message: status.localized_message.clone(),
                };
                (status.status_line(), envelope)
            }
            _ => {
                let envelope = ErrorEnvelope {
                    status_code: StatusDescriptor::INTERNAL_SERVER_ERROR.code,
                    message: INTERNAL_ERROR_MESSAGE.to_string(),
                    stack_trace: None,
                    localized_message: Some(INTERNAL_ERROR_MESSAGE_FA.to_string()),
                };
                (StatusDescriptor::INTERNAL_SERVER_ERROR.status_line(), envelope)
            }
        };

        if self.debug {
            envelope.stack_trace = Some(trace.clone());
        }

        if let Some(record) = self.log_record(&envelope, err, trace) {
            self.log(&record);
        }

        if let Some(identity) = identity {
            headers.add("X-Identity", identity.id.as_str());
        }

        let body = if self.no_content.contains(&status.code) {
            Bytes::new()
        } else {
            match serde_json::to_vec(&envelope) {
                Ok(body) => Bytes::from(body),
                Err(err) => {
                    error!("failed to serialize error envelope: {}", err);
                    Bytes::new()
                }
            }
        };

        ErrorResponse {
            status,
            headers,
            envelope,
            body,
        }
    }

    /// The log record for this failure, if its envelope code is 400 or 500.
    pub fn log_record(
        &self,
        envelope: &ErrorEnvelope,
        err: &DispatchError,
        trace: String,
    ) -> Option<ErrorLogRecord> {
        if !matches!(envelope.status_code, 400 | 500) {
            return None;
        }
        Some(ErrorLogRecord {
            status_code: envelope.status_code,
            message: envelope.message.clone(),
            extra_information: err.extra_information().map(str::to_string),
            stack_trace: trace,
        })
    }

    fn log(&self, record: &ErrorLogRecord) {
        let json = serde_json::to_string(record).unwrap_or_else(|_| record.message.clone());
        error!(
            status_code = record.status_code,
            extra = ?record.extra_information,
            "{}",
            json
        );
    }
}
