//! Failures that can end a request.

use thiserror::Error;

use crate::http::HttpStatus;

/// Every way a dispatch can fail.
///
/// Only [`DispatchError::Status`] maps to its own status code; every other
/// kind is reported to the client as a generic 500.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A recognized status failure raised by controller code.
    #[error("{0}")]
    Status(HttpStatus),

    /// The controller returned a value that is not a response body.
    #[error("invalid response shape: {0}")]
    InvalidResponseShape(String),

    /// A text chunk could not be represented in the response charset.
    #[error("cannot encode response chunk as {charset}: {reason}")]
    Encoding {
        charset: &'static str,
        reason: String,
    },

    /// The transport dropped the response body before it was complete.
    #[error("response aborted by the transport")]
    Aborted,

    /// Anything else.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

impl DispatchError {
    /// Wrap an arbitrary error as an internal failure.
    pub fn internal<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        DispatchError::Internal(anyhow::Error::new(err))
    }

    /// The recognized status, if this is one.
    pub fn as_status(&self) -> Option<&HttpStatus> {
        match self {
            DispatchError::Status(status) => Some(status),
            _ => None,
        }
    }

    /// Full diagnostic text: message, cause chain and, when one was
    /// captured, the backtrace.
    ///
    /// A status failure renders as its status line followed by its extra
    /// information, if any.
    pub fn trace(&self) -> String {
        match self {
            DispatchError::Internal(err) => format!("{:?}", err),
            DispatchError::Status(status) => match status.extra_information {
                Some(ref extra) => format!("{}: {}", status, extra),
                None => status.to_string(),
            },
            other => other.to_string(),
        }
    }

    /// Extra context meant for the error log only.
    pub fn extra_information(&self) -> Option<&str> {
        self.as_status()
            .and_then(|status| status.extra_information.as_deref())
    }
}

impl From<HttpStatus> for DispatchError {
    fn from(status: HttpStatus) -> Self {
        DispatchError::Status(status)
    }
}

impl From<std::io::Error> for DispatchError {
    fn from(err: std::io::Error) -> Self {
        DispatchError::internal(err)
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::internal(err)
    }
}
