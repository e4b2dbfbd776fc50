//! Request dispatch: controller invocation, body encoding and error mapping.

pub mod dispatcher;
pub mod encoder;
pub mod error_mapper;

pub use dispatcher::Dispatcher;
pub use encoder::{Charset, PreparedBody, ResponseEncoder};
pub use error_mapper::{ErrorEnvelope, ErrorLogRecord, ErrorMapper, ErrorResponse};
