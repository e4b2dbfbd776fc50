//! HTTP types exchanged between the transport and the dispatcher.

pub mod cookies;
mod request;
mod response;
mod status;

pub use cookies::{Cookie, CookieJar};
pub use request::{DispatchRequest, Method};
pub use response::{HeaderList, Response, ResponseBody, StatusLine};
pub use status::{HttpStatus, StatusDescriptor};
