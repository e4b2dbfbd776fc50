//! Application-facing API: the request context, the root controller
//! contract, lifecycle hooks and the failure taxonomy.

pub mod context;
pub mod error;
pub mod handler;
pub mod hooks;

pub use context::{normalize_path, Identity, RequestContext};
pub use error::{DispatchError, DispatchResult};
pub use handler::{from_fn, Body, Chunk, ChunkIter, ChunkStream, Controller, FnController};
pub use hooks::{Hooks, NoHooks};
