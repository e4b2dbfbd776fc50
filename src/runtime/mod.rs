//! Runtime configuration and the HTTP server the dispatcher is mounted on.

mod config;
mod server;

pub use config::AppConfig;
pub use server::{HttpServer, HyperBody};
