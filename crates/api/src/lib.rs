//! txt2img web server library.
//!
//! Exposes config, state, routing, and the lifecycle loop so the binary and
//! the integration tests build the server the same way.

pub mod app;
pub mod call_queue;
pub mod callbacks;
pub mod config;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;
pub mod tasks;
pub mod tempdir;
pub mod timer;
