//! Hubgate HTTP facade
//!
//! Maps the two EventHub endpoints onto the publish and receive operations
//! of `hubgate-core`.

pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{AppState, ServerConfig, build_state, start_server};
