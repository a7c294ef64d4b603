//! Hubgate: an HTTP facade over one partition of an event hub.
//!
//! The protocol logic lives in [`hubgate_core`], the HTTP surface in
//! [`hubgate_http`]. This crate only assembles them into a runnable service.

pub mod cli;
pub mod observability;

pub use hubgate_core as core;
pub use hubgate_http as http;
