//! Core domain + application logic for the botlink backend link.
//!
//! This crate is intentionally transport-agnostic. The websocket transport
//! lives behind a port (trait) implemented in the adapter crate so the
//! session, liveness, and reconnect machinery can be driven by fakes in tests.

pub mod backoff;
pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod envelope;
pub mod errors;
pub mod link;
pub mod logging;
pub mod ports;

pub use errors::{Error, Result};
