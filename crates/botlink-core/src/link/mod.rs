//! The resilient backend link: connection session, liveness watchdog,
//! reconnect supervision, and the public client handle.

pub mod client;
pub mod liveness;
pub mod session;
pub(crate) mod supervisor;

#[cfg(test)]
pub(crate) mod testkit;

pub use client::LinkClient;
pub use session::SessionState;
