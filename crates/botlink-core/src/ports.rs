use async_trait::async_trait;

use crate::Result;

/// A single inbound unit from the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame carrying a signed envelope.
    Text(String),
    /// Transport-level keepalive traffic (websocket ping/pong). Counts as
    /// activity for the liveness monitor but carries no envelope.
    Keepalive,
}

/// One live duplex connection.
///
/// Only the connection session mutates a transport; the supervisor and the
/// liveness monitor observe through the session.
#[async_trait]
pub trait Transport: Send {
    async fn send_text(&mut self, frame: &str) -> Result<()>;

    /// Next inbound frame. `None` means the transport ended, whether by a
    /// clean close or an I/O failure; the adapter logs the distinction.
    async fn next_frame(&mut self) -> Option<Frame>;

    /// Close the transport. Must be safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}

/// Opens transports. Websockets in production; scripted fakes in tests.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, uri: &str, headers: &[(String, String)])
        -> Result<Box<dyn Transport>>;
}
