//! One physical connection: connect, authenticate, send, receive, close.

use std::sync::Arc;

use tracing::debug;

use crate::{
    credentials::Credentials,
    envelope::{sign, Envelope, MessageKind},
    ports::{Connector, Frame, Transport},
    Error, Result,
};

/// Lifecycle of a single connection. Owned exclusively by [`Session`];
/// collaborators only ever observe a boolean "connected" projection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Closing,
}

pub struct Session {
    uri: String,
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn Credentials>,
    transport: Option<Box<dyn Transport>>,
    state: SessionState,
}

impl Session {
    pub fn new(
        uri: impl Into<String>,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn Credentials>,
    ) -> Self {
        Self {
            uri: uri.into(),
            connector,
            credentials,
            transport: None,
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected)
    }

    /// Open the transport and authenticate. On success the session is
    /// `Connected`; on any failure it falls back to `Disconnected` and the
    /// error is retryable from the supervisor's point of view.
    pub async fn connect(&mut self) -> Result<()> {
        self.state = SessionState::Connecting;
        let headers = self.credentials.connect_headers();
        match self.connector.connect(&self.uri, &headers).await {
            Ok(transport) => self.transport = Some(transport),
            Err(e) => {
                self.state = SessionState::Disconnected;
                return Err(Error::Connect(e.to_string()));
            }
        }

        self.state = SessionState::Authenticating;
        if let Some(announcement) = self.credentials.auth_announcement() {
            self.send(announcement).await?;
        }

        self.state = SessionState::Connected;
        debug!(uri = %self.uri, "session connected");
        Ok(())
    }

    /// Sign and write one envelope. A fresh envelope (new id, new timestamp)
    /// is created per call; ids are never reused.
    pub async fn send(&mut self, kind: MessageKind) -> Result<()> {
        if !matches!(
            self.state,
            SessionState::Connected | SessionState::Authenticating
        ) {
            return Err(Error::NotConnected);
        }

        let envelope = Envelope::new(kind);
        let frame = sign(&envelope, self.credentials.signing_secret())?;

        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
        if let Err(e) = transport.send_text(&frame).await {
            self.state = SessionState::Disconnected;
            return Err(Error::Transport(e.to_string()));
        }

        debug!(message_id = %envelope.message_id, "frame sent");
        Ok(())
    }

    /// Next inbound frame; `None` once the transport ends. I/O failures
    /// surface as end-of-stream, not as application errors.
    pub async fn recv(&mut self) -> Option<Frame> {
        let transport = self.transport.as_mut()?;
        let frame = transport.next_frame().await;
        if frame.is_none() {
            self.state = SessionState::Disconnected;
        }
        frame
    }

    /// Close the transport. Idempotent; always ends `Disconnected`.
    pub async fn close(&mut self) -> Result<()> {
        self.state = SessionState::Closing;
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!(error = %e, "transport close failed");
            }
        }
        self.state = SessionState::Disconnected;
        Ok(())
    }
}
