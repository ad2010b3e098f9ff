//! Websocket adapter for the botlink transport port, built on
//! `tokio-tungstenite`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{HeaderName, HeaderValue},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

use botlink_core::{
    ports::{Connector, Frame, Transport},
    Error, Result,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens websocket transports with a bounded connect time.
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        uri: &str,
        headers: &[(String, String)],
    ) -> Result<Box<dyn Transport>> {
        let mut request = uri
            .into_client_request()
            .map_err(|e| Error::Connect(format!("invalid uri '{uri}': {e}")))?;

        for (name, value) in headers {
            let name: HeaderName = name
                .parse()
                .map_err(|_| Error::Connect(format!("invalid header name '{name}'")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| Error::Connect(format!("invalid value for header '{name}'")))?;
            let _ = request.headers_mut().insert(name, value);
        }

        let (stream, response) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                Error::Connect(format!(
                    "handshake timed out after {}s",
                    self.connect_timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::Connect(e.to_string()))?;

        debug!(status = %response.status(), "websocket upgrade complete");
        Ok(Box::new(WsTransport { stream }))
    }
}

struct WsTransport {
    stream: WsStream,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, frame: &str) -> Result<()> {
        self.stream
            .send(Message::Text(frame.to_string().into()))
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Frame::Text(text.to_string())),
                // tungstenite answers pings for us; both directions still
                // count as observed activity.
                Ok(Message::Ping(_) | Message::Pong(_)) => return Some(Frame::Keepalive),
                Ok(Message::Binary(bytes)) => {
                    debug!(len = bytes.len(), "ignoring binary frame");
                }
                Ok(Message::Close(reason)) => {
                    debug!(?reason, "server closed the connection");
                    return None;
                }
                Ok(Message::Frame(_)) => {}
                Err(e) => {
                    warn!(error = %e, "websocket read failed");
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        // A failed close handshake usually means the peer is already gone.
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "close handshake failed");
        }
        Ok(())
    }
}
