//! Relay connection — one WebSocket carrying binary frames, plus the
//! reconnect backoff schedule.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket connect to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },
    #[error("websocket send failed: {0}")]
    Send(#[source] Box<tokio_tungstenite::tungstenite::Error>),
    #[error("websocket receive failed: {0}")]
    Receive(#[source] Box<tokio_tungstenite::tungstenite::Error>),
    #[error("connection closed by relay")]
    Closed,
    #[error("connect task failed: {0}")]
    Task(String),
}

/// An open relay connection for one room.
pub struct Connection {
    stream: WsStream,
}

impl Connection {
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] if the handshake fails.
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect { url: url.to_owned(), source: Box::new(e) })?;
        Ok(Self { stream })
    }

    /// # Errors
    ///
    /// Returns [`TransportError::Send`] if the socket write fails.
    pub async fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.stream
            .send(Message::Binary(frame.into()))
            .await
            .map_err(|e| TransportError::Send(Box::new(e)))
    }

    /// Next binary frame. Text and control messages are skipped.
    /// Cancel-safe.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] on close and
    /// [`TransportError::Receive`] on socket errors.
    pub async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            let Some(msg) = self.stream.next().await else {
                return Err(TransportError::Closed);
            };
            match msg.map_err(|e| TransportError::Receive(Box::new(e)))? {
                Message::Binary(bytes) => return Ok(bytes.to_vec()),
                Message::Close(_) => return Err(TransportError::Closed),
                Message::Text(_) => debug!("ignoring text message from relay"),
                _ => {}
            }
        }
    }

    pub async fn close(mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "websocket close failed");
        }
    }
}

/// Doubling reconnect delay between a floor and a cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max, current: min }
    }

    /// Delay before the next attempt; doubles the one after.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
