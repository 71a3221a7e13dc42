//! Live feed transport
//!
//! The consumer only sees [`FeedConnector`] / [`FeedConnection`]; the
//! production implementation is a tokio-tungstenite WebSocket client.

use async_trait::async_trait;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use super::types::Frame;
use crate::error::{Error, Result};

/// An open live-feed connection
#[async_trait]
pub trait FeedConnection: Send {
    /// Next frame; `None` once the stream has ended
    async fn next_frame(&mut self) -> Option<Result<Frame>>;

    /// Close the connection
    async fn close(&mut self);
}

/// Dials live-feed connections
#[async_trait]
pub trait FeedConnector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Box<dyn FeedConnection>>;
}

/// WebSocket connector
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    connect_timeout: Option<Duration>,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound each dial; `None` waits as long as the OS does
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl FeedConnector for WebSocketConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn FeedConnection>> {
        let dial = connect_async(url.as_str());
        let result = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, dial)
                .await
                .map_err(|_| Error::Timeout)?,
            None => dial.await,
        };
        let (stream, response) = result.map_err(|e| Error::Connection(e.to_string()))?;
        debug!(status = %response.status(), %url, "live feed handshake complete");
        Ok(Box::new(WebSocketFeed { stream }))
    }
}

/// tokio-tungstenite client connection
struct WebSocketFeed {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FeedConnection for WebSocketFeed {
    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(Message::Text(text)) => Frame::Text(text.to_string()),
                Ok(Message::Binary(data)) => Frame::Binary(data.to_vec()),
                Ok(Message::Close(_)) => Frame::Close,
                // tungstenite answers pings itself
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                Err(e) => return Some(Err(Error::Connection(e.to_string()))),
            };
            return Some(Ok(frame));
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "close handshake failed");
        }
    }
}
