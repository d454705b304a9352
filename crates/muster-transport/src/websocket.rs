//! WebSocket gateway connection.
//!
//! This module provides a client connection using tokio-tungstenite. JSON
//! frames travel as text messages, MessagePack frames as binary messages.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use muster_protocol::{codec, ApiVersion, Encoding, Frame, ProtocolError};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::traits::{Connection, TransportError};

/// WebSocket connection configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Frame encoding to negotiate.
    pub encoding: Encoding,
    /// Gateway API version to request.
    pub api_version: ApiVersion,
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::Json,
            api_version: ApiVersion::default(),
            max_message_size: codec::MAX_FRAME_SIZE,
        }
    }
}

/// A WebSocket connection to the gateway.
pub struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    config: WebSocketConfig,
    is_open: bool,
}

impl WebSocketConnection {
    /// Connect to a gateway.
    ///
    /// The API version and encoding from `config` are appended to
    /// `base_url` as query parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or handshake fails.
    pub async fn connect(base_url: &str, config: WebSocketConfig) -> Result<Self, TransportError> {
        let url = config.api_version.gateway_url(base_url, config.encoding);

        let (stream, _response) = connect_async(url.as_str()).await.map_err(|e| {
            error!(url = %url, error = %e, "WebSocket handshake failed");
            TransportError::ConnectFailed(e.to_string())
        })?;

        info!(url = %url, encoding = config.encoding.as_str(), "Connected to gateway");

        Ok(Self {
            stream,
            config,
            is_open: true,
        })
    }

    /// Get the negotiated encoding.
    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.config.encoding
    }

    fn decode(&self, data: &[u8]) -> Result<Frame, TransportError> {
        if data.len() > self.config.max_message_size {
            warn!(
                size = data.len(),
                max = self.config.max_message_size,
                "Message too large"
            );
            return Err(ProtocolError::FrameTooLarge(data.len()).into());
        }
        Ok(codec::decode(data, self.config.encoding)?)
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return self.decode(text.as_bytes()).map(Some);
                }
                Some(Ok(Message::Binary(data))) => {
                    return self.decode(&data).map(Some);
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        warn!(error = %e, "Failed to send pong");
                    }
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(close))) => {
                    debug!(?close, "Received close frame");
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Err(WsError::ConnectionClosed)) | None => {
                    debug!("WebSocket stream ended");
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    error!(error = %e, "WebSocket error");
                    self.is_open = false;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        let data = codec::encode(&frame, self.config.encoding)?;
        let message = if self.config.encoding.is_binary() {
            Message::Binary(data.to_vec())
        } else {
            let text = String::from_utf8(data.to_vec())
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
            Message::Text(text)
        };

        self.stream
            .send(message)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_open {
            return Ok(());
        }
        self.is_open = false;

        self.stream
            .close(None)
            .await
            .map_err(|e| TransportError::SendFailed(format!("Failed to close: {e}")))
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_config_default() {
        let config = WebSocketConfig::default();
        assert_eq!(config.encoding, Encoding::Json);
        assert_eq!(config.api_version, ApiVersion(9));
        assert_eq!(config.max_message_size, codec::MAX_FRAME_SIZE);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Port 9 (discard) is not listening in test environments.
        let result = WebSocketConnection::connect("ws://127.0.0.1:9", WebSocketConfig::default()).await;
        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }
}
