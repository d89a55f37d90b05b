use async_trait::async_trait;
use futures::StreamExt as _;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as TungsteniteError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::error::WsError;
use super::traits::{Connection, Transport};
use crate::Result;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`Transport`] backed by `tokio-tungstenite`, with TLS for `wss://` endpoints.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;

    async fn open(&self, endpoint: &str) -> Result<WebSocketConnection> {
        let (stream, _response) = connect_async(endpoint).await?;
        Ok(WebSocketConnection {
            stream,
            failed: false,
        })
    }
}

/// A live `tokio-tungstenite` connection.
pub struct WebSocketConnection {
    stream: WsStream,
    /// tungstenite does not resume reading after an error, so the next `recv` reports closure
    failed: bool,
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn recv(&mut self) -> Option<Result<String>> {
        if self.failed {
            return None;
        }

        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Binary(bytes)) => {
                    return Some(String::from_utf8(bytes.to_vec()).map_err(|e| {
                        WsError::InvalidMessage(format!("binary frame is not UTF-8: {e}")).into()
                    }));
                }
                Ok(Message::Close(_))
                | Err(TungsteniteError::ConnectionClosed | TungsteniteError::AlreadyClosed) => {
                    return None;
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e.into()));
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {
                    // Control frames are answered by tungstenite itself.
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self.stream.close(None).await {
            Ok(()) | Err(TungsteniteError::ConnectionClosed | TungsteniteError::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
