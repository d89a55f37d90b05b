//! Core traits for the WebSocket infrastructure.
//!
//! [`ConnectionManager`](super::ConnectionManager) drives the reconnect state machine and
//! leaves the actual socket work to a [`Transport`]. The default transport speaks WebSocket
//! through `tokio-tungstenite`; tests substitute a scripted one.

use async_trait::async_trait;

use crate::Result;

/// Opens connections to an endpoint.
///
/// # Example
///
/// ```ignore
/// pub struct LoopbackTransport;
///
/// #[async_trait]
/// impl Transport for LoopbackTransport {
///     type Connection = LoopbackConnection;
///
///     async fn open(&self, endpoint: &str) -> crate::Result<LoopbackConnection> {
///         LoopbackConnection::dial(endpoint).await
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The live connection produced by a successful open.
    type Connection: Connection;

    /// Open a new connection.
    ///
    /// An `Err` is treated exactly like a connection that closed immediately.
    async fn open(&self, endpoint: &str) -> Result<Self::Connection>;
}

/// A single live connection.
#[async_trait]
pub trait Connection: Send + 'static {
    /// Wait for the next inbound event.
    ///
    /// - `Some(Ok(payload))`: a text message
    /// - `Some(Err(_))`: a transport error; the connection is not considered closed yet
    /// - `None`: the connection closed
    ///
    /// Must be cancel-safe: the manager races it against shutdown.
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Close the connection and release its resources.
    ///
    /// Called exactly once before the manager lets go of a connection, including after
    /// [`recv`](Self::recv) reported that the peer closed it.
    async fn close(&mut self) -> Result<()>;
}
