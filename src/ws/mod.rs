//! Core WebSocket infrastructure.
//!
//! This module keeps a single notification connection alive across network interruptions
//! and hands every inbound payload to the application.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: reconnecting connection handler with a single-slot message callback
//! - [`Transport`] / [`Connection`]: seams between the state machine and the socket
//! - [`WebSocketTransport`]: the `tokio-tungstenite` implementation used by default
//!
//! # Example
//!
//! ```ignore
//! let connection = ConnectionManager::new(DEFAULT_ENDPOINT, Config::default())?;
//! connection.set_on_message(|payload| refresh_waitlist(payload));
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod traits;
pub mod transport;

pub use connection::{ConnectionManager, ConnectionState, MessageHandler};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use traits::*;
pub use transport::{WebSocketConnection, WebSocketTransport};
