//! Follows the notification feed for a single patient and prints connection state changes.
//!
//! ```sh
//! RUST_LOG=info cargo run --example patient_feed --features tracing -- ws://localhost:8080 K9Q
//! ```

use std::time::Duration;

use er_waitlist_client::Endpoint;
use er_waitlist_client::ws::ConnectionManager;
use er_waitlist_client::ws::config::Config;
use futures::StreamExt as _;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let base = args.next().unwrap_or_else(|| "ws://localhost:8080".to_owned());
    let code = args.next().unwrap_or_else(|| "ABC".to_owned());

    let endpoint = Endpoint::patient(&base, &code)?;
    let mut config = Config::default();
    config.reconnect.delay = Duration::from_secs(2);

    let connection = ConnectionManager::new(endpoint.as_str(), config)?;
    info!(%endpoint, "following patient notifications");

    let mut state_rx = connection.state_receiver();
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = *state_rx.borrow_and_update();
            debug!(?state, "connection state changed");
        }
    });

    let mut messages = Box::pin(connection.messages());
    while let Some(message) = messages.next().await {
        match message {
            Ok(payload) => info!(%payload, "position in line may have changed"),
            Err(e) => warn!(error = %e, "missed notifications, refetching anyway"),
        }
    }

    Ok(())
}
