//! Follows the staff dashboard notification feed and logs every update.
//!
//! The endpoint defaults to `ws://localhost:8080/ws/admin` and can be overridden:
//! ```sh
//! WAITLIST_WS_ENDPOINT=wss://er.example.org/ws/admin RUST_LOG=info,rustls=off cargo run --example admin_feed --features tracing
//! ```
//!
//! Optionally log to a file:
//! ```sh
//! LOG_FILE=admin_feed.log RUST_LOG=debug cargo run --example admin_feed --features tracing
//! ```

use std::fs::File;

use er_waitlist_client::ws::ConnectionManager;
use er_waitlist_client::{DEFAULT_ENDPOINT, ENDPOINT_VAR};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Ok(path) = std::env::var("LOG_FILE") {
        let file = File::create(path)?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }

    let endpoint = std::env::var(ENDPOINT_VAR).unwrap_or_else(|_| DEFAULT_ENDPOINT.to_owned());
    let connection = ConnectionManager::shared(&endpoint)?;
    info!(endpoint = %connection.endpoint(), "following waitlist notifications");

    // The handler runs on the connection task, so hand refreshes off to the main loop.
    let (refresh_tx, mut refresh_rx) = mpsc::unbounded_channel();
    connection.set_on_message(move |payload| drop(refresh_tx.send(payload.to_owned())));

    let mut refreshes = 0_u64;
    loop {
        tokio::select! {
            Some(payload) = refresh_rx.recv() => {
                refreshes += 1;
                info!(%payload, refreshes, "waitlist changed, refetch patients in line, in treatment and treated");
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    connection.disconnect();
    info!(refreshes, "stopped");

    Ok(())
}
