#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests, and https://github.com/rust-lang/rust-clippy/issues/13981"
)]
#![allow(
    unused,
    reason = "Not every test binary uses every helper"
)]

use std::time::Duration;

use async_trait::async_trait;
use er_waitlist_client::Result;
use er_waitlist_client::ws::config::Config;
use er_waitlist_client::ws::{
    Connection, ConnectionManager, ConnectionState, Transport, WsError,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, timeout};

pub const ENDPOINT: &str = "ws://localhost:8080/ws/admin";

/// Reconnect delay used when a test does not care about timing.
pub const FAST_DELAY: Duration = Duration::from_millis(100);

/// Transport whose open attempts are handed to the test, which decides their outcome.
#[derive(Clone)]
pub struct ScriptedTransport {
    attempts_tx: mpsc::UnboundedSender<Attempt>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> (Self, Attempts) {
        let (attempts_tx, attempts_rx) = mpsc::unbounded_channel();
        (Self { attempts_tx }, Attempts(attempts_rx))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    type Connection = ScriptedConnection;

    async fn open(&self, endpoint: &str) -> Result<ScriptedConnection> {
        let (reply, reply_rx) = oneshot::channel();
        self.attempts_tx
            .send(Attempt {
                at: Instant::now(),
                endpoint: endpoint.to_owned(),
                reply,
            })
            .map_err(|_e| WsError::ConnectionClosed)?;

        reply_rx.await.map_err(|_e| WsError::ConnectionClosed)?
    }
}

/// Open attempts made by the manager, in order.
pub struct Attempts(mpsc::UnboundedReceiver<Attempt>);

impl Attempts {
    /// Wait for the next open attempt.
    pub async fn next(&mut self) -> Attempt {
        self.0.recv().await.unwrap()
    }

    /// Wait up to `within` for an open attempt.
    pub async fn next_within(&mut self, within: Duration) -> Option<Attempt> {
        timeout(within, self.0.recv()).await.ok().flatten()
    }
}

/// A single open attempt waiting for the test's verdict.
pub struct Attempt {
    pub at: Instant,
    pub endpoint: String,
    reply: oneshot::Sender<Result<ScriptedConnection>>,
}

impl Attempt {
    /// Let the open succeed, returning the server side of the connection.
    #[must_use]
    pub fn accept(self) -> Peer {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);

        let connection = ScriptedConnection {
            events_rx,
            closed_tx,
        };
        drop(self.reply.send(Ok(connection)));

        Peer {
            events_tx,
            closed_rx,
        }
    }

    /// Let the open fail.
    pub fn refuse(self) {
        let error = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        drop(self.reply.send(Err(error.into())));
    }
}

enum Event {
    Message(String),
    Error,
}

/// Client side of a scripted connection.
pub struct ScriptedConnection {
    events_rx: mpsc::UnboundedReceiver<Event>,
    closed_tx: watch::Sender<bool>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn recv(&mut self) -> Option<Result<String>> {
        match self.events_rx.recv().await? {
            Event::Message(payload) => Some(Ok(payload)),
            Event::Error => Some(Err(WsError::InvalidMessage("scripted failure".to_owned()).into())),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed_tx.send_replace(true);
        Ok(())
    }
}

/// Server side of a scripted connection.
pub struct Peer {
    events_tx: mpsc::UnboundedSender<Event>,
    closed_rx: watch::Receiver<bool>,
}

impl Peer {
    pub fn send(&self, payload: &str) {
        drop(self.events_tx.send(Event::Message(payload.to_owned())));
    }

    /// Surface a transport error without closing the connection.
    pub fn fail(&self) {
        drop(self.events_tx.send(Event::Error));
    }

    /// Close the connection from the server side.
    pub fn hang_up(self) -> ClosedWatch {
        ClosedWatch(self.closed_rx)
    }

    /// Watch for the client closing this connection.
    #[must_use]
    pub fn closed_watch(&self) -> ClosedWatch {
        ClosedWatch(self.closed_rx.clone())
    }
}

/// Observes whether the client explicitly closed a connection.
pub struct ClosedWatch(watch::Receiver<bool>);

impl ClosedWatch {
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.0.borrow()
    }

    pub async fn wait(&mut self) {
        timeout(Duration::from_secs(1), self.0.wait_for(|closed| *closed))
            .await
            .unwrap()
            .unwrap();
    }
}

#[must_use]
pub fn config(delay: Duration) -> Config {
    let mut config = Config::default();
    config.reconnect.delay = delay;
    config
}

/// Wait until the manager's state satisfies `f`.
pub async fn wait_for_state<T, F>(manager: &ConnectionManager<T>, f: F) -> ConnectionState
where
    T: Transport,
    F: FnMut(&ConnectionState) -> bool,
{
    let mut state_rx = manager.state_receiver();
    let state = timeout(Duration::from_secs(1), state_rx.wait_for(f))
        .await
        .unwrap()
        .unwrap();
    *state
}

pub async fn wait_connected<T: Transport>(manager: &ConnectionManager<T>) {
    wait_for_state(manager, |state| state.is_connected()).await;
}

pub async fn wait_reconnecting<T: Transport>(manager: &ConnectionManager<T>) -> u32 {
    match wait_for_state(manager, |state| {
        matches!(state, ConnectionState::Reconnecting { .. })
    })
    .await
    {
        ConnectionState::Reconnecting { attempt } => attempt,
        other => panic!("unexpected state {other:?}"),
    }
}

/// Register a handler that forwards every payload into a channel.
pub fn collect_messages<T: Transport>(
    manager: &ConnectionManager<T>,
) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    manager.set_on_message(move |payload| drop(tx.send(payload.to_owned())));
    rx
}

pub async fn recv_message(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap()
}
