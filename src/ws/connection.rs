#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

#[cfg(feature = "tracing")]
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock, Weak};
use std::time::Instant;

use async_stream::try_stream;
use backoff::backoff::{Backoff as _, Constant};
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::config::Config;
use super::error::WsError;
use super::traits::{Connection, Transport};
use super::transport::WebSocketTransport;
use crate::Result;
use crate::endpoint::Endpoint;

/// Callback invoked with the raw payload of every inbound message.
pub type MessageHandler = Arc<dyn Fn(&str) + Send + Sync + 'static>;

static SHARED: OnceLock<ConnectionManager> = OnceLock::new();

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected, and no reconnect is scheduled
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Successfully connected
    Connected {
        /// When the connection was established
        since: Instant,
    },
    /// Closed, waiting for the scheduled reconnect
    Reconnecting {
        /// Current reconnection attempt number
        attempt: u32,
    },
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Check if a connection is open or being opened, in which case
    /// [`ConnectionManager::connect`] has nothing to do.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected { .. })
    }
}

/// Keeps one WebSocket connection to a fixed endpoint alive and delivers its messages.
///
/// - The first connection is opened on construction
/// - Every close, including a failed open, schedules exactly one reconnect after the
///   configured delay; a pending reconnect is cancelled when an open succeeds first
/// - Every inbound text payload goes to the single handler registered with
///   [`set_on_message`](Self::set_on_message), in arrival order, and then to any
///   [`subscribe`](Self::subscribe) receivers
///
/// Cloning is cheap and yields another handle to the same connection. Dropping the last
/// handle closes the connection and cancels any pending reconnect.
///
/// # Example
///
/// ```no_run
/// use er_waitlist_client::ws::ConnectionManager;
/// use er_waitlist_client::ws::config::Config;
///
/// # async fn example() -> er_waitlist_client::Result<()> {
/// let connection = ConnectionManager::new("ws://localhost:8080/ws/admin", Config::default())?;
/// connection.set_on_message(|payload| {
///     if payload == "update" {
///         // refetch the waitlist
///     }
/// });
/// # Ok(())
/// # }
/// ```
pub struct ConnectionManager<T: Transport = WebSocketTransport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for ConnectionManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> fmt::Debug for ConnectionManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.inner.endpoint)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

struct Inner<T: Transport> {
    endpoint: Endpoint,
    config: Config,
    transport: Arc<T>,
    /// Bookkeeping for the current connection and the pending reconnect
    slots: Mutex<Slots>,
    /// Single-slot message callback, last registration wins
    on_message: RwLock<Option<MessageHandler>>,
    /// Broadcast sender for incoming messages
    broadcast_tx: broadcast::Sender<String>,
    /// Watch channel sender for state changes
    state_tx: watch::Sender<ConnectionState>,
}

struct Slots {
    /// Identifies the current connection. Reactions from any other generation are ignored.
    generation: u64,
    connection: Option<LiveConnection>,
    reconnect: Option<PendingReconnect>,
    next_timer_id: u64,
    attempt: u32,
    backoff: Constant,
}

/// Handle to the task that owns a connection. Dropping it closes the connection.
struct LiveConnection {
    shutdown_tx: oneshot::Sender<()>,
    _task: JoinHandle<()>,
}

struct PendingReconnect {
    id: u64,
    task: JoinHandle<()>,
}

impl ConnectionManager {
    /// Create a manager for `endpoint` and open the first connection.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn new(endpoint: &str, config: Config) -> Result<Self> {
        Self::with_transport(endpoint, config, WebSocketTransport)
    }

    /// Return the process-wide manager, creating and connecting it on first use.
    ///
    /// Only the first call decides the endpoint: later calls return the same instance no
    /// matter which `endpoint` they pass, and their argument is not even validated. Prefer
    /// [`new`](Self::new) and passing the manager to its consumers where possible.
    ///
    /// # Panics
    ///
    /// Panics if the first call happens outside of a tokio runtime.
    pub fn shared(endpoint: &str) -> Result<&'static Self> {
        if let Some(manager) = SHARED.get() {
            return Ok(manager);
        }

        let endpoint = Endpoint::parse(endpoint)?;
        Ok(SHARED.get_or_init(|| {
            Self::from_parts(endpoint, Config::default(), Arc::new(WebSocketTransport))
        }))
    }
}

impl<T: Transport> ConnectionManager<T> {
    /// Create a manager that opens its connections through `transport`.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn with_transport(endpoint: &str, config: Config, transport: T) -> Result<Self> {
        let endpoint = Endpoint::parse(endpoint)?;
        Ok(Self::from_parts(endpoint, config, Arc::new(transport)))
    }

    fn from_parts(endpoint: Endpoint, config: Config, transport: Arc<T>) -> Self {
        let (broadcast_tx, _) = broadcast::channel(config.message_capacity.max(1));
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let backoff = config.reconnect.clone().into();

        let manager = Self {
            inner: Arc::new(Inner {
                endpoint,
                config,
                transport,
                slots: Mutex::new(Slots {
                    generation: 0,
                    connection: None,
                    reconnect: None,
                    next_timer_id: 0,
                    attempt: 0,
                    backoff,
                }),
                on_message: RwLock::new(None),
                broadcast_tx,
                state_tx,
            }),
        };
        manager.connect();
        manager
    }

    /// Open a connection unless one is already open or being opened.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn connect(&self) {
        let mut slots = self.inner.lock_slots();
        Inner::connect_locked(&self.inner, &mut slots);
    }

    /// Close the current connection and stop reconnecting.
    ///
    /// Any pending reconnect is cancelled. A later [`connect`](Self::connect) starts over
    /// with a fresh attempt count.
    pub fn disconnect(&self) {
        let mut slots = self.inner.lock_slots();
        slots.generation = slots.generation.wrapping_add(1);
        if let Some(pending) = slots.reconnect.take() {
            pending.task.abort();
        }
        if let Some(live) = slots.connection.take() {
            _ = live.shutdown_tx.send(());
        }
        slots.attempt = 0;
        slots.backoff.reset();
        self.inner.set_state(ConnectionState::Disconnected);

        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = %self.inner.endpoint, "WebSocket disconnected on request");
    }

    /// Register the message handler, replacing any previous one.
    ///
    /// Only messages that arrive after this call reach `handler`; nothing is replayed.
    /// A panic in `handler` is caught and logged, and the connection keeps running.
    pub fn set_on_message<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        // We can recover from poisoned lock because the slot holds a single value.
        *self
            .inner
            .on_message
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    /// Remove the message handler. Subsequent messages are dropped unless subscribed to.
    pub fn clear_on_message(&self) {
        *self
            .inner
            .on_message
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Subscribe to incoming messages.
    ///
    /// Each call returns a new independent receiver that sees messages arriving from now
    /// on. Receivers never block delivery to the registered handler.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Stream of incoming message payloads.
    ///
    /// Yields a [`WsError::Lagged`] error when the consumer falls too far behind, then
    /// continues with the oldest message still buffered.
    pub fn messages(&self) -> impl Stream<Item = Result<String>> + use<T> {
        let mut rx = self.subscribe();

        try_stream! {
            loop {
                match rx.recv().await {
                    Ok(payload) => {
                        yield payload;
                    }
                    Err(RecvError::Lagged(n)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("WebSocket message stream lagged, missed {n} messages");
                        Err(WsError::Lagged { count: n })?;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    /// The endpoint every connection is opened against.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}

impl<T: Transport> Inner<T> {
    fn lock_slots(&self) -> MutexGuard<'_, Slots> {
        // We can recover from poisoned lock because every critical section leaves the
        // slots consistent before doing anything that could panic.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    fn connect_locked(this: &Arc<Self>, slots: &mut Slots) {
        if this.state_tx.borrow().is_live() {
            return;
        }

        slots.generation = slots.generation.wrapping_add(1);
        let generation = slots.generation;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        this.set_state(ConnectionState::Connecting);

        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = %this.endpoint, generation, "Opening WebSocket connection");

        let task = tokio::spawn(run_connection(
            Arc::downgrade(this),
            Arc::clone(&this.transport),
            this.endpoint.to_string(),
            generation,
            shutdown_rx,
        ));

        // The previous connection, if any, has already been closed by its own task.
        slots.connection = Some(LiveConnection {
            shutdown_tx,
            _task: task,
        });
    }

    fn on_open(&self, generation: u64) -> bool {
        let mut slots = self.lock_slots();
        if slots.generation != generation {
            return false;
        }

        if let Some(pending) = slots.reconnect.take() {
            pending.task.abort();
            #[cfg(feature = "tracing")]
            tracing::debug!("Cancelled pending reconnect, connection already open");
        }
        slots.attempt = 0;
        slots.backoff.reset();
        self.set_state(ConnectionState::Connected {
            since: Instant::now(),
        });

        #[cfg(feature = "tracing")]
        tracing::info!(endpoint = %self.endpoint, "WebSocket connection opened");

        true
    }

    fn on_message(&self, generation: u64, payload: &str) {
        if self.lock_slots().generation != generation {
            #[cfg(feature = "tracing")]
            tracing::trace!(generation, "Dropping message from superseded connection");
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(%payload, "Received WebSocket message");

        // Clone the handler out so a handler may re-register without deadlocking.
        let handler = self
            .on_message
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(handler) = handler
            && let Err(cause) = panic::catch_unwind(AssertUnwindSafe(|| handler(payload)))
        {
            #[cfg(feature = "tracing")]
            tracing::error!(
                panic = panic_message(cause.as_ref()),
                "WebSocket message handler panicked"
            );
            #[cfg(not(feature = "tracing"))]
            let _ = &cause;
        }

        if self.broadcast_tx.receiver_count() > 0 {
            _ = self.broadcast_tx.send(payload.to_owned());
        }
    }

    fn on_close(this: &Arc<Self>, generation: u64) {
        let mut slots = this.lock_slots();
        if slots.generation != generation {
            return;
        }
        slots.connection = None;

        #[cfg(feature = "tracing")]
        tracing::info!(endpoint = %this.endpoint, "WebSocket connection closed");

        Self::schedule_reconnect(this, &mut slots);
    }

    fn schedule_reconnect(this: &Arc<Self>, slots: &mut Slots) {
        if slots.reconnect.is_some() {
            this.set_state(ConnectionState::Reconnecting {
                attempt: slots.attempt,
            });
            return;
        }

        // Check if we should stop reconnecting
        if let Some(max) = this.config.reconnect.max_attempts
            && slots.attempt >= max
        {
            #[cfg(feature = "tracing")]
            tracing::warn!(attempts = slots.attempt, "Giving up on WebSocket reconnection");
            slots.attempt = 0;
            slots.backoff.reset();
            this.set_state(ConnectionState::Disconnected);
            return;
        }

        // Constant never runs out of delays.
        let delay = slots
            .backoff
            .next_backoff()
            .unwrap_or(this.config.reconnect.delay);

        slots.attempt = slots.attempt.saturating_add(1);
        slots.next_timer_id = slots.next_timer_id.wrapping_add(1);
        let id = slots.next_timer_id;
        let weak = Arc::downgrade(this);

        #[cfg(feature = "tracing")]
        tracing::debug!(attempt = slots.attempt, ?delay, "Scheduling WebSocket reconnect");

        let task = tokio::spawn(async move {
            sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                Self::fire_reconnect(&inner, id);
            }
        });

        slots.reconnect = Some(PendingReconnect { id, task });
        this.set_state(ConnectionState::Reconnecting {
            attempt: slots.attempt,
        });
    }

    fn fire_reconnect(this: &Arc<Self>, id: u64) {
        let mut slots = this.lock_slots();
        if slots.reconnect.as_ref().is_none_or(|pending| pending.id != id) {
            return;
        }
        slots.reconnect = None;

        #[cfg(feature = "tracing")]
        tracing::debug!(attempt = slots.attempt, "Attempting to reconnect WebSocket");

        Self::connect_locked(this, &mut slots);
    }
}

/// Owns one connection from open to close.
async fn run_connection<T: Transport>(
    inner: Weak<Inner<T>>,
    transport: Arc<T>,
    endpoint: String,
    generation: u64,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let opened = tokio::select! {
        biased;

        _ = &mut shutdown_rx => return,
        result = transport.open(&endpoint) => result,
    };

    let mut connection = match opened {
        Ok(connection) => connection,
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(%endpoint, error = %e, "Unable to connect");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;

            if let Some(inner) = inner.upgrade() {
                Inner::on_close(&inner, generation);
            }
            return;
        }
    };

    if !inner.upgrade().is_some_and(|inner| inner.on_open(generation)) {
        close_connection(&mut connection).await;
        return;
    }

    loop {
        let event = tokio::select! {
            biased;

            _ = &mut shutdown_rx => break,
            event = connection.recv() => event,
        };

        match event {
            Some(Ok(payload)) => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.on_message(generation, &payload);
            }
            Some(Err(e)) => {
                // The close that follows a fatal error is what triggers the reconnect.
                #[cfg(feature = "tracing")]
                tracing::error!(error = %e, "WebSocket error");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
            }
            None => {
                close_connection(&mut connection).await;
                if let Some(inner) = inner.upgrade() {
                    Inner::on_close(&inner, generation);
                }
                return;
            }
        }
    }

    close_connection(&mut connection).await;
}

#[cfg(feature = "tracing")]
fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

async fn close_connection<C: Connection>(connection: &mut C) {
    if let Err(e) = connection.close().await {
        #[cfg(feature = "tracing")]
        tracing::debug!(error = %e, "Error closing WebSocket connection");
        #[cfg(not(feature = "tracing"))]
        let _ = &e;
    }
}
