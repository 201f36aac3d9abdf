//! Event stream connection manager.
//!
//! Keeps exactly one live connection to the backend's event stream. When the
//! connection drops or an attempt fails, one reconnect is scheduled after a
//! fixed delay. Scheduling always aborts the previously pending timer, so at
//! most one timer exists at any time. Retries never stop until `dispose()`.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nimbus_core::{ConnectionState, NotificationLevel, UiHandle};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{RealtimeError, RealtimeResult};
use crate::transport::Connector;

type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;
type StateHandler = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// The single pending reconnect, tagged so a firing timer only clears itself.
struct PendingReconnect {
    id: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    url: String,
    reconnect_delay: Duration,
    connector: Arc<dyn Connector>,
    ui: UiHandle,
    state: Mutex<ConnectionState>,
    message_handlers: RwLock<Vec<MessageHandler>>,
    state_handlers: RwLock<Vec<StateHandler>>,
    reconnect_timer: Mutex<Option<PendingReconnect>>,
    next_timer_id: AtomicU64,
    reader: Mutex<Option<JoinHandle<()>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    /// Bumped on every successful open; a reader only reports the close of its own connection.
    generation: AtomicU64,
    /// Set between a drop and the next successful open.
    outage: AtomicBool,
    disposed: AtomicBool,
}

/// Owns the real-time connection and its reconnect state machine.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(
        url: impl Into<String>,
        reconnect_delay: Duration,
        connector: Arc<dyn Connector>,
        ui: UiHandle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                reconnect_delay,
                connector,
                ui,
                state: Mutex::new(ConnectionState::Closed),
                message_handlers: RwLock::new(Vec::new()),
                state_handlers: RwLock::new(Vec::new()),
                reconnect_timer: Mutex::new(None),
                next_timer_id: AtomicU64::new(0),
                reader: Mutex::new(None),
                outbound: Mutex::new(None),
                generation: AtomicU64::new(0),
                outage: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Open the connection. A no-op while already connecting or open.
    ///
    /// A failed attempt schedules a reconnect before the error is returned.
    pub async fn connect(&self) -> RealtimeResult<()> {
        self.inner.connect().await
    }

    /// Register a handler for every inbound text frame.
    pub fn on_message(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        self.inner.message_handlers.write().push(Arc::new(handler));
    }

    /// Register a handler for connection state transitions.
    pub fn on_state_change(&self, handler: impl Fn(ConnectionState) + Send + Sync + 'static) {
        self.inner.state_handlers.write().push(Arc::new(handler));
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Number of reconnect timers waiting to fire (0 or 1).
    pub fn pending_reconnects(&self) -> usize {
        self.inner
            .reconnect_timer
            .lock()
            .as_ref()
            .map_or(0, |pending| usize::from(!pending.handle.is_finished()))
    }

    /// Queue a text frame on the open connection.
    pub fn send(&self, text: impl Into<String>) -> RealtimeResult<()> {
        let outbound = self.inner.outbound.lock();
        match outbound.as_ref() {
            Some(tx) => tx.send(text.into()).map_err(|_| RealtimeError::Closed),
            None => Err(RealtimeError::Closed),
        }
    }

    /// Send a keep-alive; the server answers with a `pong` event.
    pub fn ping(&self) -> RealtimeResult<()> {
        self.send(json!({ "message_type": "ping", "data": {} }).to_string())
    }

    /// Close the connection and stop reconnecting for good.
    pub fn dispose(&self) {
        let inner = &self.inner;
        if inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(pending) = inner.reconnect_timer.lock().take() {
            pending.handle.abort();
        }
        if let Some(reader) = inner.reader.lock().take() {
            reader.abort();
        }
        inner.outbound.lock().take();
        inner.set_state(ConnectionState::Closed);
        info!("Event stream connection disposed");
    }
}

impl Inner {
    async fn connect(self: &Arc<Self>) -> RealtimeResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(RealtimeError::Disposed);
        }

        {
            let mut state = self.state.lock();
            if matches!(*state, ConnectionState::Connecting | ConnectionState::Open) {
                debug!("connect() ignored, state is {:?}", *state);
                return Ok(());
            }
            *state = ConnectionState::Connecting;
        }
        self.publish_state(ConnectionState::Connecting);

        match self.connector.open(&self.url).await {
            Ok(channel) => {
                if self.disposed.load(Ordering::SeqCst) {
                    return Err(RealtimeError::Disposed);
                }

                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                *self.outbound.lock() = Some(channel.outbound);
                let reader = tokio::spawn(read_loop(Arc::clone(self), channel.inbound, generation));
                if let Some(previous) = self.reader.lock().replace(reader) {
                    previous.abort();
                }

                self.set_state(ConnectionState::Open);
                if self.outage.swap(false, Ordering::SeqCst) {
                    info!("Reconnected to {}", self.url);
                    self.ui.notify(NotificationLevel::Success, "Reconnected to the event stream");
                } else {
                    info!("Connected to {}", self.url);
                }
                Ok(())
            }
            Err(e) => {
                warn!("Connection attempt to {} failed: {}", self.url, e);
                self.handle_disconnect();
                Err(e)
            }
        }
    }

    fn handle_disconnect(self: &Arc<Self>) {
        self.outbound.lock().take();
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        self.set_state(ConnectionState::Closed);
        if !self.outage.swap(true, Ordering::SeqCst) {
            self.ui.notify(
                NotificationLevel::Warning,
                "Disconnected from the event stream. Reconnecting...",
            );
        }
        self.schedule_reconnect();
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let mut slot = self.reconnect_timer.lock();
        if let Some(previous) = slot.take() {
            debug!("Cancelling pending reconnect timer {}", previous.id);
            previous.handle.abort();
        }

        let id = self.next_timer_id.fetch_add(1, Ordering::SeqCst);
        let delay = self.reconnect_delay;
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut slot = inner.reconnect_timer.lock();
                if slot.as_ref().is_some_and(|pending| pending.id == id) {
                    slot.take();
                }
            }
            if inner.disposed.load(Ordering::SeqCst) {
                return;
            }
            debug!("Reconnect timer {} fired", id);
            reconnect(inner).await;
        });

        *slot = Some(PendingReconnect { id, handle });
        drop(slot);
        self.set_state(ConnectionState::Reconnecting);
        debug!("Reconnect scheduled in {:?}", delay);
    }

    fn set_state(&self, new_state: ConnectionState) {
        {
            let mut state = self.state.lock();
            if *state == new_state {
                return;
            }
            *state = new_state;
        }
        self.publish_state(new_state);
    }

    fn publish_state(&self, state: ConnectionState) {
        self.ui.update(|ui| ui.connection = state);
        let handlers = self.state_handlers.read().clone();
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(state))).is_err() {
                error!("State handler panicked on {:?}", state);
            }
        }
    }

    fn emit_message(&self, frame: &str) {
        let handlers = self.message_handlers.read().clone();
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(frame))).is_err() {
                error!("Message handler panicked; frame dropped");
            }
        }
    }
}

fn reconnect(inner: Arc<Inner>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        let _ = inner.connect().await;
    })
}

async fn read_loop(inner: Arc<Inner>, mut inbound: mpsc::UnboundedReceiver<String>, generation: u64) {
    while let Some(frame) = inbound.recv().await {
        inner.emit_message(&frame);
    }

    if inner.generation.load(Ordering::SeqCst) == generation {
        info!("Event stream connection closed");
        inner.handle_disconnect();
    }
}
