//! Transports for the event stream.
//!
//! A [`Connector`] opens one bidirectional text channel. `WsConnector` is a
//! thin client over `tokio-tungstenite`; `MemoryConnector` hands the server
//! end to tests so they can push frames and drop the connection at will.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{RealtimeError, RealtimeResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An open text channel. Dropping `outbound` closes the connection; the
/// `inbound` receiver yields `None` once the peer is gone.
pub struct Channel {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Opens connections to the event stream.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &str) -> RealtimeResult<Channel>;
}

/// WebSocket connector.
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> RealtimeResult<Channel> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| RealtimeError::Connect(e.to_string()))?;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(ws, out_rx, in_tx));

        Ok(Channel {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

async fn pump(
    ws: WsStream,
    mut outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<String>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            out = outbound.recv() => {
                let Some(text) = out else {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                };
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if inbound.send(text.as_str().to_owned()).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!("Event stream closed by server: {:?}", frame);
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("Event stream error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}

/// The far side of a [`MemoryConnector`] connection.
pub struct ServerEnd {
    /// Frames sent here arrive at the client.
    pub to_client: mpsc::UnboundedSender<String>,
    /// Frames the client sent.
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    pub fn send(&self, frame: impl Into<String>) -> bool {
        self.to_client.send(frame.into()).is_ok()
    }
}

/// In-memory connector for tests.
#[derive(Default)]
pub struct MemoryConnector {
    /// Outcomes for upcoming attempts; `true` accepts. Empty means accept.
    plan: Mutex<VecDeque<bool>>,
    refuse_all: Mutex<bool>,
    attempts: AtomicUsize,
    servers: Mutex<VecDeque<ServerEnd>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `n` connection attempts.
    pub fn refuse_next(&self, n: usize) {
        self.plan.lock().extend(std::iter::repeat(false).take(n));
    }

    /// Refuse every attempt until `accept_all` is called.
    pub fn refuse_all(&self) {
        *self.refuse_all.lock() = true;
    }

    pub fn accept_all(&self) {
        *self.refuse_all.lock() = false;
        self.plan.lock().clear();
    }

    /// Number of `open` calls so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Take the server end of the oldest accepted connection not yet taken.
    pub fn take_server(&self) -> Option<ServerEnd> {
        self.servers.lock().pop_front()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, url: &str) -> RealtimeResult<Channel> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let accept = !*self.refuse_all.lock() && self.plan.lock().pop_front().unwrap_or(true);
        if !accept {
            return Err(RealtimeError::Connect(format!("{}: connection refused", url)));
        }

        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        self.servers.lock().push_back(ServerEnd {
            to_client,
            from_client,
        });

        Ok(Channel { outbound, inbound })
    }
}
