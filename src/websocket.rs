//! The persistent WebSocket channel used for live flag bootstrapping and updates.
//!
//! One connection exists per client at most. A context send installs a pending request;
//! the first snapshot received resolves it and switches the current context. Each send
//! carries a client-side epoch so that when `set_context` calls overlap, only the most
//! recent request can be resolved by an inbound snapshot; older requests settle with
//! [`Error::Superseded`] instead of dangling.
//!
//! Snapshots carry no correlation id, so correlation is positional. If a request is
//! superseded after its bootstrap request went out, the reply that was meant for it
//! resolves the newer request instead, and the newer request's own reply then lands as a
//! live update that corrects the cache. The window is transient and self-healing.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;

use crate::context::EvaluationContext;
use crate::flag_store::FlagStore;
use crate::flags::{BootstrapRequest, FlagSnapshot};
use crate::{Error, Result};

pub(crate) struct WebSocketConfig {
    pub url: String,
    pub api_key: String,
    pub additional_headers: HashMap<String, String>,
}

/// A context request that has been sent (or is about to be sent) and is waiting for its
/// first snapshot. At most one exists at a time; installing a newer one supersedes it.
struct PendingContext {
    epoch: u64,
    context: EvaluationContext,
    context_key: String,
    done: oneshot::Sender<Result<()>>,
}

struct Connection {
    outbound: mpsc::UnboundedSender<Message>,
    /// Set by the reader task when the connection goes away, so the next send reconnects.
    closed: Arc<AtomicBool>,
}

/// Owns the connection lifecycle: Disconnected -> Connecting -> Open -> Disconnected.
///
/// The connection slot lock is held across the connect handshake, which both serializes
/// racing connect attempts (no connection fan-out) and lets late callers observe the
/// connection the first caller established.
pub(crate) struct WebSocketChannel {
    config: WebSocketConfig,
    store: Arc<FlagStore>,
    conn: tokio::sync::Mutex<Option<Connection>>,
    pending: Arc<Mutex<Option<PendingContext>>>,
    epoch: AtomicU64,
}

impl WebSocketChannel {
    pub(crate) fn new(config: WebSocketConfig, store: Arc<FlagStore>) -> WebSocketChannel {
        WebSocketChannel {
            config,
            store,
            conn: tokio::sync::Mutex::new(None),
            pending: Arc::new(Mutex::new(None)),
            epoch: AtomicU64::new(0),
        }
    }

    /// Send `context` over the channel (connecting first if necessary) and wait for the
    /// first flag snapshot for that exact context to be received and cached.
    pub(crate) async fn send_context(
        &self,
        context: EvaluationContext,
        context_key: String,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = oneshot::channel();

        self.store.set_pending(true);
        {
            let mut pending = self
                .pending
                .lock()
                .expect("thread holding pending lock should not panic");
            if let Some(superseded) = pending.take() {
                log::debug!(target: "schematic", "superseding in-flight context request");
                let _ = superseded.done.send(Err(Error::Superseded));
            }
            *pending = Some(PendingContext {
                epoch,
                context,
                context_key,
                done: done_tx,
            });
        }

        if let Err(err) = self.send_bootstrap_request(epoch).await {
            self.abandon(epoch);
            return Err(err);
        }

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, done_rx).await {
                Ok(received) => received,
                Err(_) => {
                    log::warn!(target: "schematic", "timed out waiting for a flag snapshot");
                    self.abandon(epoch);
                    return Err(Error::Timeout);
                }
            },
            None => done_rx.await,
        };

        match received {
            Ok(outcome) => outcome,
            // Sender dropped without resolving: the channel was torn down underneath us.
            Err(_) => {
                self.abandon(epoch);
                Err(Error::ConnectionClosed)
            }
        }
    }

    /// Close the connection if open. Idempotent; an in-flight context request settles
    /// with [`Error::ConnectionClosed`].
    pub(crate) async fn close(&self) {
        let mut conn = self.conn.lock().await;
        if let Some(connection) = conn.take() {
            log::debug!(target: "schematic", "closing websocket connection");
            let _ = connection.outbound.send(Message::Close(None));
            connection.closed.store(true, Ordering::Release);
        }
        drop(conn);

        let abandoned = {
            let mut pending = self
                .pending
                .lock()
                .expect("thread holding pending lock should not panic");
            pending.take()
        };
        if let Some(pending) = abandoned {
            let _ = pending.done.send(Err(Error::ConnectionClosed));
            self.store.set_pending(false);
        }
    }

    /// Serialize and send the pending request for `epoch`, connecting first if there is
    /// no live connection.
    async fn send_bootstrap_request(&self, epoch: u64) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let needs_connect = conn
            .as_ref()
            .map_or(true, |c| c.closed.load(Ordering::Acquire));
        if needs_connect {
            *conn = Some(self.open_connection().await?);
        }

        let message = {
            let pending = self
                .pending
                .lock()
                .expect("thread holding pending lock should not panic");
            match pending.as_ref() {
                Some(p) if p.epoch == epoch => {
                    let request = BootstrapRequest {
                        api_key: &self.config.api_key,
                        data: &p.context,
                    };
                    Message::Text(
                        serde_json::to_string(&request)
                            .expect("bootstrap request serialization should not fail"),
                    )
                }
                // A newer call superseded us while we were waiting to connect;
                // it will send its own context.
                _ => return Err(Error::Superseded),
            }
        };

        let connection = conn.as_ref().expect("connection was established above");
        connection
            .outbound
            .send(message)
            .map_err(|_| Error::ConnectionClosed)
    }

    async fn open_connection(&self) -> Result<Connection> {
        let mut request = self.config.url.as_str().into_client_request()?;
        for (name, value) in &self.config.additional_headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    request.headers_mut().insert(name, value);
                }
                _ => {
                    log::warn!(target: "schematic", "skipping invalid additional header {name:?}");
                }
            }
        }

        log::debug!(target: "schematic", "connecting to {}", self.config.url);
        let (stream, _response) = connect_async(request).await?;
        let (mut write, mut read) = stream.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if write.send(message).await.is_err() {
                    break;
                }
            }
            let _ = write.close().await;
        });

        {
            let store = Arc::clone(&self.store);
            let pending = Arc::clone(&self.pending);
            let closed = Arc::clone(&closed);
            let pong = outbound.clone();
            tokio::spawn(async move {
                while let Some(message) = read.next().await {
                    match message {
                        Ok(Message::Text(text)) => handle_snapshot(&store, &pending, &text),
                        Ok(Message::Ping(payload)) => {
                            let _ = pong.send(Message::Pong(payload));
                        }
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(err) => {
                            log::warn!(target: "schematic", "websocket error: {err}");
                            break;
                        }
                    }
                }
                log::debug!(target: "schematic", "websocket connection closed");
                closed.store(true, Ordering::Release);
            });
        }

        Ok(Connection { outbound, closed })
    }

    /// Drop the pending request for `epoch` if it is still installed, clearing the
    /// pending indicator when nothing newer is in flight.
    fn abandon(&self, epoch: u64) {
        let clear = {
            let mut pending = self
                .pending
                .lock()
                .expect("thread holding pending lock should not panic");
            if pending.as_ref().is_some_and(|p| p.epoch == epoch) {
                *pending = None;
            }
            pending.is_none()
        };
        if clear {
            self.store.set_pending(false);
        }
    }
}

/// Each inbound text frame is a full flag snapshot. If a context request is pending, the
/// snapshot is for it: cache it under the requested context, switch the current context,
/// and resolve the request exactly once (the oneshot cannot be resolved twice). Otherwise
/// it is a live update for the active context.
fn handle_snapshot(store: &FlagStore, pending: &Mutex<Option<PendingContext>>, text: &str) {
    let snapshot: FlagSnapshot = match serde_json::from_str(text) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            log::warn!(target: "schematic", "discarding malformed flag snapshot: {err}");
            return;
        }
    };

    let resolved = pending
        .lock()
        .expect("thread holding pending lock should not panic")
        .take();
    match resolved {
        Some(request) => {
            log::debug!(target: "schematic", "received snapshot with {} flags", snapshot.flags.len());
            store.apply_snapshot(&request.context_key, snapshot.flags);
            store.set_current_context(request.context, request.context_key);
            store.set_pending(false);
            // The caller may already have given up (timeout); resolution is best-effort.
            let _ = request.done.send(Ok(()));
        }
        None => match store.context_key() {
            Some(key) => {
                log::debug!(target: "schematic", "received live update with {} flags", snapshot.flags.len());
                store.apply_snapshot(&key, snapshot.flags);
            }
            None => {
                log::debug!(target: "schematic", "ignoring snapshot received before any context was set");
            }
        },
    }
}
