// Copyright 2026 Roon Labs and contributors.
// This file is dual-licensed as MIT or Apache-2.0.
// see LICENSE for license details.

//! The connection engine: correlates requests, routes responses, runs the
//! registration handshake, owns subscriptions, runs the keepalive watchdog,
//! and drives reconnection. See spec.md §4.4 — this is the heart of the crate.

use crate::clock::{elapsed_since, Clock, SystemClock};
use crate::codec::{self, DecodedFrame, Verb};
use crate::error::Error;
use crate::reconnect::{ReconnectConfig, Reconnector};
use crate::registration::{ConnectionState, RegistrationRecord};
use crate::response::RoonResponse;
use crate::token_store::TokenStore;
use crate::transport::{Message, Transport, WebSocketTransport};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// How a [`Connection`] obtains a fresh [`Transport`] each time it (re)connects.
/// The default, built by [`Connection::new`], dials `WebSocketTransport` at the
/// configured URL; tests substitute a factory that hands back an in-memory fake
/// so the engine can be driven deterministically (spec.md §4.2's rationale for
/// the Transport abstraction in the first place).
pub type TransportFactory =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<Arc<dyn Transport>, Error>> + Send>> + Send + Sync>;

/// Tunables for a [`Connection`]; everything not covered by [`ReconnectConfig`]
/// or [`RegistrationRecord`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Default timeout for [`Connection::send`] calls.
    pub default_timeout: Duration,
    /// Timeout for the `register` call, which may block on user approval.
    pub registration_timeout: Duration,
    /// Maximum silence from the Core before the watchdog forces a reconnect.
    pub keepalive_deadline: Duration,
    /// How many pings may arrive with no register response before the state
    /// moves to `AwaitingAuthorization`.
    pub pings_before_awaiting_authorization: u32,
    /// The backoff policy used when reconnecting.
    pub reconnect: ReconnectConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            registration_timeout: Duration::from_secs(300),
            keepalive_deadline: Duration::from_secs(15),
            pings_before_awaiting_authorization: 2,
            reconnect: ReconnectConfig::default(),
        }
    }
}

#[derive(Deserialize)]
struct InfoBody {
    core_id: String,
}

#[derive(Deserialize)]
struct RegisteredBody {
    core_id: String,
    display_name: String,
    #[serde(default)]
    token: Option<String>,
}

struct Shared {
    transport_factory: TransportFactory,
    registration_template: RegistrationRecord,
    token_store: Arc<dyn TokenStore>,
    config: ConnectionConfig,
    clock: Arc<dyn Clock>,

    state: Mutex<ConnectionState>,
    state_listener: Mutex<Option<mpsc::UnboundedSender<ConnectionState>>>,

    transport: Mutex<Option<Arc<dyn Transport>>>,
    next_id: AtomicI64,

    pending: Mutex<HashMap<i64, oneshot::Sender<Result<RoonResponse, Error>>>>,
    subscriptions: Mutex<HashMap<i64, mpsc::UnboundedSender<RoonResponse>>>,

    last_frame_at: Mutex<SystemTime>,
    registering: std::sync::atomic::AtomicBool,
    pings_since_register: AtomicU32,

    receive_loop_handle: Mutex<Option<JoinHandle<()>>>,
    watchdog_handle: Mutex<Option<JoinHandle<()>>>,
    reconnect_handle: Mutex<Option<JoinHandle<()>>>,
    reconnector: Mutex<Reconnector>,
}

/// A handle to a Roon Core connection. Cheaply cloneable; every clone talks
/// to the same underlying session.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Build a new, not-yet-connected [`Connection`].
    pub fn new(
        url: impl Into<String>,
        registration_template: RegistrationRecord,
        token_store: Arc<dyn TokenStore>,
        config: ConnectionConfig,
    ) -> Self {
        Self::with_clock(url, registration_template, token_store, config, Arc::new(SystemClock))
    }

    /// Like [`Connection::new`], but with an injectable clock (used in tests
    /// to drive the watchdog deterministically).
    pub fn with_clock(
        url: impl Into<String>,
        registration_template: RegistrationRecord,
        token_store: Arc<dyn TokenStore>,
        config: ConnectionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let url = url.into();
        let transport_factory: TransportFactory = Arc::new(move || {
            let url = url.clone();
            Box::pin(async move {
                let transport = WebSocketTransport::connect(&url).await?;
                Ok(Arc::new(transport) as Arc<dyn Transport>)
            })
        });
        Self::with_transport_factory(transport_factory, registration_template, token_store, config, clock)
    }

    /// The most general constructor: supplies the function used to obtain a
    /// fresh transport on every connect/reconnect attempt. Tests use this to
    /// substitute an in-memory fake for `WebSocketTransport`.
    pub fn with_transport_factory(
        transport_factory: TransportFactory,
        registration_template: RegistrationRecord,
        token_store: Arc<dyn TokenStore>,
        config: ConnectionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        let reconnect_config = config.reconnect.clone();
        Self {
            shared: Arc::new(Shared {
                transport_factory,
                registration_template,
                token_store,
                config,
                clock,
                reconnector: Mutex::new(Reconnector::new(reconnect_config)),
                state: Mutex::new(ConnectionState::Disconnected),
                state_listener: Mutex::new(None),
                transport: Mutex::new(None),
                next_id: AtomicI64::new(0),
                pending: Mutex::new(HashMap::new()),
                subscriptions: Mutex::new(HashMap::new()),
                last_frame_at: Mutex::new(now),
                registering: std::sync::atomic::AtomicBool::new(false),
                pings_since_register: AtomicU32::new(0),
                receive_loop_handle: Mutex::new(None),
                watchdog_handle: Mutex::new(None),
                reconnect_handle: Mutex::new(None),
            }),
        }
    }

    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state.lock().clone()
    }

    /// A fresh stream of state transitions. Replaces any previously returned
    /// stream, which is finished so its consumer terminates. Yields the
    /// current state immediately.
    pub fn state_stream(&self) -> StateStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let current = self.state();
        let _ = tx.send(current);
        // Dropping the previous sender (if any) closes its receiver's stream.
        *self.shared.state_listener.lock() = Some(tx);
        StateStream { inner: rx }
    }

    fn set_state(&self, state: ConnectionState) {
        *self.shared.state.lock() = state.clone();
        let listener = self.shared.state_listener.lock();
        if let Some(tx) = listener.as_ref() {
            let _ = tx.send(state);
        }
    }

    fn next_id(&self) -> i64 {
        self.shared.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn current_transport(&self) -> Option<Arc<dyn Transport>> {
        self.shared.transport.lock().clone()
    }

    fn mark_frame_received(&self) {
        *self.shared.last_frame_at.lock() = self.shared.clock.now();
    }

    /// Begin connecting. A no-op unless the state is `Disconnected`, `Failed`,
    /// or `Reconnecting`.
    pub async fn connect(&self) -> Result<(), Error> {
        {
            let state = self.shared.state.lock().clone();
            if !matches!(
                state,
                ConnectionState::Disconnected | ConnectionState::Failed { .. } | ConnectionState::Reconnecting { .. }
            ) {
                return Ok(());
            }
        }
        self.set_state(ConnectionState::Connecting);
        match self.establish().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.set_state(ConnectionState::Failed { error: e.to_string() });
                Err(e)
            }
        }
    }

    /// Tear everything down: cancels reconnect and the receive loop, closes
    /// the transport, fails all pending requests, finishes all subscriptions,
    /// resets the id counter, and transitions to `Disconnected`.
    pub async fn disconnect(&self) {
        if let Some(h) = self.shared.reconnect_handle.lock().take() {
            h.abort();
        }
        self.close_resources("disconnected".to_string()).await;
        self.shared.next_id.store(0, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected);
    }

    /// Issue a correlated request and await its response.
    pub async fn send(&self, path: &str, body: Option<Value>) -> Result<RoonResponse, Error> {
        let timeout = self.shared.config.default_timeout;
        self.send_with_timeout(path, body, timeout).await
    }

    /// Like [`Connection::send`], with an explicit timeout.
    pub async fn send_with_timeout(
        &self,
        path: &str,
        body: Option<Value>,
        timeout: Duration,
    ) -> Result<RoonResponse, Error> {
        if !self.state().is_connected() {
            return Err(Error::ConnectionClosed {
                code: 0,
                reason: Some("not connected".into()),
            });
        }
        self.send_correlated(path, body, timeout).await
    }

    /// The actual request/response correlation described in spec.md §4.4.5.
    /// Used both for ordinary calls and for the registration handshake
    /// (which bypasses the `is_connected` guard in [`Connection::send`]).
    async fn send_correlated(
        &self,
        path: &str,
        body: Option<Value>,
        timeout: Duration,
    ) -> Result<RoonResponse, Error> {
        let Some(transport) = self.current_transport() else {
            return Err(Error::ConnectionClosed {
                code: 0,
                reason: Some("no transport".into()),
            });
        };

        let id = self.next_id();
        let (tx, rx) = oneshot::channel();

        // Register the completion sink before initiating the send: this is
        // the single most important invariant in the system (spec.md §4.4.5,
        // §9). If we sent first, a response racing ahead of our own insert
        // would have nowhere to land.
        {
            self.shared.pending.lock().insert(id, tx);
        }

        let bytes = codec::encode_request(id, path, body.as_ref());

        // The send is initiated from a detached task so that the pending-map
        // mutation above is visible to the receive loop's dispatch before the
        // send future can resolve.
        let shared = self.shared.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.send(bytes).await {
                if let Some(tx) = shared.pending.lock().remove(&id) {
                    let _ = tx.send(Err(e));
                }
            }
        });

        // Arm the timeout concurrently; whichever of {response, send failure,
        // timeout, teardown} claims the id first via atomic take-from-map wins.
        let shared = self.shared.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(tx) = shared.pending.lock().remove(&id) {
                let _ = tx.send(Err(Error::Timeout));
            }
        });

        rx.await.unwrap_or(Err(Error::ConnectionClosed {
            code: 0,
            reason: Some("connection torn down".into()),
        }))
    }

    /// Open a long-lived subscription stream. `unsubscribe_method`, if given,
    /// is the method name (on the same service as `path`) the library calls
    /// with `{"subscription_key": id}` when the stream is dropped or the Core
    /// never sends a terminal `COMPLETE` (spec.md §6 names `subscription_key`
    /// as the body key `unsubscribe_*` calls take; the wire shape for
    /// unsubscription itself isn't otherwise pinned down by the spec).
    pub async fn subscribe(
        &self,
        path: &str,
        body: Option<Value>,
        unsubscribe_method: Option<&str>,
    ) -> Result<SubscriptionStream, Error> {
        if !self.state().is_connected() {
            return Err(Error::ConnectionClosed {
                code: 0,
                reason: Some("not connected".into()),
            });
        }
        let Some(transport) = self.current_transport() else {
            return Err(Error::ConnectionClosed {
                code: 0,
                reason: Some("no transport".into()),
            });
        };

        let id = self.next_id();
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.subscriptions.lock().insert(id, tx);

        let bytes = codec::encode_request(id, path, body.as_ref());
        if let Err(e) = transport.send(bytes).await {
            self.shared.subscriptions.lock().remove(&id);
            return Err(e);
        }

        let unsub_path = unsubscribe_method.map(|method| {
            let service = path.rsplit_once('/').map(|(s, _)| s).unwrap_or(path);
            format!("{service}/{method}")
        });

        Ok(SubscriptionStream {
            shared: self.shared.clone(),
            id,
            unsub_path,
            receiver: rx,
        })
    }

    /// Closes the transport, fails all pending requests with
    /// `ConnectionClosed`, finishes all subscriptions, and aborts the receive
    /// loop and watchdog tasks. Does not touch `state` or the reconnector —
    /// callers decide what comes next.
    async fn close_resources(&self, reason: String) {
        if let Some(h) = self.shared.receive_loop_handle.lock().take() {
            h.abort();
        }
        if let Some(h) = self.shared.watchdog_handle.lock().take() {
            h.abort();
        }
        if let Some(transport) = self.shared.transport.lock().take() {
            let _ = transport.close(0, Some(reason.clone())).await;
        }

        let pendings: Vec<_> = self.shared.pending.lock().drain().collect();
        for (_, tx) in pendings {
            let _ = tx.send(Err(Error::ConnectionClosed {
                code: 0,
                reason: Some(reason.clone()),
            }));
        }

        // Dropping every subscription sender closes its receiver's stream,
        // which is the liveness rule from spec.md §5: a sink that isn't
        // finished hangs its consumer forever.
        self.shared.subscriptions.lock().clear();
    }

    /// Connect the transport and run the registration handshake. Used by both
    /// `connect()` and the reconnect loop; leaves `state` transitions other
    /// than `Connected` (on success) to the caller.
    async fn establish(&self) -> Result<(), Error> {
        let transport = (self.shared.transport_factory)().await?;
        *self.shared.transport.lock() = Some(transport);
        self.mark_frame_received();

        let receive_loop = {
            let this = self.clone();
            tokio::spawn(async move { this.run_receive_loop().await })
        };
        *self.shared.receive_loop_handle.lock() = Some(receive_loop);

        let watchdog = {
            let this = self.clone();
            tokio::spawn(async move { this.run_watchdog().await })
        };
        *self.shared.watchdog_handle.lock() = Some(watchdog);

        self.set_state(ConnectionState::Registering);

        if let Err(e) = self.register().await {
            self.close_resources(e.to_string()).await;
            return Err(e);
        }

        Ok(())
    }

    async fn register(&self) -> Result<(), Error> {
        let info = self
            .send_correlated(
                "com.roonlabs.registry:1/info",
                None,
                self.shared.config.default_timeout,
            )
            .await?;
        if !info.is_success() {
            return Err(Error::RegistrationFailed(
                info.error_message().unwrap_or_else(|| info.name.clone()),
            ));
        }
        let info_body: InfoBody = info
            .body_as()
            .map_err(|e| Error::RegistrationFailed(e.to_string()))?
            .ok_or_else(|| Error::RegistrationFailed("missing info body".into()))?;

        let token = self.shared.token_store.token(&info_body.core_id).await;
        let mut record = self.shared.registration_template.clone();
        record.token = token;
        let body = serde_json::to_value(&record).map_err(|e| Error::RegistrationFailed(e.to_string()))?;

        self.shared.pings_since_register.store(0, Ordering::SeqCst);
        self.shared.registering.store(true, Ordering::SeqCst);

        let result = self
            .send_correlated(
                "com.roonlabs.registry:1/register",
                Some(body),
                self.shared.config.registration_timeout,
            )
            .await;

        self.shared.registering.store(false, Ordering::SeqCst);

        let response = result?;
        if response.name != "Registered" {
            return Err(Error::RegistrationFailed(
                response.error_message().unwrap_or_else(|| response.name.clone()),
            ));
        }
        let registered: RegisteredBody = response
            .body_as()
            .map_err(|e| Error::RegistrationFailed(e.to_string()))?
            .ok_or_else(|| Error::RegistrationFailed("missing register body".into()))?;

        if let Some(token) = &registered.token {
            self.shared
                .token_store
                .save_token(&registered.core_id, token.clone())
                .await;
        }

        self.set_state(ConnectionState::Connected {
            core_id: registered.core_id,
            core_name: registered.display_name,
        });

        Ok(())
    }

    async fn run_receive_loop(&self) {
        loop {
            let Some(transport) = self.current_transport() else {
                break;
            };
            match transport.receive().await {
                Ok(message) => {
                    self.mark_frame_received();
                    let bytes = message.into_bytes();
                    match codec::decode(&bytes) {
                        Ok(frame) => self.dispatch(frame).await,
                        Err(e) => {
                            tracing::warn!(error = %e, "dropping malformed moo/1 frame");
                        }
                    }
                }
                Err(e) => {
                    self.on_transport_lost(e).await;
                    break;
                }
            }
        }
    }

    async fn dispatch(&self, frame: DecodedFrame) {
        match frame {
            DecodedFrame::Request { id, service, method, body: _ } => {
                self.handle_inbound_request(id, &service, &method).await;
            }
            DecodedFrame::Response { verb, id, name, body, .. } => {
                let response = RoonResponse { name, body };

                if let Some(tx) = self.shared.pending.lock().remove(&id) {
                    let _ = tx.send(Ok(response));
                    return;
                }

                let mut subscriptions = self.shared.subscriptions.lock();
                if let Some(sender) = subscriptions.get(&id) {
                    let _ = sender.send(response);
                    if matches!(verb, Verb::Complete) {
                        subscriptions.remove(&id);
                    }
                } else {
                    drop(subscriptions);
                    tracing::trace!(id, "response for unknown request id");
                }
            }
        }
    }

    async fn handle_inbound_request(&self, id: i64, service: &str, method: &str) {
        if service == "com.roonlabs.ping:1" && method == "ping" {
            if self.shared.registering.load(Ordering::SeqCst) {
                let count = self.shared.pings_since_register.fetch_add(1, Ordering::SeqCst) + 1;
                if count >= self.shared.config.pings_before_awaiting_authorization {
                    let still_registering = matches!(*self.shared.state.lock(), ConnectionState::Registering);
                    if still_registering {
                        self.set_state(ConnectionState::AwaitingAuthorization);
                    }
                }
            }
            if let Some(transport) = self.current_transport() {
                let bytes = codec::encode_response(id, "Success", None);
                let _ = transport.send(bytes).await;
            }
            return;
        }

        if let Some(transport) = self.current_transport() {
            let body = serde_json::json!({ "error": format!("unknown service {service}/{method}") });
            let bytes = codec::encode_response(id, "InvalidRequest", Some(&body));
            let _ = transport.send(bytes).await;
        }
    }

    async fn run_watchdog(&self) {
        loop {
            let last = *self.shared.last_frame_at.lock();
            let now = self.shared.clock.now();
            let elapsed = elapsed_since(last, now);
            let deadline = self.shared.config.keepalive_deadline;

            if elapsed >= deadline {
                tracing::warn!(?elapsed, ?deadline, "keepalive deadline exceeded, forcing reconnect");
                if let Some(transport) = self.current_transport() {
                    let _ = transport.close(0, Some("keepalive timeout".into())).await;
                }
                break;
            }

            tokio::time::sleep(deadline - elapsed).await;
        }
    }

    async fn on_transport_lost(&self, error: Error) {
        let was_connected = matches!(*self.shared.state.lock(), ConnectionState::Connected { .. });
        self.close_resources(error.to_string()).await;

        if was_connected {
            self.begin_reconnect();
        } else {
            self.set_state(ConnectionState::Failed { error: error.to_string() });
        }
    }

    fn begin_reconnect(&self) {
        let this = self.clone();
        let handle = tokio::spawn(async move { this.run_reconnect_loop().await });
        *self.shared.reconnect_handle.lock() = Some(handle);
    }

    async fn run_reconnect_loop(&self) {
        loop {
            let delay = self.shared.reconnector.lock().next_delay();

            let Some(delay) = delay else {
                self.set_state(ConnectionState::Failed {
                    error: Error::MaxReconnectAttemptsExceeded.to_string(),
                });
                return;
            };

            let attempt = self.shared.reconnector.lock().attempt();
            self.set_state(ConnectionState::Reconnecting { attempt });
            tokio::time::sleep(delay).await;

            if let Some(transport) = self.shared.transport.lock().take() {
                let _ = transport.close(0, None).await;
            }

            match self.establish().await {
                Ok(()) => {
                    self.shared.reconnector.lock().reset();
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "reconnect attempt failed");
                }
            }
        }
    }
}

/// A stream of server-pushed [`RoonResponse`]s for a single subscription.
pub struct SubscriptionStream {
    shared: Arc<Shared>,
    id: i64,
    unsub_path: Option<String>,
    receiver: mpsc::UnboundedReceiver<RoonResponse>,
}

impl SubscriptionStream {
    /// Await the next item in this subscription, or `None` once it has ended.
    pub async fn next(&mut self) -> Option<RoonResponse> {
        self.receiver.recv().await
    }
}

impl futures::Stream for SubscriptionStream {
    type Item = RoonResponse;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        let removed = self.shared.subscriptions.lock().remove(&self.id).is_some();
        if !removed {
            return;
        }
        let Some(unsub_path) = self.unsub_path.clone() else {
            return;
        };
        let Some(transport) = self.shared.transport.lock().clone() else {
            return;
        };
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let body = serde_json::json!({ "subscription_key": self.id });
        let bytes = codec::encode_request(id, &unsub_path, Some(&body));
        tokio::spawn(async move {
            let _ = transport.send(bytes).await;
        });
    }
}

/// A stream of [`ConnectionState`] transitions, returned by
/// [`Connection::state_stream`].
pub struct StateStream {
    inner: mpsc::UnboundedReceiver<ConnectionState>,
}

impl StateStream {
    /// Await the next state transition.
    pub async fn next(&mut self) -> Option<ConnectionState> {
        self.inner.recv().await
    }
}

impl futures::Stream for StateStream {
    type Item = ConnectionState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_recv(cx)
    }
}
