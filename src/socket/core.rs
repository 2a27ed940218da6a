//! Socket layer: namespaces, acknowledgments and event dispatch.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tracing::{debug, error, trace, warn};

use crate::emitter::{Args, EventEmitter, ListenerId, PendingEvent};
use crate::engine::{self, Engine};
use crate::error::Result;

use super::packet::{DEFAULT_NAMESPACE, SocketPacket, SocketPacketType};

// ============================================================================
// Event Names
// ============================================================================

/// Emitted when a namespace connects. Args: `[namespace]`.
pub const EVENT_CONNECT: &str = "connect";

/// Emitted when a namespace disconnects. Args: `[namespace]`.
pub const EVENT_DISCONNECT: &str = "disconnect";

/// Emitted for every `event` packet. Args: `[namespace, payload]`.
pub const EVENT_MESSAGE: &str = "message";

/// Emitted for every `ack` packet. Args: `[ack_id, namespace, payload]`.
pub const EVENT_ACK: &str = "ack";

/// Emitted once when the underlying engine closes. No args.
pub const EVENT_CLOSE: &str = "close";

/// Returns the per-id ack event name, `ack_<id>`.
///
/// Emitted with `[namespace, payload]` when the reply to `ack_id` arrives.
#[inline]
#[must_use]
pub fn ack_event(ack_id: u64) -> String {
    format!("ack_{ack_id}")
}

// ============================================================================
// Namespace Sessions
// ============================================================================

/// Connection state of one namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NamespaceState {
    /// No `connect` packet received yet.
    #[default]
    Unconnected,
    /// `connect` received.
    Connected,
    /// `disconnect` received after connecting.
    Disconnected,
}

/// Per-namespace session data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceSession {
    /// Session id assigned by the server on connect.
    pub sid: Option<String>,
    /// Connection state.
    pub state: NamespaceState,
}

// ============================================================================
// Socket
// ============================================================================

/// Multiplexing layer on top of an [`Engine`].
///
/// Sends `connect` for `/` when the engine opens, tracks namespace sessions,
/// auto-acknowledges inbound packets carrying an ack id and emits
/// [`EVENT_CONNECT`], [`EVENT_DISCONNECT`], [`EVENT_MESSAGE`], [`EVENT_ACK`],
/// `ack_<id>` and [`EVENT_CLOSE`].
///
/// # Thread Safety
///
/// Inbound handling runs on the transport task. Sends may come from any
/// task; ack ids are drawn from an atomic counter so concurrent senders
/// never share an id, but their relative order on the wire is whatever
/// order they reach the engine queue.
#[derive(Clone)]
pub struct Socket {
    inner: Arc<SocketInner>,
}

struct SocketInner {
    engine: Engine,
    emitter: EventEmitter,
    sessions: Mutex<FxHashMap<String, NamespaceSession>>,
    ack_counter: AtomicU64,
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("engine", &self.inner.engine)
            .field("sessions", &*self.inner.sessions.lock())
            .field("next_ack_id", &self.inner.ack_counter.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Socket {
    /// Creates the socket layer and subscribes it to `engine`'s events.
    #[must_use]
    pub(crate) fn new(engine: Engine, emitter: EventEmitter) -> Self {
        let inner = Arc::new(SocketInner {
            engine,
            emitter,
            sessions: Mutex::new(FxHashMap::default()),
            ack_counter: AtomicU64::new(1),
        });

        let socket = Self { inner };
        socket.subscribe_to_engine();
        socket
    }

    fn subscribe_to_engine(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.engine.on(engine::EVENT_OPEN, move |_| {
            if let Some(socket) = upgrade(&weak) {
                socket.on_engine_open();
            }
        });

        let weak = Arc::downgrade(&self.inner);
        self.inner.engine.on(engine::EVENT_MESSAGE, move |args| {
            let Some(socket) = upgrade(&weak) else {
                return;
            };

            let Some(Value::String(data)) = args.first() else {
                warn!(?args, "Engine message without string data");
                return;
            };

            if let Err(e) = socket.handle_packet_text(data) {
                error!(error = %e, "Protocol violation, aborting connection");
                socket.inner.engine.abort();
            }
        });

        let weak = Arc::downgrade(&self.inner);
        self.inner.engine.on(engine::EVENT_CLOSE, move |_| {
            if let Some(socket) = upgrade(&weak) {
                debug!("Engine closed, finishing socket");
                socket.inner.emitter.emit(EVENT_CLOSE, vec![]);
                socket.inner.emitter.finish();
            }
        });
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the underlying engine.
    #[inline]
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    /// Returns the socket's emitter.
    #[inline]
    #[must_use]
    pub fn emitter(&self) -> &EventEmitter {
        &self.inner.emitter
    }

    /// Returns `true` if the default namespace is connected.
    #[inline]
    #[must_use]
    pub fn connected(&self) -> bool {
        self.is_connected(DEFAULT_NAMESPACE)
    }

    /// Returns `true` if `namespace` is connected.
    #[must_use]
    pub fn is_connected(&self, namespace: &str) -> bool {
        self.inner
            .sessions
            .lock()
            .get(namespace)
            .is_some_and(|session| session.state == NamespaceState::Connected)
    }

    /// Returns the session id the server assigned to `namespace`.
    #[must_use]
    pub fn sid(&self, namespace: &str) -> Option<String> {
        self.inner
            .sessions
            .lock()
            .get(namespace)
            .and_then(|session| session.sid.clone())
    }

    /// Returns the session recorded for `namespace`.
    #[must_use]
    pub fn session(&self, namespace: &str) -> Option<NamespaceSession> {
        self.inner.sessions.lock().get(namespace).cloned()
    }

    /// Returns `true` unless the engine is fully closed.
    #[inline]
    #[must_use]
    pub fn can_make_progress(&self) -> bool {
        self.inner.engine.can_make_progress()
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// See [`EventEmitter::on`].
    pub fn on<F>(&self, event: &str, callback: F) -> ListenerId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.inner.emitter.on(event, callback)
    }

    /// See [`EventEmitter::once`].
    pub fn once<F>(&self, event: &str, callback: F) -> ListenerId
    where
        F: FnOnce(Args) + Send + 'static,
    {
        self.inner.emitter.once(event, callback)
    }

    /// See [`EventEmitter::off`].
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.inner.emitter.off(event, id)
    }

    /// See [`EventEmitter::next`].
    pub fn next(&self, event: &str) -> PendingEvent {
        self.inner.emitter.next(event)
    }

    /// See [`EventEmitter::wait_for`].
    pub async fn wait_for(&self, event: &str) -> Result<Args> {
        self.inner.emitter.wait_for(event).await
    }

    /// See [`EventEmitter::wait_for_with`].
    pub async fn wait_for_with<F>(&self, event: &str, action: F) -> Result<Args>
    where
        F: FnOnce() -> Result<()>,
    {
        self.inner.emitter.wait_for_with(event, action).await
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Sends a packet, stamping the next ack id when `with_ack` is set.
    ///
    /// Returns the packet's ack id. Subscribe to [`ack_event`] of that id
    /// (before sending, see [`next`](Self::next)) to receive the reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`](crate::Error::ConnectionClosed)
    /// if the engine is closed.
    pub fn send_packet(&self, mut packet: SocketPacket, with_ack: bool) -> Result<Option<u64>> {
        if with_ack {
            packet.ack_id = Some(self.inner.ack_counter.fetch_add(1, Ordering::Relaxed));
        }

        trace!(
            packet_type = %packet.packet_type,
            namespace = %packet.namespace,
            ack_id = ?packet.ack_id,
            "socket send"
        );

        self.inner.engine.send_message(packet.encode())?;
        Ok(packet.ack_id)
    }

    /// Sends an `event` packet carrying `payload` to `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`](crate::Error::ConnectionClosed)
    /// if the engine is closed.
    pub fn send_message(
        &self,
        namespace: &str,
        payload: Value,
        with_ack: bool,
    ) -> Result<Option<u64>> {
        self.send_packet(SocketPacket::event(namespace, payload), with_ack)
    }

    /// Sends a named event: the payload is `[event, data]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`](crate::Error::ConnectionClosed)
    /// if the engine is closed.
    pub fn send_event(
        &self,
        namespace: &str,
        event: &str,
        data: Value,
        with_ack: bool,
    ) -> Result<Option<u64>> {
        self.send_message(namespace, json!([event, data]), with_ack)
    }

    /// Asks the server to connect `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`](crate::Error::ConnectionClosed)
    /// if the engine is closed.
    pub fn connect_namespace(&self, namespace: &str) -> Result<()> {
        let packet = SocketPacket::connect(namespace);
        self.inner
            .sessions
            .lock()
            .entry(packet.namespace.clone())
            .or_default();

        self.send_packet(packet, false).map(|_| ())
    }

    /// Closes the underlying engine. See [`Engine::close`].
    pub async fn close(&self) {
        self.inner.engine.close().await;
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Decodes one socket packet and handles it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`](crate::Error::Decode) for a malformed
    /// packet.
    pub fn handle_packet_text(&self, text: &str) -> Result<()> {
        let packet = SocketPacket::decode(text)?;
        self.receive_packet(packet);
        Ok(())
    }

    /// Auto-acknowledges and dispatches a decoded packet.
    pub fn receive_packet(&self, packet: SocketPacket) {
        trace!(
            packet_type = %packet.packet_type,
            namespace = %packet.namespace,
            ack_id = ?packet.ack_id,
            payload = %packet.payload,
            "socket recv"
        );

        if let Some(ack_id) = packet.ack_id {
            let reply = SocketPacket::ack(packet.namespace.clone(), ack_id, json!([]));
            if let Err(e) = self.send_packet(reply, false) {
                warn!(error = %e, ack_id, "Failed to acknowledge packet");
            }
        }

        let SocketPacket {
            packet_type,
            namespace,
            payload,
            ack_id,
        } = packet;

        match packet_type {
            SocketPacketType::Connect => {
                let sid = payload
                    .get("sid")
                    .and_then(Value::as_str)
                    .map(str::to_owned);

                debug!(%namespace, ?sid, "Namespace connected");
                self.set_session(&namespace, NamespaceState::Connected, sid);
                self.inner
                    .emitter
                    .emit(EVENT_CONNECT, vec![Value::String(namespace)]);
            }

            SocketPacketType::Disconnect => {
                debug!(%namespace, "Namespace disconnected");
                self.set_session(&namespace, NamespaceState::Disconnected, None);
                self.inner
                    .emitter
                    .emit(EVENT_DISCONNECT, vec![Value::String(namespace)]);
            }

            SocketPacketType::Event => {
                self.inner
                    .emitter
                    .emit(EVENT_MESSAGE, vec![Value::String(namespace), payload]);
            }

            SocketPacketType::Ack => {
                let Some(ack_id) = ack_id else {
                    warn!(%namespace, "Ack packet without ack id");
                    return;
                };

                self.inner.emitter.emit(
                    &ack_event(ack_id),
                    vec![Value::String(namespace.clone()), payload.clone()],
                );
                self.inner.emitter.emit(
                    EVENT_ACK,
                    vec![json!(ack_id), Value::String(namespace), payload],
                );
            }

            SocketPacketType::Error
            | SocketPacketType::BinaryEvent
            | SocketPacketType::BinaryAck => {
                debug!(%packet_type, %namespace, "Ignoring packet");
            }
        }
    }

    fn on_engine_open(&self) {
        self.inner
            .sessions
            .lock()
            .entry(DEFAULT_NAMESPACE.to_owned())
            .or_default();

        if let Err(e) = self.send_packet(SocketPacket::connect(DEFAULT_NAMESPACE), false) {
            warn!(error = %e, "Failed to send connect packet");
        }
    }

    /// Updates a namespace session; `sid` is only overwritten when given.
    fn set_session(&self, namespace: &str, state: NamespaceState, sid: Option<String>) {
        let mut sessions = self.inner.sessions.lock();
        let session = sessions.entry(namespace.to_owned()).or_default();
        session.state = state;
        if sid.is_some() {
            session.sid = sid;
        }
    }
}

fn upgrade(weak: &Weak<SocketInner>) -> Option<Socket> {
    weak.upgrade().map(|inner| Socket { inner })
}

// ============================================================================
// Tests
// ============================================================================
