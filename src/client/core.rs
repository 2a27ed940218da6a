//! Client façade over the socket and engine layers.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;
use tracing::{debug, info};

use crate::emitter::{Args, EventEmitter, ListenerId, PendingEvent};
use crate::engine::{Engine, transport};
use crate::error::Result;
use crate::socket::{self, NamespaceSession, Socket};

use super::builder::ClientBuilder;
use super::options::ClientOptions;

// ============================================================================
// Client
// ============================================================================

/// A connected Socket.IO client.
///
/// Owns one [`Socket`] layer over one [`Engine`] layer and one background
/// transport task. Cloning yields another handle to the same connection.
///
/// # Example
///
/// ```no_run
/// use serde_json::json;
/// use socketio_client::{Client, Result, ack_event};
///
/// # async fn example() -> Result<()> {
/// let client = Client::builder("localhost:3000").connect_and_wait().await?;
///
/// client.on("message", |args| println!("message: {args:?}"));
///
/// let reply = client
///     .wait_for_with(&ack_event(1), || {
///         client.send_event("/", "greet", json!("hi"), true).map(|_| ())
///     })
///     .await?;
///
/// client.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    socket: Socket,
    options: ClientOptions,
}

impl Client {
    /// Creates a builder targeting `address` (`host[:port]`).
    #[inline]
    #[must_use]
    pub fn builder(address: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(address)
    }

    /// Opens the connection without waiting for the namespace handshake.
    ///
    /// Listeners registered afterwards may miss the first `connect`; use
    /// [`connect_and_wait`](Self::connect_and_wait) when that matters.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) if the options are invalid
    /// - [`Error::WebSocket`](crate::Error::WebSocket) if the WebSocket
    ///   cannot be opened
    /// - [`Error::Connection`](crate::Error::Connection) if the server
    ///   rejects the upgrade
    pub async fn connect(options: ClientOptions) -> Result<Self> {
        let (client, _) = Self::open(options, false).await?;
        Ok(client)
    }

    /// Opens the connection and waits until the default namespace connects.
    ///
    /// # Errors
    ///
    /// As [`connect`](Self::connect), plus
    /// [`Error::Timeout`](crate::Error::Timeout) or
    /// [`Error::EmitterFinished`](crate::Error::EmitterFinished) if the
    /// namespace does not connect.
    pub async fn connect_and_wait(options: ClientOptions) -> Result<Self> {
        let (client, pending) = Self::open(options, true).await?;

        if let Some(pending) = pending
            && let Err(e) = pending.wait(client.options.wait_timeout).await
        {
            client.close().await;
            return Err(e);
        }

        Ok(client)
    }

    /// Dials the server, wires the layers and starts the transport task.
    ///
    /// The `connect` subscription, when requested, is installed before the
    /// task starts so the first handshake cannot be missed.
    async fn open(options: ClientOptions, wait_connected: bool) -> Result<(Self, Option<PendingEvent>)> {
        let url = options.url()?;
        debug!(%url, "Connecting");

        let ws_stream = transport::connect(&url).await?;

        let (engine, command_rx) =
            Engine::new(EventEmitter::new().with_wait_timeout(options.wait_timeout));
        let socket = Socket::new(
            engine.clone(),
            EventEmitter::new().with_wait_timeout(options.wait_timeout),
        );

        let pending = wait_connected.then(|| socket.next(socket::EVENT_CONNECT));
        engine.start(ws_stream, command_rx);

        info!(address = %options.address, "Client started");

        Ok((Self { socket, options }, pending))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the options the client was built with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Returns the socket layer.
    #[inline]
    #[must_use]
    pub fn socket(&self) -> &Socket {
        &self.socket
    }

    /// Returns the engine layer.
    #[inline]
    #[must_use]
    pub fn engine(&self) -> &Engine {
        self.socket.engine()
    }

    /// Returns `true` if the default namespace is connected.
    #[inline]
    #[must_use]
    pub fn connected(&self) -> bool {
        self.socket.connected()
    }

    /// Returns `true` if `namespace` is connected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self, namespace: &str) -> bool {
        self.socket.is_connected(namespace)
    }

    /// Returns the session id for `namespace`.
    #[inline]
    #[must_use]
    pub fn sid(&self, namespace: &str) -> Option<String> {
        self.socket.sid(namespace)
    }

    /// Returns the session recorded for `namespace`.
    #[inline]
    #[must_use]
    pub fn session(&self, namespace: &str) -> Option<NamespaceSession> {
        self.socket.session(namespace)
    }

    /// Returns `true` unless the connection is fully closed.
    #[inline]
    #[must_use]
    pub fn can_make_progress(&self) -> bool {
        self.socket.can_make_progress()
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// See [`Socket::send_message`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`](crate::Error::ConnectionClosed)
    /// if the connection is closed.
    pub fn send_message(
        &self,
        namespace: &str,
        payload: Value,
        with_ack: bool,
    ) -> Result<Option<u64>> {
        self.socket.send_message(namespace, payload, with_ack)
    }

    /// See [`Socket::send_event`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`](crate::Error::ConnectionClosed)
    /// if the connection is closed.
    pub fn send_event(
        &self,
        namespace: &str,
        event: &str,
        data: Value,
        with_ack: bool,
    ) -> Result<Option<u64>> {
        self.socket.send_event(namespace, event, data, with_ack)
    }

    /// See [`Socket::connect_namespace`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`](crate::Error::ConnectionClosed)
    /// if the connection is closed.
    pub fn connect_namespace(&self, namespace: &str) -> Result<()> {
        self.socket.connect_namespace(namespace)
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// See [`EventEmitter::on`].
    pub fn on<F>(&self, event: &str, callback: F) -> ListenerId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.socket.on(event, callback)
    }

    /// See [`EventEmitter::once`].
    pub fn once<F>(&self, event: &str, callback: F) -> ListenerId
    where
        F: FnOnce(Args) + Send + 'static,
    {
        self.socket.once(event, callback)
    }

    /// See [`EventEmitter::off`].
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.socket.off(event, id)
    }

    /// See [`EventEmitter::next`].
    pub fn next(&self, event: &str) -> PendingEvent {
        self.socket.next(event)
    }

    /// See [`EventEmitter::wait_for`].
    pub async fn wait_for(&self, event: &str) -> Result<Args> {
        self.socket.wait_for(event).await
    }

    /// See [`EventEmitter::wait_for_with`].
    pub async fn wait_for_with<F>(&self, event: &str, action: F) -> Result<Args>
    where
        F: FnOnce() -> Result<()>,
    {
        self.socket.wait_for_with(event, action).await
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Closes the connection and waits for the transport task to end.
    pub async fn close(&self) {
        self.socket.close().await;
        info!(address = %self.options.address, "Client closed");
    }
}

// ============================================================================
// Tests
// ============================================================================
