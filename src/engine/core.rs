//! Engine layer state machine and packet handling.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::emitter::{Args, EventEmitter, ListenerId, PendingEvent};
use crate::error::{Error, Result};

use super::packet::{EngineHandshake, EnginePacket, EnginePacketType};
use super::transport::TransportCommand;

// ============================================================================
// Event Names
// ============================================================================

/// Emitted when the server's `open` packet arrives. Args: `[handshake]`.
pub const EVENT_OPEN: &str = "open";

/// Emitted for every `message` packet. Args: `[data]`.
pub const EVENT_MESSAGE: &str = "message";

/// Emitted once when the connection closes. No args.
pub const EVENT_CLOSE: &str = "close";

// ============================================================================
// EngineState
// ============================================================================

/// Engine connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// WebSocket up, waiting for the server's `open` packet.
    Connecting,
    /// Handshake received.
    Open,
    /// Close requested, transport still running.
    Closing,
    /// Transport gone; nothing more can be sent.
    Closed,
}

// ============================================================================
// Engine
// ============================================================================

/// Transport-framing layer.
///
/// Frames outgoing data as engine packets, answers pings and emits
/// [`EVENT_OPEN`], [`EVENT_MESSAGE`] and [`EVENT_CLOSE`].
///
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    emitter: EventEmitter,
    command_tx: mpsc::UnboundedSender<TransportCommand>,
    state: Mutex<EngineState>,
    handshake: Mutex<Option<EngineHandshake>>,
    close_emitted: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Non-owning engine handle held by the transport task.
#[derive(Clone)]
pub(crate) struct WeakEngine(Weak<EngineInner>);

impl WeakEngine {
    pub(crate) fn upgrade(&self) -> Option<Engine> {
        self.0.upgrade().map(|inner| Engine { inner })
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state())
            .field("emitter", &self.inner.emitter)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine in [`EngineState::Connecting`].
    ///
    /// Returns the receiving end of the outbound queue; hand it to
    /// [`start`](Self::start) together with the WebSocket stream.
    pub(crate) fn new(emitter: EventEmitter) -> (Self, mpsc::UnboundedReceiver<TransportCommand>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let engine = Self {
            inner: Arc::new(EngineInner {
                emitter,
                command_tx,
                state: Mutex::new(EngineState::Connecting),
                handshake: Mutex::new(None),
                close_emitted: AtomicBool::new(false),
                task: Mutex::new(None),
            }),
        };

        (engine, command_rx)
    }

    pub(crate) fn downgrade(&self) -> WeakEngine {
        WeakEngine(Arc::downgrade(&self.inner))
    }

    pub(crate) fn set_task(&self, task: JoinHandle<()>) {
        *self.inner.task.lock() = Some(task);
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.inner.state.lock()
    }

    /// Returns the handshake from the server's `open` packet, if received.
    #[must_use]
    pub fn handshake(&self) -> Option<EngineHandshake> {
        self.inner.handshake.lock().clone()
    }

    /// Returns `true` unless the transport is fully closed.
    #[inline]
    #[must_use]
    pub fn can_make_progress(&self) -> bool {
        self.state() != EngineState::Closed
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Returns the engine's emitter.
    #[inline]
    #[must_use]
    pub fn emitter(&self) -> &EventEmitter {
        &self.inner.emitter
    }

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

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Queues a packet for the transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the engine is closed or the
    /// transport task is gone.
    pub fn send_packet(&self, packet: &EnginePacket) -> Result<()> {
        if !self.can_make_progress() {
            return Err(Error::ConnectionClosed);
        }

        trace!(packet_type = %packet.packet_type, data = %packet.data, "engine send");

        self.inner
            .command_tx
            .send(TransportCommand::Send(packet.encode()))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Wraps `data` in a `message` packet and sends it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the engine is closed.
    pub fn send_message(&self, data: impl Into<String>) -> Result<()> {
        self.send_packet(&EnginePacket::message(data))
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Decodes one wire frame and handles it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] for a malformed frame. The caller must treat
    /// this as fatal for the connection.
    pub fn handle_frame(&self, text: &str) -> Result<()> {
        let packet = EnginePacket::decode(text)?;
        self.receive_packet(packet);
        Ok(())
    }

    /// Reacts to a decoded packet.
    pub fn receive_packet(&self, packet: EnginePacket) {
        trace!(packet_type = %packet.packet_type, data = %packet.data, "engine recv");

        match packet.packet_type {
            EnginePacketType::Open => {
                match EngineHandshake::parse(&packet.data) {
                    Ok(handshake) => {
                        debug!(sid = %handshake.sid, ping_interval = handshake.ping_interval, "Engine open");
                        *self.inner.handshake.lock() = Some(handshake);
                    }
                    Err(e) => warn!(error = %e, "Unparseable handshake in open packet"),
                }

                {
                    let mut state = self.inner.state.lock();
                    if *state == EngineState::Connecting {
                        *state = EngineState::Open;
                    }
                }

                self.inner
                    .emitter
                    .emit(EVENT_OPEN, vec![Value::String(packet.data)]);
            }

            EnginePacketType::Close => {
                debug!("Close packet received");
                self.set_state(EngineState::Closing);
                self.emit_close();
                self.request_transport_close();
            }

            EnginePacketType::Ping => {
                if let Err(e) = self.send_packet(&EnginePacket::control(EnginePacketType::Pong)) {
                    warn!(error = %e, "Failed to answer ping");
                }
            }

            EnginePacketType::Message => {
                self.inner
                    .emitter
                    .emit(EVENT_MESSAGE, vec![Value::String(packet.data)]);
            }

            EnginePacketType::Pong | EnginePacketType::Upgrade | EnginePacketType::Noop => {}
        }
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Closes the connection and waits for the transport task to finish.
    ///
    /// Sends a `close` packet first when the engine is still usable. Has no
    /// timeout: if the remote never lets the socket close, this waits.
    pub async fn close(&self) {
        if self.can_make_progress() {
            if let Err(e) = self.send_packet(&EnginePacket::control(EnginePacketType::Close)) {
                debug!(error = %e, "Failed to send close packet");
            }
            self.set_state(EngineState::Closing);
            self.request_transport_close();
        }

        let task = self.inner.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Transport task failed");
        }

        self.transport_closed();
    }

    /// Drops the connection without a `close` packet.
    ///
    /// Used when the upper layer hits a protocol violation.
    pub(crate) fn abort(&self) {
        if self.can_make_progress() {
            self.set_state(EngineState::Closing);
        }
        self.request_transport_close();
    }

    /// Asks the transport task to close the socket.
    ///
    /// Returns `false` if the task is already gone.
    fn request_transport_close(&self) -> bool {
        match self.inner.command_tx.send(TransportCommand::Close) {
            Ok(()) => true,
            Err(_) => {
                debug!("Transport already gone, close request dropped");
                false
            }
        }
    }

    /// Marks the engine closed, emits `close` if not yet emitted and
    /// finishes the emitter.
    pub(crate) fn transport_closed(&self) {
        if self.state() != EngineState::Closed {
            debug!("Engine closed");
        }

        self.set_state(EngineState::Closed);
        self.emit_close();
        self.inner.emitter.finish();
    }

    fn emit_close(&self) {
        if !self.inner.close_emitted.swap(true, Ordering::SeqCst) {
            self.inner.emitter.emit(EVENT_CLOSE, vec![]);
        }
    }

    fn set_state(&self, state: EngineState) {
        *self.inner.state.lock() = state;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use tokio::sync::mpsc::error::TryRecvError;

    fn detached() -> (Engine, mpsc::UnboundedReceiver<TransportCommand>) {
        Engine::new(EventEmitter::new().with_wait_timeout(Duration::from_millis(100)))
    }

    #[test]
    fn test_ping_answered_with_single_pong() {
        let (engine, mut rx) = detached();

        engine.handle_frame("2").expect("ping");

        assert_eq!(rx.try_recv(), Ok(TransportCommand::Send("3".to_owned())));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn test_open_records_handshake_and_emits() {
        let (engine, _rx) = detached();
        let opened = Arc::new(AtomicUsize::new(0));

        let o = Arc::clone(&opened);
        engine.on(EVENT_OPEN, move |_| {
            o.fetch_add(1, Ordering::SeqCst);
        });

        engine
            .handle_frame(r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#)
            .expect("open");

        assert_eq!(engine.state(), EngineState::Open);
        assert_eq!(engine.handshake().map(|h| h.sid), Some("abc".to_owned()));
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_message_emits_data() {
        let (engine, _rx) = detached();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = Arc::clone(&seen);
        engine.on(EVENT_MESSAGE, move |args| s.lock().extend(args.iter().cloned()));
        engine.handle_frame("42[\"hi\"]").expect("message");

        assert_eq!(*seen.lock(), vec![Value::String("2[\"hi\"]".to_owned())]);
    }

    #[test]
    fn test_close_packet_emits_once_and_closes_transport() {
        let (engine, mut rx) = detached();
        let closes = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&closes);
        engine.on(EVENT_CLOSE, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        engine.handle_frame("1").expect("close");
        assert_eq!(engine.state(), EngineState::Closing);
        assert_eq!(rx.try_recv(), Ok(TransportCommand::Close));

        engine.transport_closed();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(!engine.can_make_progress());
    }

    #[test]
    fn test_ignored_packets_have_no_effect() {
        let (engine, mut rx) = detached();

        for frame in ["3", "5", "6"] {
            engine.handle_frame(frame).expect("ignored packet");
        }

        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(engine.state(), EngineState::Connecting);
    }

    #[test]
    fn test_malformed_frame_is_decode_error() {
        let (engine, _rx) = detached();
        assert!(engine.handle_frame("x").unwrap_err().is_decode_error());
    }

    #[test]
    fn test_send_after_close_fails() {
        let (engine, _rx) = detached();
        engine.transport_closed();

        let err = engine.send_message("2[]").unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_close_with_dead_transport_still_finishes() {
        let (engine, rx) = detached();
        drop(rx);

        assert!(!engine.request_transport_close());

        engine.close().await;
        assert_eq!(engine.state(), EngineState::Closed);
        assert!(engine.emitter().is_finished());
    }

    #[tokio::test]
    async fn test_close_sends_close_packet_and_finishes_emitter() {
        let (engine, mut rx) = detached();
        let pending = engine.next(EVENT_MESSAGE);

        engine.close().await;

        assert_eq!(rx.try_recv(), Ok(TransportCommand::Send("1".to_owned())));
        assert_eq!(rx.try_recv(), Ok(TransportCommand::Close));
        assert_eq!(engine.state(), EngineState::Closed);

        let err = pending.wait(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::EmitterFinished { .. }));
    }
}
