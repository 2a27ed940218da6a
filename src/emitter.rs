//! Event emitter shared by the protocol layers.
//!
//! Every layer owns one [`EventEmitter`] and exposes `on`/`once`/`off`/
//! `wait_for` by delegation. Listeners run synchronously on whichever task
//! calls [`EventEmitter::emit`], which in practice is the transport task.
//!
//! # Waiting
//!
//! [`EventEmitter::next`] installs a one-shot subscription immediately and
//! returns a [`PendingEvent`] that can be awaited later. Install first, act,
//! then wait:
//!
//! ```ignore
//! let pending = emitter.next("ack_1");
//! socket.send_message("/", payload, true)?;
//! let args = pending.wait(Duration::from_secs(5)).await?;
//! ```
//!
//! [`EventEmitter::wait_for_with`] bundles the same three steps.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::trace;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default time [`EventEmitter::wait_for`] waits before failing.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Types
// ============================================================================

/// Arguments passed with an emission.
///
/// An empty vector is a valid emission.
pub type Args = Vec<Value>;

/// Persistent listener callback.
type Callback = Arc<dyn Fn(&Args) + Send + Sync>;

/// One-shot listener callback.
type OnceCallback = Box<dyn FnOnce(Args) + Send>;

/// Handle identifying a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

enum Listener {
    Persistent(Callback),
    Once(OnceCallback),
}

struct Entry {
    id: ListenerId,
    listener: Listener,
}

/// Listener to run for one emission, detached from the registry.
enum Invocation {
    Persistent(Callback),
    Once(OnceCallback),
}

#[derive(Default)]
struct Registry {
    listeners: FxHashMap<String, Vec<Entry>>,
    next_id: u64,
    finished: bool,
}

// ============================================================================
// EventEmitter
// ============================================================================

/// Publish/subscribe keyed by event name.
///
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Clone)]
pub struct EventEmitter {
    registry: Arc<Mutex<Registry>>,
    wait_timeout: Duration,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("EventEmitter")
            .field("events", &registry.listeners.len())
            .field("finished", &registry.finished)
            .field("wait_timeout", &self.wait_timeout)
            .finish()
    }
}

impl EventEmitter {
    /// Creates an emitter with the default wait timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    /// Sets the timeout used by [`wait_for`](Self::wait_for).
    #[inline]
    #[must_use]
    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    /// Returns the timeout used by [`wait_for`](Self::wait_for).
    #[inline]
    #[must_use]
    pub const fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// Registers `callback` for every emission of `event`.
    pub fn on<F>(&self, event: &str, callback: F) -> ListenerId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.register(event, Listener::Persistent(Arc::new(callback)))
    }

    /// Registers `callback` for the next emission of `event` only.
    pub fn once<F>(&self, event: &str, callback: F) -> ListenerId
    where
        F: FnOnce(Args) + Send + 'static,
    {
        self.register(event, Listener::Once(Box::new(callback)))
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut registry = self.registry.lock();
        let Some(entries) = registry.listeners.get_mut(event) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;

        if entries.is_empty() {
            registry.listeners.remove(event);
        }

        removed
    }

    /// Returns the number of listeners registered for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.registry
            .lock()
            .listeners
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Invokes the listeners registered for `event`, in registration order.
    ///
    /// The listener list is snapshotted before the first call, so listeners
    /// may subscribe, unsubscribe or emit without affecting this emission.
    /// One-shot listeners leave the registry before they run.
    ///
    /// Returns the number of listeners invoked.
    pub fn emit(&self, event: &str, args: Args) -> usize {
        let snapshot = self.snapshot(event);
        let count = snapshot.len();

        trace!(event, listeners = count, "Emitting event");

        for invocation in snapshot {
            match invocation {
                Invocation::Persistent(callback) => callback(&args),
                Invocation::Once(callback) => callback(args.clone()),
            }
        }

        count
    }

    /// Installs a one-shot subscription to `event` and returns a handle to
    /// await it.
    ///
    /// On a finished emitter the handle fails immediately with
    /// [`Error::EmitterFinished`].
    pub fn next(&self, event: &str) -> PendingEvent {
        let (tx, rx) = oneshot::channel();
        let id = self.once(event, move |args| {
            let _ = tx.send(args);
        });

        PendingEvent {
            event: event.to_owned(),
            id,
            rx,
            emitter: self.clone(),
        }
    }

    /// Waits for the next emission of `event` using the emitter's timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if the event does not fire in time
    /// - [`Error::EmitterFinished`] if the emitter finishes first
    pub async fn wait_for(&self, event: &str) -> Result<Args> {
        self.next(event).wait(self.wait_timeout).await
    }

    /// Subscribes to `event`, runs `action`, then waits for the event.
    ///
    /// The subscription exists before `action` runs, so an emission caused
    /// by the action is never missed.
    ///
    /// # Errors
    ///
    /// - Any error returned by `action`
    /// - [`Error::Timeout`] if the event does not fire in time
    /// - [`Error::EmitterFinished`] if the emitter finishes first
    pub async fn wait_for_with<F>(&self, event: &str, action: F) -> Result<Args>
    where
        F: FnOnce() -> Result<()>,
    {
        let pending = self.next(event);

        if let Err(e) = action() {
            pending.cancel();
            return Err(e);
        }

        pending.wait(self.wait_timeout).await
    }

    /// Marks the emitter finished and drops every listener.
    ///
    /// Pending waits fail with [`Error::EmitterFinished`]; listeners
    /// registered afterwards are discarded.
    pub fn finish(&self) {
        let dropped = {
            let mut registry = self.registry.lock();
            registry.finished = true;
            std::mem::take(&mut registry.listeners)
        };

        trace!(events = dropped.len(), "Emitter finished");
        drop(dropped);
    }

    /// Returns `true` once [`finish`](Self::finish) has been called.
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.registry.lock().finished
    }

    fn register(&self, event: &str, listener: Listener) -> ListenerId {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = ListenerId(registry.next_id);

        if !registry.finished {
            registry
                .listeners
                .entry(event.to_owned())
                .or_default()
                .push(Entry { id, listener });
        }

        id
    }

    fn snapshot(&self, event: &str) -> Vec<Invocation> {
        let mut registry = self.registry.lock();
        let Some(entries) = registry.listeners.get_mut(event) else {
            return Vec::new();
        };

        let mut snapshot = Vec::with_capacity(entries.len());
        let mut kept = Vec::with_capacity(entries.len());

        for entry in entries.drain(..) {
            match entry.listener {
                Listener::Persistent(callback) => {
                    snapshot.push(Invocation::Persistent(Arc::clone(&callback)));
                    kept.push(Entry {
                        id: entry.id,
                        listener: Listener::Persistent(callback),
                    });
                }
                Listener::Once(callback) => snapshot.push(Invocation::Once(callback)),
            }
        }

        if kept.is_empty() {
            registry.listeners.remove(event);
        } else {
            *entries = kept;
        }

        snapshot
    }
}

// ============================================================================
// PendingEvent
// ============================================================================

/// A one-shot subscription waiting to be awaited.
///
/// Created by [`EventEmitter::next`].
pub struct PendingEvent {
    event: String,
    id: ListenerId,
    rx: oneshot::Receiver<Args>,
    emitter: EventEmitter,
}

impl fmt::Debug for PendingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingEvent")
            .field("event", &self.event)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl PendingEvent {
    /// Returns the awaited event name.
    #[inline]
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Waits for the emission, up to `wait_timeout`.
    ///
    /// On timeout the subscription is removed.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if the event does not fire in time
    /// - [`Error::EmitterFinished`] if the emitter finishes first
    pub async fn wait(self, wait_timeout: Duration) -> Result<Args> {
        let Self {
            event,
            id,
            rx,
            emitter,
        } = self;

        match timeout(wait_timeout, rx).await {
            Ok(Ok(args)) => Ok(args),
            Ok(Err(_)) => Err(Error::emitter_finished(event)),
            Err(_) => {
                emitter.off(&event, id);
                let timeout_ms = u64::try_from(wait_timeout.as_millis()).unwrap_or(u64::MAX);
                Err(Error::timeout(event, timeout_ms))
            }
        }
    }

    /// Drops the subscription without waiting.
    pub fn cancel(self) {
        self.emitter.off(&self.event, self.id);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    const SHORT: Duration = Duration::from_millis(50);

    #[test]
    fn test_listeners_run_in_registration_order() {
        let emitter = EventEmitter::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let a = Arc::clone(&calls);
        emitter.on("tick", move |_| a.lock().push("A"));
        let b = Arc::clone(&calls);
        emitter.on("tick", move |_| b.lock().push("B"));

        assert_eq!(emitter.emit("tick", vec![]), 2);
        assert_eq!(*calls.lock(), vec!["A", "B"]);
    }

    #[test]
    fn test_once_fires_once() {
        let emitter = EventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        emitter.once("tick", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit("tick", vec![]);
        emitter.emit("tick", vec![]);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count("tick"), 0);
    }

    #[test]
    fn test_once_survives_recursive_emit() {
        let emitter = EventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        let inner = emitter.clone();
        emitter.once("tick", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            inner.emit("tick", vec![]);
        });

        emitter.emit("tick", vec![]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_added_during_emit_waits_for_next_emission() {
        let emitter = EventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));

        let inner = emitter.clone();
        let c = Arc::clone(&count);
        emitter.once("tick", move |_| {
            let c = Arc::clone(&c);
            inner.on("tick", move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            });
        });

        emitter.emit("tick", vec![]);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        emitter.emit("tick", vec![]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_removed_during_emit_still_receives_that_emission() {
        let emitter = EventEmitter::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let victim = Arc::new(Mutex::new(None));

        let inner = emitter.clone();
        let v = Arc::clone(&victim);
        let a = Arc::clone(&calls);
        emitter.on("tick", move |_| {
            a.lock().push("A");
            if let Some(id) = v.lock().take() {
                assert!(inner.off("tick", id));
            }
        });

        let b = Arc::clone(&calls);
        let id = emitter.on("tick", move |_| b.lock().push("B"));
        *victim.lock() = Some(id);

        assert_eq!(emitter.emit("tick", vec![]), 2);
        assert_eq!(*calls.lock(), vec!["A", "B"]);

        assert_eq!(emitter.emit("tick", vec![]), 1);
        assert_eq!(*calls.lock(), vec!["A", "B", "A"]);
        assert_eq!(emitter.listener_count("tick"), 1);
    }

    #[test]
    fn test_off_removes_listener() {
        let emitter = EventEmitter::new();
        let id = emitter.on("tick", |_| {});

        assert!(emitter.off("tick", id));
        assert!(!emitter.off("tick", id));
        assert_eq!(emitter.emit("tick", vec![]), 0);
    }

    #[test]
    fn test_listener_receives_args() {
        let emitter = EventEmitter::new();
        let seen = Arc::new(Mutex::new(None));

        let s = Arc::clone(&seen);
        emitter.on("message", move |args| *s.lock() = Some(args.clone()));
        emitter.emit("message", vec![json!("/"), json!(["hi"])]);

        assert_eq!(*seen.lock(), Some(vec![json!("/"), json!(["hi"])]));
    }

    #[tokio::test]
    async fn test_wait_for_returns_args_from_other_task() {
        let emitter = EventEmitter::new();
        let pending = emitter.next("open");

        let remote = emitter.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            remote.emit("open", vec![json!(1)]);
        });

        let args = pending.wait(Duration::from_secs(1)).await.expect("event");
        assert_eq!(args, vec![json!(1)]);
    }

    #[tokio::test]
    async fn test_empty_emission_is_not_a_timeout() {
        let emitter = EventEmitter::new().with_wait_timeout(Duration::from_secs(1));

        let args = emitter
            .wait_for_with("open", || {
                emitter.emit("open", vec![]);
                Ok(())
            })
            .await
            .expect("emission");

        assert!(args.is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_times_out_and_unsubscribes() {
        let emitter = EventEmitter::new().with_wait_timeout(SHORT);

        let err = emitter.wait_for("never").await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(emitter.listener_count("never"), 0);
    }

    #[tokio::test]
    async fn test_wait_for_with_action_error_unsubscribes() {
        let emitter = EventEmitter::new().with_wait_timeout(SHORT);

        let err = emitter
            .wait_for_with("ack_1", || Err(Error::ConnectionClosed))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ConnectionClosed));
        assert_eq!(emitter.listener_count("ack_1"), 0);
    }

    #[tokio::test]
    async fn test_finish_fails_pending_waits() {
        let emitter = EventEmitter::new();
        let pending = emitter.next("ack_3");

        emitter.finish();

        let err = pending.wait(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::EmitterFinished { ref event } if event == "ack_3"));
    }

    #[tokio::test]
    async fn test_wait_on_finished_emitter_fails_fast() {
        let emitter = EventEmitter::new().with_wait_timeout(Duration::from_secs(30));
        emitter.finish();

        let err = emitter.wait_for("connect").await.unwrap_err();

        assert!(matches!(err, Error::EmitterFinished { .. }));
        assert!(emitter.is_finished());
    }
}
