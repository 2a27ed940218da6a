//! Socket.IO client - async Engine.IO / Socket.IO protocol client.
//!
//! Connects to a Socket.IO server over a single WebSocket, keeps the
//! Engine.IO transport alive and exposes namespaces, events and
//! acknowledgments through an event emitter.
//!
//! # Architecture
//!
//! The client is split in two layers that talk through events:
//!
//! - **Engine**: transport framing. Answers pings, emits `open`,
//!   `message` and `close`.
//! - **Socket**: multiplexing. Sends namespace `connect`, assigns ack ids,
//!   auto-acknowledges inbound packets and emits `connect`, `disconnect`,
//!   `message`, `ack`, `ack_<id>` and `close`.
//!
//! Key design principles:
//!
//! - One background task per connection owns the WebSocket
//! - Layers hold each other through weak handles (no reference cycles)
//! - Waiting is event-driven (no polling)
//! - A malformed packet is fatal for the connection
//!
//! # Quick Start
//!
//! ```no_run
//! use serde_json::json;
//! use socketio_client::{Client, Result, ack_event};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder("localhost:3000").connect_and_wait().await?;
//!
//!     client.on("message", |args| println!("message: {args:?}"));
//!
//!     let reply = client
//!         .wait_for_with(&ack_event(1), || {
//!             client.send_message("/", json!(["hello"]), true).map(|_| ())
//!         })
//!         .await?;
//!     println!("ack: {reply:?}");
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Client`], [`ClientBuilder`] and [`ClientOptions`] |
//! | [`emitter`] | [`EventEmitter`] with awaitable events |
//! | [`engine`] | Engine layer: [`Engine`] and its packet codec |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`socket`] | Socket layer: [`Socket`] and its packet codec |

// ============================================================================
// Modules
// ============================================================================

/// Client entry point and configuration.
///
/// Use [`Client::builder()`] to configure and connect.
pub mod client;

/// Event emitter with listeners and awaitable events.
pub mod emitter;

/// Engine layer: transport framing over a WebSocket.
pub mod engine;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Socket layer: namespaces, acknowledgments and event dispatch.
pub mod socket;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ClientBuilder, ClientOptions};

// Emitter types
pub use emitter::{Args, EventEmitter, ListenerId, PendingEvent};

// Engine types
pub use engine::{Engine, EngineHandshake, EnginePacket, EnginePacketType, EngineState};

// Error types
pub use error::{Error, Result};

// Socket types
pub use socket::{
    NamespaceSession, NamespaceState, Socket, SocketPacket, SocketPacketType, ack_event,
};
