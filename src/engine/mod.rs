//! Engine layer: transport framing over a WebSocket.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Engine (Rust)  │         WebSocket            │  Server         │
//! │                 │◄────────────────────────────►│                 │
//! │  transport task │  /socket.io/?EIO=4&...       │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `transport::connect` - Open the WebSocket
//! 2. `Engine::start` - Spawn the transport task
//! 3. Server sends `open`; engine state becomes [`EngineState::Open`]
//! 4. Pings are answered with pongs; `message` packets are emitted
//! 5. [`Engine::close`] - Send `close`, close the socket, join the task
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | State machine and packet handling |
//! | `packet` | Engine packet codec |
//! | `transport` | WebSocket connection and event loop |

// ============================================================================
// Submodules
// ============================================================================

/// State machine and packet handling.
pub mod core;

/// Engine packet codec.
pub mod packet;

/// WebSocket connection and event loop.
pub(crate) mod transport;

// ============================================================================
// Re-exports
// ============================================================================

pub use core::{EVENT_CLOSE, EVENT_MESSAGE, EVENT_OPEN, Engine, EngineState};
pub use packet::{EngineHandshake, EnginePacket, EnginePacketType};
