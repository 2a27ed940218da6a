//! Socket layer: namespace multiplexing and acknowledgments.
//!
//! # Events
//!
//! | Event | Args |
//! |-------|------|
//! | `connect` | `[namespace]` |
//! | `disconnect` | `[namespace]` |
//! | `message` | `[namespace, payload]` |
//! | `ack` | `[ack_id, namespace, payload]` |
//! | `ack_<id>` | `[namespace, payload]` |
//! | `close` | none |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | Socket state machine and dispatch |
//! | `packet` | Socket packet codec |

// ============================================================================
// Submodules
// ============================================================================

/// Socket state machine and dispatch.
pub mod core;

/// Socket packet codec.
pub mod packet;

// ============================================================================
// Re-exports
// ============================================================================

pub use core::{
    EVENT_ACK, EVENT_CLOSE, EVENT_CONNECT, EVENT_DISCONNECT, EVENT_MESSAGE, NamespaceSession,
    NamespaceState, Socket, ack_event,
};
pub use packet::{DEFAULT_NAMESPACE, SocketPacket, SocketPacketType};
