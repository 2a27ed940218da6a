//! Error types for the Socket.IO client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use socketio_client::{Client, Result};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     let ack_id = client.send_message("/", json!(["ping"]), true)?;
//!     client.wait_for(&format!("ack_{}", ack_id.unwrap_or_default())).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::Url`] |
//! | Protocol | [`Error::Decode`] |
//! | Waiting | [`Error::Timeout`], [`Error::EmitterFinished`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::WebSocket`] |
//! | External | [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Connection URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed or unrecognized packet.
    ///
    /// A decode failure is a fatal protocol violation for the connection
    /// that produced it.
    #[error("Decode error: {message} (packet: {packet:?})")]
    Decode {
        /// What was wrong with the packet.
        message: String,
        /// The offending wire text.
        packet: String,
    },

    // ========================================================================
    // Waiting Errors
    // ========================================================================
    /// An awaited event did not fire in time.
    ///
    /// Recoverable: the caller may wait again.
    #[error("Timeout after {timeout_ms}ms waiting for event '{event}'")]
    Timeout {
        /// Event that was awaited.
        event: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The emitter can make no further progress.
    ///
    /// Returned to waiters when the underlying connection is permanently
    /// closed before the awaited event fired.
    #[error("Emitter finished while waiting for event '{event}'")]
    EmitterFinished {
        /// Event that was awaited.
        event: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Server refused the WebSocket upgrade.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection is closed; nothing more can be sent.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket connect or handshake error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a decode error for the given wire text.
    #[inline]
    pub fn decode(message: impl Into<String>, packet: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
            packet: packet.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(event: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            event: event.into(),
            timeout_ms,
        }
    }

    /// Creates an emitter finished error.
    #[inline]
    pub fn emitter_finished(event: impl Into<String>) -> Self {
        Self::EmitterFinished {
            event: event.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if this is a packet decode error.
    #[inline]
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::EmitterFinished { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Only timeouts are; everything else means the connection is unusable
    /// or the input was invalid.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_websocket_error_from_tungstenite() {
        let err: Error = WsError::ConnectionClosed.into();
        assert!(matches!(err, Error::WebSocket(_)));
        assert!(err.is_connection_error());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_decode_display_includes_packet() {
        let err = Error::decode("unknown packet type '9'", "9abc");
        assert_eq!(
            err.to_string(),
            "Decode error: unknown packet type '9' (packet: \"9abc\")"
        );
        assert!(err.is_decode_error());
    }

    #[test]
    fn test_timeout_is_recoverable() {
        let err = Error::timeout("connect", 5000);
        assert!(err.is_timeout());
        assert!(err.is_recoverable());
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_emitter_finished_is_not_timeout() {
        let err = Error::emitter_finished("ack_1");
        assert!(!err.is_timeout());
        assert!(!err.is_recoverable());
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("address is empty");
        assert_eq!(err.to_string(), "Configuration error: address is empty");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_from_url_error() {
        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: Error = url_err.into();
        assert!(matches!(err, Error::Url(_)));
    }
}
