//! Client entry point.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Connected client over socket and engine layers |
//! | [`ClientBuilder`] | Fluent configuration builder |
//! | [`ClientOptions`] | Address, path and wait timeout |
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use socketio_client::{Client, Result};
//!
//! # async fn example() -> Result<()> {
//! let client = Client::builder("localhost:3000").connect_and_wait().await?;
//! client.send_event("/", "hello", json!({"from": "rust"}), false)?;
//! client.close().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for client configuration.
pub mod builder;

/// Core client implementation.
pub mod core;

/// Connection options and URL construction.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use core::Client;
pub use options::{ClientOptions, DEFAULT_PATH};
