//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and connecting a [`Client`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use socketio_client::Client;
//!
//! # async fn example() -> socketio_client::Result<()> {
//! let client = Client::builder("localhost:3000")
//!     .wait_timeout(Duration::from_secs(10))
//!     .connect_and_wait()
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::Result;

use super::core::Client;
use super::options::ClientOptions;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`].
///
/// Use [`Client::builder()`] to create a new builder.
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    options: ClientOptions,
}

impl ClientBuilder {
    /// Creates a builder targeting `address` (`host[:port]`).
    #[inline]
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            options: ClientOptions::new(address),
        }
    }

    /// Sets the server path (default `/socket.io/`).
    #[inline]
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.options.path = path.into();
        self
    }

    /// Sets the timeout used by `wait_for` calls (default 5s).
    #[inline]
    #[must_use]
    pub fn wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.options.wait_timeout = wait_timeout;
        self
    }

    /// Validates and returns the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the options are
    /// invalid.
    pub fn build(self) -> Result<ClientOptions> {
        self.options.validate()?;
        Ok(self.options)
    }

    /// Opens the connection without waiting for the namespace handshake.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) if the options are invalid
    /// - [`Error::WebSocket`](crate::Error::WebSocket) if the WebSocket
    ///   cannot be opened
    /// - [`Error::Connection`](crate::Error::Connection) if the server
    ///   rejects the upgrade
    pub async fn connect(self) -> Result<Client> {
        Client::connect(self.build()?).await
    }

    /// Opens the connection and waits until the default namespace connects.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) if the options are invalid
    /// - [`Error::WebSocket`](crate::Error::WebSocket) if the WebSocket
    ///   cannot be opened
    /// - [`Error::Connection`](crate::Error::Connection) if the server
    ///   rejects the upgrade
    /// - [`Error::Timeout`](crate::Error::Timeout) if `connect` does not
    ///   arrive in time
    /// - [`Error::EmitterFinished`](crate::Error::EmitterFinished) if the
    ///   connection closes first
    pub async fn connect_and_wait(self) -> Result<Client> {
        Client::connect_and_wait(self.build()?).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::Error;

    #[test]
    fn test_builder_sets_options() {
        let options = ClientBuilder::new("localhost:3000")
            .path("/rt/")
            .wait_timeout(Duration::from_millis(250))
            .build()
            .expect("valid options");

        assert_eq!(options.address, "localhost:3000");
        assert_eq!(options.path, "/rt/");
        assert_eq!(options.wait_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_builder_rejects_invalid_options() {
        let err = ClientBuilder::new("").build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_options_before_dialing() {
        let err = ClientBuilder::new("localhost:3000")
            .path("no-slash")
            .connect()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
