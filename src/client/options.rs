//! Client connection options.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use socketio_client::ClientOptions;
//!
//! let options = ClientOptions::new("localhost:3000")
//!     .with_path("/realtime/")
//!     .with_wait_timeout(Duration::from_secs(10));
//!
//! let url = options.url()?;
//! // ws://localhost:3000/realtime/?EIO=4&transport=websocket
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::emitter::DEFAULT_WAIT_TIMEOUT;
use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default server path.
pub const DEFAULT_PATH: &str = "/socket.io/";

/// Engine protocol version sent in the `EIO` query parameter.
pub const ENGINE_PROTOCOL_VERSION: &str = "4";

/// Transport name sent in the `transport` query parameter.
pub const TRANSPORT_NAME: &str = "websocket";

// ============================================================================
// ClientOptions
// ============================================================================

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Server address as `host[:port]`.
    pub address: String,

    /// Server path; must start and conventionally end with `/`.
    pub path: String,

    /// Default timeout for `wait_for` calls.
    pub wait_timeout: Duration,
}

impl ClientOptions {
    /// Creates options for `address` with default path and timeout.
    #[inline]
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            path: DEFAULT_PATH.to_owned(),
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    /// Sets the server path.
    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the default wait timeout.
    #[inline]
    #[must_use]
    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    /// Checks the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the address is empty or carries a
    /// scheme, the path does not start with `/`, or the timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(Error::config(
                "Server address is required.\n\
                 Example: Client::builder(\"localhost:3000\")",
            ));
        }

        if self.address.contains("://") {
            return Err(Error::config(format!(
                "Server address must be host[:port] without a scheme, got '{}'",
                self.address
            )));
        }

        if !self.path.starts_with('/') {
            return Err(Error::config(format!(
                "Server path must start with '/', got '{}'",
                self.path
            )));
        }

        if self.wait_timeout.is_zero() {
            return Err(Error::config("Wait timeout must be greater than zero"));
        }

        Ok(())
    }

    /// Builds the WebSocket URL.
    ///
    /// Format: `ws://{address}{path}?EIO=4&transport=websocket`
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the options are invalid
    /// - [`Error::Url`] if the address does not form a valid URL
    pub fn url(&self) -> Result<Url> {
        self.validate()?;

        let mut url = Url::parse(&format!("ws://{}{}", self.address, self.path))?;
        url.query_pairs_mut()
            .append_pair("EIO", ENGINE_PROTOCOL_VERSION)
            .append_pair("transport", TRANSPORT_NAME);

        Ok(url)
    }
}

// ============================================================================
// Tests
// ============================================================================
