//! WebSocket transport task.
//!
//! The task owns the socket for the lifetime of the connection. It forwards
//! inbound text frames to the engine and writes the frames the engine queues.
//!
//! # Event Loop
//!
//! - Inbound text frames → [`Engine::handle_frame`]
//! - Queued [`TransportCommand`]s → WebSocket writes / close
//! - Any exit path → [`Engine::transport_closed`]

// ============================================================================
// Imports
// ============================================================================

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::core::{Engine, WeakEngine};

// ============================================================================
// Types
// ============================================================================

/// Client WebSocket stream.
pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Commands queued by the engine for the transport task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransportCommand {
    /// Write one text frame.
    Send(String),
    /// Close the WebSocket and stop the task.
    Close,
}

// ============================================================================
// Connect
// ============================================================================

/// Opens the WebSocket connection.
///
/// # Errors
///
/// - [`Error::Connection`] if the server answers the upgrade with a non-101
///   status
/// - [`Error::WebSocket`] if the connection or handshake fails otherwise
pub(crate) async fn connect(url: &Url) -> Result<WsStream> {
    let (ws_stream, response) = match connect_async(url.as_str()).await {
        Ok(connected) => connected,
        Err(WsError::Http(response)) => {
            return Err(Error::connection(format!(
                "{url} rejected the WebSocket upgrade with status {}",
                response.status()
            )));
        }
        Err(e) => return Err(e.into()),
    };

    info!(%url, status = %response.status(), "WebSocket connection established");

    Ok(ws_stream)
}

// ============================================================================
// Event Loop
// ============================================================================

/// Drives the connection until either side closes it.
///
/// Holds only a weak engine handle: once every [`Engine`] is dropped the
/// command channel closes and the task shuts the socket down.
pub(crate) async fn run(
    ws_stream: WsStream,
    engine: WeakEngine,
    mut command_rx: mpsc::UnboundedReceiver<TransportCommand>,
) {
    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let Some(engine) = engine.upgrade() else {
                            debug!("Engine dropped, closing WebSocket");
                            let _ = ws_write.close().await;
                            break;
                        };

                        if let Err(e) = engine.handle_frame(&text) {
                            error!(error = %e, "Protocol violation, closing connection");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }

                    Some(Ok(Message::Close(_))) => {
                        debug!("WebSocket closed by remote");
                        break;
                    }

                    Some(Err(e)) => {
                        error!(error = %e, "WebSocket error");
                        break;
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }

                    // Binary, Ping, Pong, Frame
                    Some(Ok(_)) => {}
                }
            }

            command = command_rx.recv() => {
                match command {
                    Some(TransportCommand::Send(frame)) => {
                        trace!(frame = %frame, "Writing frame");
                        if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                            warn!(error = %e, "Failed to write frame");
                            break;
                        }
                    }

                    Some(TransportCommand::Close) => {
                        debug!("Close requested");
                        let _ = ws_write.close().await;
                        break;
                    }

                    None => {
                        debug!("Command channel closed");
                        let _ = ws_write.close().await;
                        break;
                    }
                }
            }
        }
    }

    if let Some(engine) = engine.upgrade() {
        engine.transport_closed();
    }

    debug!("Transport task terminated");
}

// ============================================================================
// Helpers
// ============================================================================

impl Engine {
    /// Spawns the transport task for an established connection.
    pub(crate) fn start(
        &self,
        ws_stream: WsStream,
        command_rx: mpsc::UnboundedReceiver<TransportCommand>,
    ) {
        let task = tokio::spawn(run(ws_stream, self.downgrade(), command_rx));
        self.set_task(task);
    }
}
