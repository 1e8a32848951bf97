//! Connection handler module
//!
//! Handles the lifecycle of a WebSocket client:
//! - WebSocket handshake
//! - Registration with the world task
//! - Reading JSON command frames and forwarding them to the world
//! - Writing flushed batches back as one JSON array per frame
//! - Disconnection, including on server shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, trace, warn};

use crate::error::{NetworkError, ProtocolError, Result, RustquestError};
use crate::game::entity::EntityId;
use crate::protocol::{encode_batch, ClientMessage};
use crate::state::AppState;

/// Connection handler for WebSocket clients
pub struct ConnectionHandler {
    /// Shared application state
    state: Arc<AppState>,
}

impl ConnectionHandler {
    /// Create a new connection handler
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Handle a WebSocket connection
    pub async fn handle_websocket(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!(address = %addr, "Handling WebSocket connection");

        // Set TCP options before upgrade
        stream.set_nodelay(true)?;

        // Perform WebSocket handshake
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| RustquestError::Network(NetworkError::WebSocket(e.to_string())))?;

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let player = self.state.world.connect(outbound_tx).await?;
        info!(
            address = %addr,
            player = player,
            world = self.state.config.world_id,
            "WebSocket connection established"
        );
        let mut shutdown_rx = self.state.shutdown_tx.subscribe();

        let (mut sink, mut source) = ws_stream.split();

        let writer = async {
            while let Some(batch) = outbound_rx.recv().await {
                let text = encode_batch(&batch)?;
                sink.send(WsMessage::Text(text))
                    .await
                    .map_err(|e| NetworkError::WebSocket(e.to_string()))?;
            }
            // The world dropped our sender
            Err::<(), RustquestError>(NetworkError::WorldUnavailable.into())
        };

        let reader = async {
            while let Some(frame) = source.next().await {
                let frame = frame.map_err(|e| NetworkError::WebSocket(e.to_string()))?;
                self.handle_frame(player, frame).await?;
            }
            Err::<(), RustquestError>(NetworkError::ConnectionClosed.into())
        };

        let result = tokio::select! {
            r = writer => r,
            r = reader => r,
            _ = shutdown_rx.recv() => {
                debug!(player = player, "Server shutting down, closing connection");
                Ok(())
            }
        };

        self.state.world.disconnect(player).await;

        match result {
            Err(RustquestError::Network(NetworkError::ConnectionClosed)) => {
                debug!(player = player, "Connection closed");
                Ok(())
            }
            other => other,
        }
    }

    /// Route one inbound frame
    async fn handle_frame(&self, player: EntityId, frame: WsMessage) -> Result<()> {
        match frame {
            WsMessage::Text(text) => {
                trace!(player = player, size = text.len(), "Received frame");
                match ClientMessage::parse(&text) {
                    Ok(message) => self.state.world.send(player, message).await?,
                    Err(e) => warn!(player = player, error = %e, "Ignoring malformed message"),
                }
                Ok(())
            }
            WsMessage::Binary(_) => Err(ProtocolError::UnexpectedBinary.into()),
            WsMessage::Close(_) => Err(NetworkError::ConnectionClosed.into()),
            // Ping/pong are answered by tungstenite
            _ => Ok(()),
        }
    }
}
