//! Rustquest World Server
//!
//! Authoritative multiplayer world server speaking JSON over WebSocket.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use rustquest_server::config::ServerConfig;
use rustquest_server::game::content::WorldContent;
use rustquest_server::game::scheduler::spawn_world;
use rustquest_server::net::handler::ConnectionHandler;
use rustquest_server::state::AppState;
use rustquest_server::{World, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Rustquest World Server v{}", VERSION);

    // Load configuration
    let config = ServerConfig::load().await?;
    info!(
        "Configuration loaded from: {}",
        config.config_path.display()
    );

    // Load world content
    let content = WorldContent::load(&config.content_path).await?;

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Start the world task
    let world = World::from_config(&config, content);
    let (world_handle, world_task) = spawn_world(world, shutdown_tx.subscribe());

    let state = Arc::new(AppState::new(
        config.clone(),
        world_handle,
        shutdown_tx.clone(),
    ));
    info!("Application state initialized");

    // Start WebSocket listener
    let ws_addr: SocketAddr = format!("0.0.0.0:{}", config.websocket_port).parse()?;
    let ws_listener = TcpListener::bind(ws_addr).await?;
    info!("WebSocket server listening on: {}", ws_addr);

    let ws_state = state.clone();
    let mut ws_shutdown_rx = shutdown_tx.subscribe();
    let ws_handle = tokio::spawn(async move {
        accept_websocket_connections(ws_listener, ws_state, &mut ws_shutdown_rx).await;
    });

    info!("World {} is ready for connections", config.world_id);

    // Wait for shutdown signal
    wait_for_shutdown(shutdown_tx.clone()).await;

    info!("Shutting down server...");

    let _ = ws_handle.await;
    match world_task.await {
        Ok(world) => info!(
            ticks = world.tick_count(),
            entities = world.registry().count(),
            "World task finished"
        ),
        Err(e) => error!("World task failed: {}", e),
    }

    info!("Server shutdown complete. Goodbye!");
    Ok(())
}

/// Initialize the logging/tracing system
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rustquest_server=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();
}

/// Accept incoming WebSocket connections
async fn accept_websocket_connections(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        info!("New WebSocket connection from: {}", addr);
                        let handler = ConnectionHandler::new(state.clone());
                        tokio::spawn(async move {
                            if let Err(e) = handler.handle_websocket(stream, addr).await {
                                warn!("WebSocket connection error from {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept WebSocket connection: {}", e);
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("WebSocket connection acceptor shutting down");
                break;
            }
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn wait_for_shutdown(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    // Signal all tasks to shut down
    let _ = shutdown_tx.send(());
}
