//! WebSocket server: listener and accept loop.
//!
//! Every request is upgraded regardless of its path; there is no sub-protocol
//! negotiation and no authentication.  Each accepted TCP stream completes its
//! handshake in its own task, so a slow or broken client never delays the
//! next accept.  A failed accept or handshake is logged and affects only
//! that attempt.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tracing::{debug, error, info, warn};

use crate::application::error::BridgeError;
use crate::application::shutdown::Shutdown;
use crate::infrastructure::connection::{Connection, ConnectionOptions};
use crate::infrastructure::hub::Hub;

/// Pause after a failed `accept()` so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Binds the websocket listener on `addr` (e.g. `localhost:9999`).
///
/// # Errors
///
/// Returns [`BridgeError::TransportBind`]; this is fatal for the server.
pub async fn bind_listener(addr: &str) -> Result<TcpListener, BridgeError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| BridgeError::TransportBind {
            addr: addr.to_string(),
            source,
        })?;
    if let Ok(local) = listener.local_addr() {
        info!("websocket server listening on ws://{local}/");
    }
    Ok(listener)
}

/// Accepts websocket peers and registers them with `hub` until shutdown.
pub async fn run_accept_loop(
    listener: TcpListener,
    hub: Arc<Hub>,
    options: ConnectionOptions,
    shutdown: Shutdown,
) {
    // Handshakes in flight; dropped (and aborted) when the loop ends.
    let mut handshakes = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.triggered() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("TCP connection from {peer}");
                    handshakes.spawn(upgrade(stream, peer, Arc::clone(&hub), options));
                }
                Err(e) => {
                    error!("accept error: {e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = handshakes.join_next(), if !handshakes.is_empty() => {}
        }
    }
    debug!("accept loop stopped");
}

async fn upgrade(stream: TcpStream, peer: SocketAddr, hub: Arc<Hub>, options: ConnectionOptions) {
    let log_path = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        debug!("upgrade request from {peer} for {}", request.uri().path());
        Ok(response)
    };

    match accept_hdr_async(stream, log_path).await {
        Ok(socket) => {
            let cid = hub.register(Connection::open(socket, options)).await;
            info!(%cid, "websocket peer {peer} connected");
        }
        Err(e) => warn!("websocket handshake with {peer} failed: {e}"),
    }
}
