//! WebSocket client: dials the single remote peer.
//!
//! The handshake carries an `Origin` header built from the local host name.
//! A failed dial is fatal; there is no retry.

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::ORIGIN;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::info;

use crate::application::error::BridgeError;

pub type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials `address`, which may omit the `ws://` scheme.
///
/// # Errors
///
/// Returns [`BridgeError::TransportDial`] if the URL is malformed or the
/// connection or handshake fails.
pub async fn dial(address: &str) -> Result<ClientSocket, BridgeError> {
    let url = normalize_url(address);
    let dial_error = |reason: String| BridgeError::TransportDial {
        url: url.clone(),
        reason,
    };

    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| dial_error(e.to_string()))?;
    let origin = format!("http://{}", local_hostname());
    let origin = HeaderValue::from_str(&origin).map_err(|e| dial_error(e.to_string()))?;
    request.headers_mut().insert(ORIGIN, origin);

    let (socket, response) = connect_async(request)
        .await
        .map_err(|e| dial_error(e.to_string()))?;
    info!("connected to {url} (HTTP {})", response.status());
    Ok(socket)
}

fn normalize_url(address: &str) -> String {
    if address.starts_with("ws://") || address.starts_with("wss://") {
        address.to_string()
    } else {
        format!("ws://{address}")
    }
}

/// Local host name for the `Origin` header; `localhost` if the OS will not
/// say.
fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
