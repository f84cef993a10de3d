//! WebSocket-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Endpunkt: `GET /ws?sessionId=...`
//!
//! Fuer jede angenommene Verbindung startet ein eigener Task mit einer
//! `ClientConnection`. Ist `max_clients` erreicht, wird das Upgrade mit
//! 503 abgelehnt.

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use schleier_core::SessionId;
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::connection::ClientConnection;
use crate::error::RelayResult;
use crate::state::RelayState;

/// Query-Parameter des WebSocket-Endpunkts
#[derive(Debug, Default, Deserialize)]
pub struct WsParameter {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

#[derive(Clone)]
struct WsZustand {
    relay: Arc<RelayState>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Axum-Router fuer den `/ws`-Endpunkt
pub fn relay_router(relay: Arc<RelayState>, shutdown_rx: watch::Receiver<bool>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .layer(schleier_observability::request_timing_layer())
        .with_state(WsZustand { relay, shutdown_rx })
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(parameter): Query<WsParameter>,
    State(zustand): State<WsZustand>,
) -> Response {
    let erwartete_sitzung = match parameter.session_id.map(SessionId::neu).transpose() {
        Ok(id) => id,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let Some(platz) = zustand.relay.platz_reservieren() else {
        tracing::warn!(
            max = zustand.relay.config.max_clients,
            "Server voll – Verbindung abgelehnt"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Server voll").into_response();
    };

    // Nachrichten knapp ueber dem Limit erhalten noch einen Protokollfehler,
    // deutlich groessere beendet der Transport selbst
    let transport_limit = zustand.relay.config.max_nachricht_bytes.saturating_mul(4);
    let WsZustand { relay, shutdown_rx } = zustand;

    ws.max_message_size(transport_limit)
        .on_upgrade(move |socket| {
            ClientConnection::neu(relay, erwartete_sitzung, platz).verarbeiten(socket, shutdown_rx)
        })
        .into_response()
}

/// Bedient den Relay auf einem bereits gebundenen Listener
///
/// Laeuft bis `shutdown_rx` `true` meldet.
pub async fn relay_bedienen(
    listener: TcpListener,
    relay: Arc<RelayState>,
    shutdown_rx: watch::Receiver<bool>,
) -> RelayResult<()> {
    let lokale_addr = listener.local_addr()?;
    tracing::info!(adresse = %lokale_addr, "WebSocket-Relay gestartet");

    let mut stopp_rx = shutdown_rx.clone();
    axum::serve(listener, relay_router(relay, shutdown_rx))
        .with_graceful_shutdown(async move {
            let _ = stopp_rx.wait_for(|stop| *stop).await;
        })
        .await?;

    tracing::info!("WebSocket-Relay gestoppt");
    Ok(())
}
