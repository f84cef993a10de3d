//! Axum HTTP-Server fuer die Schluessel-API

use std::net::SocketAddr;

use anyhow::Result;
use axum::http::{HeaderValue, Method};
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::rest::{routes::sitzungs_router, ApiState};

/// Konfiguration der Schluessel-API
#[derive(Debug, Clone)]
pub struct SchluesselApiKonfig {
    pub bind_addr: SocketAddr,
    /// Erlaubte CORS-Origins. Leer = alle Origins erlaubt.
    pub cors_origins: Vec<String>,
}

impl Default for SchluesselApiKonfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            cors_origins: vec![],
        }
    }
}

fn cors_layer(cors_origins: &[String]) -> CorsLayer {
    if cors_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

/// Vollstaendiger Router inklusive Timing, Tracing und CORS
pub fn api_router(state: ApiState, cors_origins: &[String]) -> Router {
    let metriken = state.metriken.clone();
    sitzungs_router()
        .layer(middleware::from_fn_with_state(
            metriken,
            schleier_observability::timing_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

/// Bedient die Schluessel-API auf einem bereits gebundenen Listener
pub async fn api_bedienen(
    listener: TcpListener,
    app: Router,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    tracing::info!(addr = %listener.local_addr()?, "Schluessel-API gestartet");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
        })
        .await?;
    tracing::info!("Schluessel-API gestoppt");
    Ok(())
}
