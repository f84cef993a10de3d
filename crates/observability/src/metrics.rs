//! Prometheus-kompatible Metriken fuer Schleier
//!
//! Registrierte Metriken:
//! - `schleier_verbundene_clients` – Gauge: Aktuell gebundene Verbindungen
//! - `schleier_aktive_sitzungen` – Gauge: Sitzungen mit Schluessel
//! - `schleier_frames_weitergeleitet_total` – Counter: Akzeptierte Frames
//! - `schleier_frames_abgelehnt_total` – Counter: Verworfene Frames (grund)
//! - `schleier_chat_nachrichten_total` – Counter: Klartext-Chats
//! - `schleier_rotationen_total` – Counter: Schluesselrotationen
//! - `schleier_sitzungen_verdraengt_total` – Counter: Wegen Inaktivitaet entfernte Sitzungen
//! - `schleier_verbindungen_getrennt_total` – Counter: Getrennte Verbindungen (grund)
//! - `schleier_http_requests_total` – Counter: HTTP-Anfragen (method, path, status)
//! - `schleier_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Alle Schleier-Prometheus-Metriken
#[derive(Clone)]
pub struct SchleierMetrics {
    pub registry: Arc<Registry>,

    // Relay-Metriken
    pub verbundene_clients: IntGauge,
    pub aktive_sitzungen: IntGauge,
    pub frames_weitergeleitet: IntCounter,
    pub frames_abgelehnt: IntCounterVec,
    pub chat_nachrichten: IntCounter,
    pub rotationen: IntCounter,
    pub sitzungen_verdraengt: IntCounter,
    pub verbindungen_getrennt: IntCounterVec,

    // HTTP-Metriken
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

impl SchleierMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Relay-Metriken ---
        let verbundene_clients = IntGauge::with_opts(Opts::new(
            "schleier_verbundene_clients",
            "Anzahl aktuell gebundener Verbindungen",
        ))?;
        registry.register(Box::new(verbundene_clients.clone()))?;

        let aktive_sitzungen = IntGauge::with_opts(Opts::new(
            "schleier_aktive_sitzungen",
            "Anzahl Sitzungen mit Schluessel",
        ))?;
        registry.register(Box::new(aktive_sitzungen.clone()))?;

        let frames_weitergeleitet = IntCounter::with_opts(Opts::new(
            "schleier_frames_weitergeleitet_total",
            "Gesamtanzahl akzeptierter und verteilter Frames",
        ))?;
        registry.register(Box::new(frames_weitergeleitet.clone()))?;

        let frames_abgelehnt = IntCounterVec::new(
            Opts::new(
                "schleier_frames_abgelehnt_total",
                "Gesamtanzahl verworfener Frames",
            ),
            &["grund"],
        )?;
        registry.register(Box::new(frames_abgelehnt.clone()))?;

        let chat_nachrichten = IntCounter::with_opts(Opts::new(
            "schleier_chat_nachrichten_total",
            "Gesamtanzahl verteilter Klartext-Chats",
        ))?;
        registry.register(Box::new(chat_nachrichten.clone()))?;

        let rotationen = IntCounter::with_opts(Opts::new(
            "schleier_rotationen_total",
            "Gesamtanzahl Schluesselrotationen",
        ))?;
        registry.register(Box::new(rotationen.clone()))?;

        let sitzungen_verdraengt = IntCounter::with_opts(Opts::new(
            "schleier_sitzungen_verdraengt_total",
            "Gesamtanzahl wegen Inaktivitaet entfernter Sitzungen",
        ))?;
        registry.register(Box::new(sitzungen_verdraengt.clone()))?;

        let verbindungen_getrennt = IntCounterVec::new(
            Opts::new(
                "schleier_verbindungen_getrennt_total",
                "Gesamtanzahl getrennter Verbindungen",
            ),
            &["grund"],
        )?;
        registry.register(Box::new(verbindungen_getrennt.clone()))?;

        // --- HTTP-Metriken ---
        let http_requests_total = IntCounterVec::new(
            Opts::new("schleier_http_requests_total", "Gesamtanzahl HTTP-Anfragen"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "schleier_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            verbundene_clients,
            aktive_sitzungen,
            frames_weitergeleitet,
            frames_abgelehnt,
            chat_nachrichten,
            rotationen,
            sitzungen_verdraengt,
            verbindungen_getrennt,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: SchleierMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<SchleierMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
