//! schleier-server – Bibliotheks-Root
//!
//! Verdrahtet Schluessel-Verzeichnis, HTTP-API, WebSocket-Relay,
//! Bereinigung und Observability und stellt den oeffentlichen
//! Einstiegspunkt fuer Integrationstests bereit.

pub mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use config::ServerConfig;
use schleier_api::{api_bedienen, api_router, ApiState};
use schleier_keys::KeyDirectory;
use schleier_observability::{observability_server_starten, HealthState, SchleierMetrics};
use schleier_relay::{relay_bedienen, Bereiniger, RelayState};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Wie lange beim Beenden auf die Hintergrund-Tasks gewartet wird
const SHUTDOWN_WARTEZEIT: Duration = Duration::from_secs(5);

/// Haelt die Server-Konfiguration bis zum Start
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Bindet alle Listener und startet die Hintergrund-Tasks
    ///
    /// Reihenfolge:
    /// 1. Metriken, Health und Schluessel-Verzeichnis anlegen
    /// 2. HTTP-Schluessel-API binden
    /// 3. WebSocket-Relay binden
    /// 4. Bereinigung und Observability-Server starten
    pub async fn binden(self) -> Result<LaufenderServer> {
        let config = self.config;
        let metriken = SchleierMetrics::neu()?;
        let health = HealthState::neu();
        let schluessel = Arc::new(KeyDirectory::neu(config.key_directory_config()));
        let relay = RelayState::neu(
            config.relay_config(),
            Arc::clone(&schluessel),
            metriken.clone(),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        // HTTP-Schluessel-API
        let api_konfig = config.api_konfig()?;
        let api_listener = TcpListener::bind(api_konfig.bind_addr).await?;
        let api_addr = api_listener.local_addr()?;
        let app = api_router(
            ApiState::neu(Arc::clone(&schluessel), metriken.clone()),
            &api_konfig.cors_origins,
        );
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = api_bedienen(api_listener, app, rx).await {
                tracing::error!(fehler = %e, "Schluessel-API beendet mit Fehler");
            }
        }));

        // WebSocket-Relay
        let relay_listener = TcpListener::bind(config.relay_bind_adresse()?).await?;
        let relay_addr = relay_listener.local_addr()?;
        let rx = shutdown_rx.clone();
        let relay_state = Arc::clone(&relay);
        tasks.push(tokio::spawn(async move {
            if let Err(e) = relay_bedienen(relay_listener, relay_state, rx).await {
                tracing::error!(fehler = %e, "WebSocket-Relay beendet mit Fehler");
            }
        }));

        // Bereinigung inaktiver Sitzungen
        tasks.push(tokio::spawn(
            Bereiniger::neu(Arc::clone(&relay)).starten(shutdown_rx.clone()),
        ));

        // Observability (Metriken + Health)
        let observability_addr = if config.observability.aktiviert {
            let addr = config.observability_bind_adresse()?;
            let (m, h, rx) = (metriken.clone(), health.clone(), shutdown_rx.clone());
            tasks.push(tokio::spawn(async move {
                if let Err(e) = observability_server_starten(addr, m, h, rx).await {
                    tracing::error!(fehler = %e, "Observability-Server beendet mit Fehler");
                }
            }));
            Some(addr)
        } else {
            None
        };

        health.bereit_setzen(true);
        tracing::info!(
            relay = %relay_addr,
            api = %api_addr,
            observability = ?observability_addr,
            duplikate = ?config.relay.duplikat_strategie,
            "Server bereit"
        );

        Ok(LaufenderServer {
            relay_addr,
            api_addr,
            observability_addr,
            relay,
            health,
            shutdown_tx,
            tasks,
        })
    }

    /// Startet alle Subsysteme und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        let laufend = self.binden().await?;
        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
        laufend.beenden().await;
        Ok(())
    }
}

/// Ein gestarteter Server mit seinen tatsaechlich gebundenen Adressen
pub struct LaufenderServer {
    pub relay_addr: SocketAddr,
    pub api_addr: SocketAddr,
    pub observability_addr: Option<SocketAddr>,
    pub relay: Arc<RelayState>,
    pub health: HealthState,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl LaufenderServer {
    /// Signalisiert allen Tasks den Shutdown und wartet auf ihr Ende
    ///
    /// Offene WebSocket-Verbindungen erhalten einen `SHUTDOWN`-Fehler und
    /// einen Close-Frame.
    pub async fn beenden(self) {
        self.health.bereit_setzen(false);
        let _ = self.shutdown_tx.send(true);

        for task in self.tasks {
            match tokio::time::timeout(SHUTDOWN_WARTEZEIT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(fehler = %e, "Task abgebrochen"),
                Err(_) => tracing::warn!("Task hat sich nicht rechtzeitig beendet"),
            }
        }
        tracing::info!("Server beendet");
    }
}
