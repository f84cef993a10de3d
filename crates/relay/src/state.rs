//! Gemeinsamer Relay-Zustand
//!
//! Haelt alle geteilten Komponenten als Arc-Referenzen, die sicher
//! zwischen tokio-Tasks geteilt werden koennen.

use schleier_keys::KeyDirectory;
use schleier_observability::SchleierMetrics;
use schleier_protocol::{NachrichtenCodec, ServerNachricht};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::registry::{DuplikatStrategie, SessionRegistry};
use crate::replay::ReplayGuard;

/// Konfiguration fuer den Relay-Broker
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Kapazitaet der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Breite des Replay-Fensters (1..=64)
    pub replay_fenster: u32,
    /// Klartext-Chat auch an den Absender zurueckschicken
    pub chat_an_absender: bool,
    /// Verhalten bei doppelter Client-ID
    pub duplikat_strategie: DuplikatStrategie,
    /// Intervall fuer WebSocket-Pings
    pub keepalive: Duration,
    /// Verbindung schliessen nach so langer Stille
    pub verbindungs_timeout: Duration,
    /// Maximale Groesse einer eingehenden oder ausgehenden Nachricht
    pub max_nachricht_bytes: usize,
    /// Maximale Anzahl gleichzeitiger WebSocket-Verbindungen
    pub max_clients: usize,
    /// Nach einer Rotation `keyRotated` an alle Mitglieder senden
    pub rotation_melden: bool,
    /// Sitzungen ohne Aktivitaet werden nach dieser Dauer entfernt
    pub sitzung_ttl: Duration,
    /// Intervall des Bereinigungs-Tasks
    pub bereinigung_intervall: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            send_queue_groesse: 256,
            replay_fenster: 64,
            chat_an_absender: true,
            duplikat_strategie: DuplikatStrategie::Ablehnen,
            keepalive: Duration::from_secs(30),
            verbindungs_timeout: Duration::from_secs(90),
            max_nachricht_bytes: 64 * 1024,
            max_clients: 1024,
            rotation_melden: true,
            sitzung_ttl: Duration::from_secs(30 * 60),
            bereinigung_intervall: Duration::from_secs(30),
        }
    }
}

/// Gemeinsamer Relay-Zustand (thread-safe, Arc-geteilt)
pub struct RelayState {
    pub config: Arc<RelayConfig>,
    /// Schluessel-Verzeichnis (geteilt mit der HTTP-API)
    pub schluessel: Arc<KeyDirectory>,
    pub registry: SessionRegistry,
    pub replay: ReplayGuard,
    pub metriken: SchleierMetrics,
    pub codec: NachrichtenCodec,
    /// Offene WebSocket-Verbindungen (gebunden oder nicht)
    verbindungen: AtomicUsize,
}

impl RelayState {
    pub fn neu(
        config: RelayConfig,
        schluessel: Arc<KeyDirectory>,
        metriken: SchleierMetrics,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry: SessionRegistry::neu(config.duplikat_strategie),
            replay: ReplayGuard::neu(config.replay_fenster),
            codec: NachrichtenCodec::with_max_size(config.max_nachricht_bytes),
            config: Arc::new(config),
            schluessel,
            metriken,
            verbindungen: AtomicUsize::new(0),
        })
    }

    /// Reserviert einen Verbindungsplatz, falls `max_clients` nicht erreicht ist
    pub fn platz_reservieren(self: &Arc<Self>) -> Option<VerbindungsPlatz> {
        let max = self.config.max_clients;
        self.verbindungen
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()
            .map(|_| VerbindungsPlatz {
                state: Arc::clone(self),
            })
    }

    pub fn verbindungs_anzahl(&self) -> usize {
        self.verbindungen.load(Ordering::Acquire)
    }

    /// Serialisiert eine Relay-Nachricht einmalig fuer den Fan-out
    pub fn kodieren(&self, nachricht: &ServerNachricht) -> Option<Arc<str>> {
        match self.codec.kodieren(nachricht) {
            Ok(text) => Some(Arc::from(text)),
            Err(e) => {
                tracing::warn!(fehler = %e, "Nachricht nicht kodierbar – verworfen");
                None
            }
        }
    }
}

/// Belegter Verbindungsplatz; wird beim Drop freigegeben
pub struct VerbindungsPlatz {
    state: Arc<RelayState>,
}

impl Drop for VerbindungsPlatz {
    fn drop(&mut self) {
        self.state.verbindungen.fetch_sub(1, Ordering::AcqRel);
    }
}
