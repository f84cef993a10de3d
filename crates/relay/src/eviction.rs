//! Bereinigung inaktiver Sitzungen
//!
//! Laeuft periodisch im Hintergrund:
//! - verwirft Schluessel alter Epochs nach Ablauf der Gnadenfrist
//! - entfernt Sitzungen, die laenger als `sitzung_ttl` inaktiv sind,
//!   und schliesst deren Verbindungen mit `SESSION_EVICTED`

use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::broadcast::SchliessGrund;
use crate::state::RelayState;

/// Ergebnis eines Bereinigungslaufs
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BereinigungsBericht {
    pub verworfene_epochs: usize,
    pub verdraengte_sitzungen: usize,
    pub geschlossene_verbindungen: usize,
}

/// Periodischer Bereinigungs-Task
pub struct Bereiniger {
    state: Arc<RelayState>,
}

impl Bereiniger {
    pub fn neu(state: Arc<RelayState>) -> Self {
        Self { state }
    }

    /// Fuehrt einen einzelnen Bereinigungslauf aus
    pub fn durchlauf(&self) -> BereinigungsBericht {
        let ttl = self.state.config.sitzung_ttl;
        let schluessel = &self.state.schluessel;
        let mut bericht = BereinigungsBericht {
            verworfene_epochs: schluessel.ausgemusterte_bereinigen(),
            ..BereinigungsBericht::default()
        };

        for session_id in schluessel.inaktive_sitzungen(ttl) {
            // Erneute Pruefung unter Lock: Aktivitaet seit dem Scan gewinnt
            if !schluessel.entfernen_falls_inaktiv(&session_id, ttl) {
                continue;
            }
            self.state.metriken.sitzungen_verdraengt.inc();
            self.state.replay.sitzung_vergessen(&session_id);
            let geschlossen = self
                .state
                .registry
                .sitzung_schliessen(&session_id, SchliessGrund::SitzungVerdraengt);

            tracing::info!(
                session = %session_id,
                verbindungen = geschlossen,
                "Sitzung wegen Inaktivitaet verdraengt"
            );
            bericht.verdraengte_sitzungen += 1;
            bericht.geschlossene_verbindungen += geschlossen;
        }

        self.state
            .metriken
            .aktive_sitzungen
            .set(schluessel.anzahl() as i64);
        bericht
    }

    /// Startet die Bereinigungsschleife bis zum Shutdown
    pub async fn starten(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut takt = tokio::time::interval(
            self.state
                .config
                .bereinigung_intervall
                .max(std::time::Duration::from_secs(1)),
        );
        takt.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            intervall_sek = self.state.config.bereinigung_intervall.as_secs(),
            ttl_sek = self.state.config.sitzung_ttl.as_secs(),
            "Sitzungs-Bereinigung gestartet"
        );

        loop {
            tokio::select! {
                _ = takt.tick() => {
                    let bericht = self.durchlauf();
                    if bericht != BereinigungsBericht::default() {
                        tracing::debug!(?bericht, "Bereinigungslauf abgeschlossen");
                    }
                }
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Sitzungs-Bereinigung gestoppt");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::SendeKanal;
    use crate::state::RelayConfig;
    use schleier_core::{ClientId, Rolle, SessionId, StreamArt, VerbindungsId};
    use schleier_keys::KeyDirectory;
    use schleier_observability::SchleierMetrics;
    use std::time::Duration;

    fn state() -> Arc<RelayState> {
        RelayState::neu(
            RelayConfig {
                sitzung_ttl: Duration::from_secs(60),
                ..RelayConfig::default()
            },
            Arc::new(KeyDirectory::default()),
            SchleierMetrics::neu().unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn inaktive_sitzung_wird_verdraengt() {
        let state = state();
        let demo = SessionId::neu("demo").unwrap();
        let aktiv = SessionId::neu("aktiv").unwrap();
        state.schluessel.hole_oder_erzeuge(&demo).unwrap();
        state.schluessel.hole_oder_erzeuge(&aktiv).unwrap();

        let (kanal, empfang) = SendeKanal::neu(VerbindungsId::new(), 4);
        state
            .registry
            .beitreten(&demo, &ClientId::neu("v1").unwrap(), Rolle::Viewer, &kanal)
            .unwrap();
        state
            .replay
            .pruefen(&demo, &ClientId::neu("h1").unwrap(), StreamArt::Chat, 1);

        tokio::time::advance(Duration::from_secs(45)).await;
        state.schluessel.aktivitaet_melden(&aktiv);
        tokio::time::advance(Duration::from_secs(20)).await;

        let bericht = Bereiniger::neu(Arc::clone(&state)).durchlauf();
        assert_eq!(bericht.verdraengte_sitzungen, 1);
        assert_eq!(bericht.geschlossene_verbindungen, 1);

        assert!(state.schluessel.hole(&demo).unwrap_err().ist_nicht_gefunden());
        assert!(state.schluessel.hole(&aktiv).is_ok());
        assert_eq!(
            *empfang.schliess_rx.borrow(),
            Some(SchliessGrund::SitzungVerdraengt)
        );
        assert_eq!(state.replay.fenster_anzahl(), 0);
        assert_eq!(state.metriken.aktive_sitzungen.get(), 1);
        assert_eq!(state.metriken.sitzungen_verdraengt.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn aktive_sitzung_bleibt() {
        let state = state();
        let demo = SessionId::neu("demo").unwrap();
        state.schluessel.hole_oder_erzeuge(&demo).unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        let bericht = Bereiniger::neu(Arc::clone(&state)).durchlauf();
        assert_eq!(bericht.verdraengte_sitzungen, 0);
        assert!(state.schluessel.hole(&demo).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn bereinigung_endet_mit_shutdown() {
        let state = state();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(Bereiniger::neu(state).starten(rx));
        tokio::time::advance(Duration::from_secs(31)).await;
        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
