//! Send-Queues und Fan-out
//!
//! Jede Verbindung besitzt eine begrenzte Send-Queue (`SendeKanal`). Der
//! Fan-out reiht eine einmal serialisierte Nachricht nicht-blockierend in
//! die Queues aller Empfaenger ein.
//!
//! ## Backpressure
//! Ist die Queue eines Empfaengers voll, wird die Nachricht fuer ihn
//! verworfen und seine Verbindung mit `OVERLOADED` geschlossen. Ein
//! langsamer Empfaenger blockiert so nie den Absender.

use schleier_core::VerbindungsId;
use schleier_protocol::FehlerCode;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::registry::MitgliedHandle;

// ---------------------------------------------------------------------------
// SchliessGrund
// ---------------------------------------------------------------------------

/// Grund, aus dem das Relay eine Verbindung schliesst
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchliessGrund {
    /// Ungueltige oder unerwartete Nachricht
    Protokoll(String),
    /// Durch eine neuere Verbindung mit derselben Client-ID ersetzt
    DoppelterClient,
    /// Send-Queue uebergelaufen
    Ueberlastet,
    /// Sitzung wegen Inaktivitaet entfernt
    SitzungVerdraengt,
    /// Keine eingehenden Daten innerhalb des Timeouts
    Timeout,
    /// Server faehrt herunter
    Shutdown,
}

impl SchliessGrund {
    /// Fehler-Code fuer den `error`-Umschlag
    pub fn code(&self) -> FehlerCode {
        match self {
            Self::Protokoll(_) => FehlerCode::ProtocolError,
            Self::DoppelterClient => FehlerCode::DuplicateClient,
            Self::Ueberlastet => FehlerCode::Overloaded,
            Self::SitzungVerdraengt => FehlerCode::SessionEvicted,
            Self::Timeout => FehlerCode::Timeout,
            Self::Shutdown => FehlerCode::Shutdown,
        }
    }

    /// Menschenlesbare Meldung fuer den `error`-Umschlag
    pub fn meldung(&self) -> String {
        match self {
            Self::Protokoll(grund) => grund.clone(),
            Self::DoppelterClient => "Durch neuere Verbindung ersetzt".into(),
            Self::Ueberlastet => "Send-Queue uebergelaufen".into(),
            Self::SitzungVerdraengt => "Sitzung wegen Inaktivitaet entfernt".into(),
            Self::Timeout => "Keine Aktivitaet".into(),
            Self::Shutdown => "Server wird heruntergefahren".into(),
        }
    }

    /// Label fuer `schleier_verbindungen_getrennt_total{grund}`
    pub fn label(&self) -> &'static str {
        match self {
            Self::Protokoll(_) => "protokoll",
            Self::DoppelterClient => "doppelter_client",
            Self::Ueberlastet => "ueberlastet",
            Self::SitzungVerdraengt => "verdraengt",
            Self::Timeout => "timeout",
            Self::Shutdown => "shutdown",
        }
    }
}

// ---------------------------------------------------------------------------
// SendeKanal
// ---------------------------------------------------------------------------

/// Empfangsseite einer Verbindung (gehoert dem Verbindungs-Task)
pub struct VerbindungsEmpfang {
    pub rx: mpsc::Receiver<Arc<str>>,
    pub schliess_rx: watch::Receiver<Option<SchliessGrund>>,
}

/// Handle auf die Send-Queue einer Verbindung
///
/// Clone teilt Queue und Schliess-Signal.
#[derive(Clone, Debug)]
pub struct SendeKanal {
    verbindung_id: VerbindungsId,
    tx: mpsc::Sender<Arc<str>>,
    schliessen: Arc<watch::Sender<Option<SchliessGrund>>>,
}

impl SendeKanal {
    /// Erstellt Queue und Schliess-Signal fuer eine neue Verbindung
    pub fn neu(verbindung_id: VerbindungsId, groesse: usize) -> (Self, VerbindungsEmpfang) {
        let (tx, rx) = mpsc::channel(groesse.max(1));
        let (schliess_tx, schliess_rx) = watch::channel(None);
        let kanal = Self {
            verbindung_id,
            tx,
            schliessen: Arc::new(schliess_tx),
        };
        (kanal, VerbindungsEmpfang { rx, schliess_rx })
    }

    pub fn verbindung_id(&self) -> VerbindungsId {
        self.verbindung_id
    }

    /// Reiht eine Nachricht nicht-blockierend ein
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist. Bei
    /// voller Queue wird die Verbindung als ueberlastet geschlossen.
    pub fn senden(&self, nachricht: Arc<str>) -> bool {
        match self.tx.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(verbindung = %self.verbindung_id, "Send-Queue voll – Verbindung wird getrennt");
                self.schliessen(SchliessGrund::Ueberlastet);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(verbindung = %self.verbindung_id, "Send-Queue geschlossen (Client getrennt)");
                false
            }
        }
    }

    /// Fordert das Schliessen der Verbindung an
    ///
    /// Der erste Grund gewinnt; spaetere Aufrufe aendern ihn nicht.
    /// Gibt `true` zurueck wenn dieser Aufruf den Grund gesetzt hat.
    pub fn schliessen(&self, grund: SchliessGrund) -> bool {
        self.schliessen.send_if_modified(|aktuell| {
            if aktuell.is_some() {
                return false;
            }
            *aktuell = Some(grund);
            true
        })
    }

    /// `true` wenn die Verbindung beendet ist oder beendet werden soll
    pub fn ist_geschlossen(&self) -> bool {
        self.tx.is_closed() || self.schliessen.borrow().is_some()
    }
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

/// Sendet eine Nachricht an alle Mitglieder eines Snapshots
///
/// `ausgenommen` schliesst eine Verbindung (den Absender) aus.
/// Gibt die Anzahl erfolgreich eingereihter Nachrichten zurueck.
pub fn an_mitglieder_senden(
    mitglieder: &[MitgliedHandle],
    nachricht: Arc<str>,
    ausgenommen: Option<VerbindungsId>,
) -> usize {
    mitglieder
        .iter()
        .filter(|m| Some(m.verbindung_id()) != ausgenommen)
        .filter(|m| m.kanal.senden(Arc::clone(&nachricht)))
        .count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
