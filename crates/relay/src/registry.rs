//! Sitzungsregister (Session Registry)
//!
//! Haelt fuer jede Sitzung die Menge der gebundenen Verbindungen.
//!
//! ## Konsistenz
//! Alle Aenderungen an einer Sitzung laufen unter dem Shard-Lock der
//! `DashMap`. `mitglieder` liefert einen Snapshot: wer vor dem Snapshot
//! gegangen ist, bekommt nichts mehr; wer danach beitritt, verpasst genau
//! diese eine Nachricht.

use dashmap::DashMap;
use schleier_core::{ClientId, Rolle, SessionId, VerbindungsId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::broadcast::{SchliessGrund, SendeKanal};
use crate::error::{RelayError, RelayResult};

// ---------------------------------------------------------------------------
// Typen
// ---------------------------------------------------------------------------

/// Verhalten bei einem `hello` mit bereits registrierter Client-ID
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplikatStrategie {
    /// Neue Verbindung wird abgelehnt
    #[default]
    Ablehnen,
    /// Alte Verbindung wird geschlossen, neue uebernimmt
    Ersetzen,
}

/// Eintrag einer gebundenen Verbindung im Register
#[derive(Debug, Clone)]
pub struct MitgliedHandle {
    pub session_id: SessionId,
    pub client_id: ClientId,
    pub rolle: Rolle,
    pub kanal: SendeKanal,
}

impl MitgliedHandle {
    pub fn verbindung_id(&self) -> VerbindungsId {
        self.kanal.verbindung_id()
    }
}

/// Ergebnis eines erfolgreichen Beitritts
#[derive(Debug)]
pub struct Beitritt {
    pub handle: MitgliedHandle,
    /// Bei `Ersetzen`: das verdraengte Mitglied (bereits zum Schliessen markiert)
    pub ersetzt: Option<MitgliedHandle>,
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

/// Register aller gebundenen Verbindungen, nach Sitzung gruppiert
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    sitzungen: DashMap<SessionId, HashMap<ClientId, MitgliedHandle>>,
    strategie: DuplikatStrategie,
}

impl SessionRegistry {
    pub fn neu(strategie: DuplikatStrategie) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sitzungen: DashMap::new(),
                strategie,
            }),
        }
    }

    pub fn strategie(&self) -> DuplikatStrategie {
        self.inner.strategie
    }

    /// Registriert eine Verbindung unter der Sitzung
    ///
    /// Ein bestehender Eintrag, dessen Verbindung bereits beendet ist, wird
    /// immer ersetzt. Sonst entscheidet die `DuplikatStrategie`.
    pub fn beitreten(
        &self,
        session_id: &SessionId,
        client_id: &ClientId,
        rolle: Rolle,
        kanal: &SendeKanal,
    ) -> RelayResult<Beitritt> {
        let handle = MitgliedHandle {
            session_id: session_id.clone(),
            client_id: client_id.clone(),
            rolle,
            kanal: kanal.clone(),
        };

        let ersetzt = {
            let mut mitglieder = self.inner.sitzungen.entry(session_id.clone()).or_default();
            if let Some(bestehend) = mitglieder.get(client_id) {
                if self.inner.strategie == DuplikatStrategie::Ablehnen
                    && !bestehend.kanal.ist_geschlossen()
                {
                    return Err(RelayError::DoppelterClient {
                        session: session_id.to_string(),
                        client: client_id.to_string(),
                    });
                }
            }
            mitglieder.insert(client_id.clone(), handle.clone())
        };

        if let Some(alt) = &ersetzt {
            alt.kanal.schliessen(SchliessGrund::DoppelterClient);
            tracing::info!(
                session = %session_id,
                client = %client_id,
                alte_verbindung = %alt.verbindung_id(),
                "Bestehende Verbindung ersetzt"
            );
        }

        tracing::debug!(
            session = %session_id,
            client = %client_id,
            rolle = %rolle,
            verbindung = %handle.verbindung_id(),
            "Mitglied beigetreten"
        );
        Ok(Beitritt { handle, ersetzt })
    }

    /// Entfernt eine Verbindung aus ihrer Sitzung
    ///
    /// Idempotent. Entfernt nur den Eintrag genau dieser Verbindung, nicht
    /// einen neueren mit derselben Client-ID. Leere Sitzungen werden
    /// aufgeraeumt. Gibt `true` zurueck wenn etwas entfernt wurde.
    pub fn verlassen(&self, handle: &MitgliedHandle) -> bool {
        let mut entfernt = false;
        if let Some(mut mitglieder) = self.inner.sitzungen.get_mut(&handle.session_id) {
            let eigener_eintrag = mitglieder
                .get(&handle.client_id)
                .is_some_and(|m| m.verbindung_id() == handle.verbindung_id());
            if eigener_eintrag {
                mitglieder.remove(&handle.client_id);
                entfernt = true;
            }
        }

        if entfernt {
            self.inner
                .sitzungen
                .remove_if(&handle.session_id, |_, mitglieder| mitglieder.is_empty());
            tracing::debug!(
                session = %handle.session_id,
                client = %handle.client_id,
                "Mitglied hat Sitzung verlassen"
            );
        }
        entfernt
    }

    /// Snapshot aller Mitglieder einer Sitzung
    pub fn mitglieder(&self, session_id: &SessionId) -> Vec<MitgliedHandle> {
        self.inner
            .sitzungen
            .get(session_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Verbindung, die aktuell unter dieser Client-ID registriert ist
    pub fn verbindung_von(&self, session_id: &SessionId, client_id: &ClientId) -> Option<VerbindungsId> {
        self.inner
            .sitzungen
            .get(session_id)
            .and_then(|m| m.get(client_id).map(MitgliedHandle::verbindung_id))
    }

    /// Entfernt eine Sitzung und schliesst alle ihre Verbindungen
    ///
    /// Gibt die Anzahl geschlossener Verbindungen zurueck.
    pub fn sitzung_schliessen(&self, session_id: &SessionId, grund: SchliessGrund) -> usize {
        let Some((_, mitglieder)) = self.inner.sitzungen.remove(session_id) else {
            return 0;
        };
        for mitglied in mitglieder.values() {
            mitglied.kanal.schliessen(grund.clone());
        }
        mitglieder.len()
    }

    /// Anzahl Sitzungen mit mindestens einem Mitglied
    pub fn sitzungs_anzahl(&self) -> usize {
        self.inner.sitzungen.len()
    }

    /// Anzahl gebundener Verbindungen ueber alle Sitzungen
    pub fn mitglieder_anzahl(&self) -> usize {
        self.inner.sitzungen.iter().map(|s| s.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
