//! Schluessel-Verzeichnis (Key Directory)
//!
//! Verwaltet Schluessel pro Sitzung:
//! - Erstellen beim ersten Abruf (create-or-get, genau ein Gewinner bei Races)
//! - Reine Abfrage ohne Seiteneffekt
//! - Rotation (neue Epoch, alter Schluessel bleibt fuer eine Gnadenfrist abrufbar)
//! - Entfernen inaktiver Sitzungen
//!
//! ## Nebenlaeufigkeit
//! Jeder Eintrag liegt in einem `DashMap`-Shard. Erzeugen und Rotieren laufen
//! unter dem Shard-Lock, Leser klonen nur den `Arc<SchluesselStand>`. Ein
//! Leser sieht also immer ein vollstaendiges (Epoch, Schluessel)-Paar, und
//! Sitzungen in anderen Shards werden nicht blockiert.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ring::rand::SystemRandom;
use schleier_core::SessionId;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{SchluesselError, SchluesselResult};
use crate::material::SchluesselMaterial;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration des Schluessel-Verzeichnisses
#[derive(Debug, Clone)]
pub struct KeyDirectoryConfig {
    /// Wie lange der Schluessel der Vor-Epoch nach einer Rotation abrufbar bleibt
    pub gnadenfrist: Duration,
}

impl Default for KeyDirectoryConfig {
    fn default() -> Self {
        Self {
            gnadenfrist: Duration::from_secs(10),
        }
    }
}

// ---------------------------------------------------------------------------
// Typen
// ---------------------------------------------------------------------------

/// Unveraenderliches (Epoch, Schluessel)-Paar
#[derive(Debug)]
pub struct SchluesselStand {
    pub epoch: u64,
    pub material: SchluesselMaterial,
}

/// Metadaten einer Sitzung (ohne Schluesselmaterial)
#[derive(Debug, Clone)]
pub struct SitzungsInfo {
    pub epoch: u64,
    pub erstellt_am: DateTime<Utc>,
    pub letzte_aktivitaet: Instant,
}

struct Ausgemustert {
    stand: Arc<SchluesselStand>,
    ablauf: Instant,
}

struct SitzungsEintrag {
    aktuell: Arc<SchluesselStand>,
    vorherig: Option<Ausgemustert>,
    erstellt_am: DateTime<Utc>,
    letzte_aktivitaet: Instant,
}

// ---------------------------------------------------------------------------
// KeyDirectory
// ---------------------------------------------------------------------------

/// Verwaltet Sitzungsschluessel fuer alle Sitzungen
pub struct KeyDirectory {
    eintraege: DashMap<SessionId, SitzungsEintrag>,
    config: KeyDirectoryConfig,
    zufall: SystemRandom,
}

impl KeyDirectory {
    pub fn neu(config: KeyDirectoryConfig) -> Self {
        Self {
            eintraege: DashMap::new(),
            config,
            zufall: SystemRandom::new(),
        }
    }

    /// Gibt den aktuellen Schluessel zurueck oder erzeugt ihn in Epoch 0
    ///
    /// Idempotent. Bei gleichzeitigen Erstaufrufen erzeugt genau ein Aufrufer
    /// den Schluessel, alle anderen sehen dessen Ergebnis.
    pub fn hole_oder_erzeuge(&self, session_id: &SessionId) -> SchluesselResult<Arc<SchluesselStand>> {
        let jetzt = Instant::now();
        match self.eintraege.entry(session_id.clone()) {
            Entry::Occupied(mut belegt) => {
                let eintrag = belegt.get_mut();
                eintrag.letzte_aktivitaet = jetzt;
                Ok(Arc::clone(&eintrag.aktuell))
            }
            Entry::Vacant(frei) => {
                let stand = Arc::new(SchluesselStand {
                    epoch: 0,
                    material: SchluesselMaterial::erzeugen(&self.zufall)?,
                });
                frei.insert(SitzungsEintrag {
                    aktuell: Arc::clone(&stand),
                    vorherig: None,
                    erstellt_am: Utc::now(),
                    letzte_aktivitaet: jetzt,
                });
                tracing::info!(session = %session_id, epoch = 0, "Sitzungsschluessel erzeugt");
                Ok(stand)
            }
        }
    }

    /// Reine Abfrage des aktuellen Schluessels, ohne Seiteneffekt
    pub fn hole(&self, session_id: &SessionId) -> SchluesselResult<Arc<SchluesselStand>> {
        self.eintraege
            .get(session_id)
            .map(|eintrag| Arc::clone(&eintrag.aktuell))
            .ok_or_else(|| SchluesselError::NichtGefunden(session_id.to_string()))
    }

    /// Gibt den Schluessel einer bestimmten Epoch zurueck
    ///
    /// Erfolgreich fuer die aktuelle Epoch und fuer die Vor-Epoch, solange
    /// deren Gnadenfrist nicht abgelaufen ist.
    pub fn schluessel_fuer_epoch(
        &self,
        session_id: &SessionId,
        epoch: u64,
    ) -> SchluesselResult<Arc<SchluesselStand>> {
        let nicht_gefunden = || SchluesselError::NichtGefunden(format!("{session_id}@{epoch}"));
        let eintrag = self.eintraege.get(session_id).ok_or_else(nicht_gefunden)?;

        if eintrag.aktuell.epoch == epoch {
            return Ok(Arc::clone(&eintrag.aktuell));
        }
        match &eintrag.vorherig {
            Some(alt) if alt.stand.epoch == epoch && Instant::now() < alt.ablauf => {
                Ok(Arc::clone(&alt.stand))
            }
            _ => Err(nicht_gefunden()),
        }
    }

    /// Rotiert den Schluessel einer Sitzung (Epoch + 1, neues Material)
    ///
    /// Der bisherige Schluessel bleibt fuer die Gnadenfrist abrufbar.
    pub fn rotieren(&self, session_id: &SessionId) -> SchluesselResult<Arc<SchluesselStand>> {
        let mut eintrag = self
            .eintraege
            .get_mut(session_id)
            .ok_or_else(|| SchluesselError::NichtGefunden(session_id.to_string()))?;

        let epoch = eintrag
            .aktuell
            .epoch
            .checked_add(1)
            .ok_or_else(|| SchluesselError::EpochUeberlauf(session_id.to_string()))?;

        let mut material = SchluesselMaterial::erzeugen(&self.zufall)?;
        while material == eintrag.aktuell.material {
            material = SchluesselMaterial::erzeugen(&self.zufall)?;
        }

        let jetzt = Instant::now();
        let neu = Arc::new(SchluesselStand { epoch, material });
        let alt = std::mem::replace(&mut eintrag.aktuell, Arc::clone(&neu));
        eintrag.vorherig = Some(Ausgemustert {
            stand: alt,
            ablauf: jetzt + self.config.gnadenfrist,
        });
        eintrag.letzte_aktivitaet = jetzt;

        tracing::info!(session = %session_id, epoch, "Sitzungsschluessel rotiert");
        Ok(neu)
    }

    /// Markiert Aktivitaet auf einer Sitzung (verschiebt die Eviction)
    ///
    /// Kein Effekt, wenn die Sitzung keinen Schluessel hat.
    pub fn aktivitaet_melden(&self, session_id: &SessionId) {
        if let Some(mut eintrag) = self.eintraege.get_mut(session_id) {
            eintrag.letzte_aktivitaet = Instant::now();
        }
    }

    /// Gibt die IDs aller Sitzungen zurueck, die laenger als `ttl` inaktiv sind
    pub fn inaktive_sitzungen(&self, ttl: Duration) -> Vec<SessionId> {
        let jetzt = Instant::now();
        self.eintraege
            .iter()
            .filter(|e| jetzt.duration_since(e.letzte_aktivitaet) >= ttl)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Entfernt eine Sitzung, falls sie noch immer laenger als `ttl` inaktiv ist
    ///
    /// Die Pruefung laeuft unter dem Shard-Lock, damit eine gleichzeitige
    /// Aktivitaet die Entfernung verhindert.
    pub fn entfernen_falls_inaktiv(&self, session_id: &SessionId, ttl: Duration) -> bool {
        let jetzt = Instant::now();
        let entfernt = self
            .eintraege
            .remove_if(session_id, |_, e| {
                jetzt.duration_since(e.letzte_aktivitaet) >= ttl
            })
            .is_some();
        if entfernt {
            tracing::info!(session = %session_id, "Inaktive Sitzung entfernt");
        }
        entfernt
    }

    /// Entfernt eine Sitzung bedingungslos
    pub fn entfernen(&self, session_id: &SessionId) -> bool {
        self.eintraege.remove(session_id).is_some()
    }

    /// Verwirft Schluessel der Vor-Epoch, deren Gnadenfrist abgelaufen ist
    ///
    /// Gibt die Anzahl der verworfenen Schluessel zurueck.
    pub fn ausgemusterte_bereinigen(&self) -> usize {
        let jetzt = Instant::now();
        let mut verworfen = 0;
        self.eintraege.iter_mut().for_each(|mut e| {
            if matches!(&e.vorherig, Some(alt) if jetzt >= alt.ablauf) {
                e.vorherig = None;
                verworfen += 1;
            }
        });
        verworfen
    }

    /// Metadaten einer Sitzung
    pub fn sitzung_info(&self, session_id: &SessionId) -> Option<SitzungsInfo> {
        self.eintraege.get(session_id).map(|e| SitzungsInfo {
            epoch: e.aktuell.epoch,
            erstellt_am: e.erstellt_am,
            letzte_aktivitaet: e.letzte_aktivitaet,
        })
    }

    /// Anzahl der Sitzungen mit Schluessel
    pub fn anzahl(&self) -> usize {
        self.eintraege.len()
    }
}

impl Default for KeyDirectory {
    fn default() -> Self {
        Self::neu(KeyDirectoryConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
