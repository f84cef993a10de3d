//! Replay-Schutz (Sliding-Window Anti-Replay)
//!
//! Pro (Sitzung, Absender, Stream-Art) werden der hoechste akzeptierte
//! Zaehler und eine Bitmap der letzten `W` Zaehler gefuehrt (W <= 64).
//! Bit `i` steht fuer den Zaehler `hoechster - i`.
//!
//! - Zaehler > hoechster: akzeptieren, Bitmap verschieben, Bit 0 setzen
//! - Zaehler im Fenster: akzeptieren, falls das Bit noch nicht gesetzt ist
//! - Zaehler <= hoechster - W: veraltet
//!
//! Der Speicher pro Tripel ist konstant, unabhaengig vom Verkehr.

use dashmap::DashMap;
use schleier_core::{ClientId, SessionId, StreamArt};
use std::collections::HashMap;

/// Maximale Fensterbreite (Bits der Bitmap)
pub const MAX_FENSTER: u32 = u64::BITS;

/// Ergebnis der Replay-Pruefung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayEntscheidung {
    Akzeptiert,
    /// Zaehler wurde im Fenster bereits gesehen
    Duplikat,
    /// Zaehler liegt unterhalb des Fensters
    Veraltet,
}

impl ReplayEntscheidung {
    pub fn ist_akzeptiert(&self) -> bool {
        matches!(self, Self::Akzeptiert)
    }

    /// Label fuer `schleier_frames_abgelehnt_total{grund}`
    pub fn label(&self) -> &'static str {
        match self {
            Self::Akzeptiert => "akzeptiert",
            Self::Duplikat => "duplikat",
            Self::Veraltet => "veraltet",
        }
    }
}

// ---------------------------------------------------------------------------
// ReplayFenster
// ---------------------------------------------------------------------------

/// Fensterzustand eines einzelnen (Sitzung, Absender, Art)-Tripels
#[derive(Debug, Clone)]
pub struct ReplayFenster {
    hoechster: Option<u64>,
    bitmap: u64,
    breite: u32,
}

impl ReplayFenster {
    /// Erstellt ein leeres Fenster; `breite` wird auf 1..=64 begrenzt
    pub fn neu(breite: u32) -> Self {
        Self {
            hoechster: None,
            bitmap: 0,
            breite: breite.clamp(1, MAX_FENSTER),
        }
    }

    pub fn hoechster(&self) -> Option<u64> {
        self.hoechster
    }

    /// Prueft einen Zaehler und markiert ihn bei Akzeptanz als gesehen
    pub fn pruefen(&mut self, zaehler: u64) -> ReplayEntscheidung {
        let Some(hoechster) = self.hoechster else {
            self.hoechster = Some(zaehler);
            self.bitmap = 1;
            return ReplayEntscheidung::Akzeptiert;
        };

        if zaehler > hoechster {
            let verschiebung = zaehler - hoechster;
            self.bitmap = if verschiebung >= u64::from(MAX_FENSTER) {
                0
            } else {
                self.bitmap << verschiebung
            };
            self.bitmap |= 1;
            self.hoechster = Some(zaehler);
            return ReplayEntscheidung::Akzeptiert;
        }

        let abstand = hoechster - zaehler;
        if abstand >= u64::from(self.breite) {
            return ReplayEntscheidung::Veraltet;
        }

        let maske = 1u64 << abstand;
        if self.bitmap & maske != 0 {
            return ReplayEntscheidung::Duplikat;
        }
        self.bitmap |= maske;
        ReplayEntscheidung::Akzeptiert
    }
}

// ---------------------------------------------------------------------------
// ReplayGuard
// ---------------------------------------------------------------------------

/// Replay-Schutz fuer alle Sitzungen
///
/// Fenster einer Sitzung liegen gemeinsam in einem `DashMap`-Eintrag;
/// Sitzungen in anderen Shards werden nicht blockiert.
pub struct ReplayGuard {
    sitzungen: DashMap<SessionId, HashMap<(ClientId, StreamArt), ReplayFenster>>,
    breite: u32,
}

impl ReplayGuard {
    pub fn neu(breite: u32) -> Self {
        Self {
            sitzungen: DashMap::new(),
            breite: breite.clamp(1, MAX_FENSTER),
        }
    }

    pub fn breite(&self) -> u32 {
        self.breite
    }

    /// Prueft einen Frame-Zaehler fuer (Sitzung, Absender, Art)
    ///
    /// Das Fenster wird beim ersten Frame des Tripels angelegt.
    pub fn pruefen(
        &self,
        session_id: &SessionId,
        absender: &ClientId,
        art: StreamArt,
        zaehler: u64,
    ) -> ReplayEntscheidung {
        let mut fenster = self.sitzungen.entry(session_id.clone()).or_default();
        fenster
            .entry((absender.clone(), art))
            .or_insert_with(|| ReplayFenster::neu(self.breite))
            .pruefen(zaehler)
    }

    /// Verwirft alle Fenster eines Absenders (Verbindungsende)
    pub fn client_vergessen(&self, session_id: &SessionId, absender: &ClientId) {
        let mut leer = false;
        if let Some(mut fenster) = self.sitzungen.get_mut(session_id) {
            fenster.retain(|(client, _), _| client != absender);
            leer = fenster.is_empty();
        }
        if leer {
            self.sitzungen.remove_if(session_id, |_, f| f.is_empty());
        }
    }

    /// Verwirft alle Fenster einer Sitzung (Sitzungsende)
    pub fn sitzung_vergessen(&self, session_id: &SessionId) {
        self.sitzungen.remove(session_id);
    }

    /// Anzahl gefuehrter Fenster ueber alle Sitzungen
    pub fn fenster_anzahl(&self) -> usize {
        self.sitzungen.iter().map(|s| s.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
