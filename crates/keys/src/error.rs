//! Fehlertypen fuer das Schluessel-Verzeichnis

use thiserror::Error;

/// Fehler im Schluessel-Verzeichnis
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchluesselError {
    /// Fuer die Sitzung (oder Epoch) existiert kein Schluessel
    #[error("Kein Schluessel fuer Sitzung {0}")]
    NichtGefunden(String),

    #[error("Zufallsquelle nicht verfuegbar")]
    Zufallsquelle,

    #[error("Epoch-Ueberlauf fuer Sitzung {0}")]
    EpochUeberlauf(String),
}

impl SchluesselError {
    pub fn ist_nicht_gefunden(&self) -> bool {
        matches!(self, Self::NichtGefunden(_))
    }
}

pub type SchluesselResult<T> = Result<T, SchluesselError>;
