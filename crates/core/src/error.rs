//! Fehlertypen fuer Schleier
//!
//! Untermodule definieren eigene Fehler und konvertieren via `#[from]`.

use thiserror::Error;

/// Globaler Result-Alias fuer Schleier
pub type Result<T> = std::result::Result<T, SchleierError>;

/// Fehler bei der Validierung gemeinsamer Typen
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchleierError {
    #[error("Ungueltige Sitzungs-ID: {0}")]
    UngueltigeSitzungsId(String),

    #[error("Ungueltige Client-ID: {0}")]
    UngueltigeClientId(String),

    #[error("Unbekannte Rolle: {0}")]
    UnbekannteRolle(String),
}
