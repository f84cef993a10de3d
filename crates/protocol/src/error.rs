//! Fehlertypen fuer das Protokoll-Crate

use thiserror::Error;

/// Fehler beim Dekodieren oder Validieren eines Umschlags
#[derive(Debug, Error)]
pub enum ProtokollFehler {
    #[error("Nachricht zu gross: {laenge} Bytes (Maximum: {maximum} Bytes)")]
    ZuGross { laenge: usize, maximum: usize },

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Ungueltiges Base64 in Feld {feld}: {fehler}")]
    Base64 {
        feld: &'static str,
        fehler: base64::DecodeError,
    },

    #[error("Ungueltige Laenge in Feld {feld}: {grund}")]
    FeldLaenge { feld: &'static str, grund: String },
}
