//! Fehlertypen fuer den Relay-Broker
//!
//! Fehler einer einzelnen Verbindung laufen nicht ueber diesen Typ, sondern
//! enden als `SchliessGrund` mit `error`-Umschlag und Close-Frame.

use thiserror::Error;

/// Fehlertyp fuer den Relay-Broker
#[derive(Debug, Error)]
pub enum RelayError {
    /// IO-Fehler (Listener)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Client-ID ist in der Sitzung bereits registriert
    #[error("Client {client} ist in Sitzung {session} bereits registriert")]
    DoppelterClient { session: String, client: String },
}

/// Result-Typ fuer den Relay-Broker
pub type RelayResult<T> = Result<T, RelayError>;
