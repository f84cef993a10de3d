//! Gemeinsame Identifikationstypen fuer Schleier
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen. Sitzungs- und
//! Client-IDs werden vom Aufrufer geliefert und beim Erzeugen validiert.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SchleierError;

/// Maximale Laenge einer Sitzungs- oder Client-ID in Bytes
pub const MAX_ID_LAENGE: usize = 128;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Sitzungs-ID: ASCII, 1–128 Bytes, vom Aufrufer gewaehlt
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Validiert und erstellt eine SessionId
    pub fn neu(wert: impl Into<String>) -> Result<Self, SchleierError> {
        let wert = wert.into();
        if wert.is_empty() || wert.len() > MAX_ID_LAENGE {
            return Err(SchleierError::UngueltigeSitzungsId(format!(
                "Laenge {} ausserhalb 1..={}",
                wert.len(),
                MAX_ID_LAENGE
            )));
        }
        if !wert.is_ascii() {
            return Err(SchleierError::UngueltigeSitzungsId(
                "nur ASCII erlaubt".into(),
            ));
        }
        Ok(Self(wert))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionId {
    type Error = SchleierError;

    fn try_from(wert: String) -> Result<Self, Self::Error> {
        Self::neu(wert)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// ClientId
// ---------------------------------------------------------------------------

/// Client-ID: vom Client gewaehlt, 1–128 Bytes, keine Steuerzeichen
///
/// Sollte global eindeutig sein, wird aber nicht dedupliziert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);

impl ClientId {
    /// Validiert und erstellt eine ClientId
    pub fn neu(wert: impl Into<String>) -> Result<Self, SchleierError> {
        let wert = wert.into();
        if wert.is_empty() || wert.len() > MAX_ID_LAENGE {
            return Err(SchleierError::UngueltigeClientId(format!(
                "Laenge {} ausserhalb 1..={}",
                wert.len(),
                MAX_ID_LAENGE
            )));
        }
        if wert.chars().any(char::is_control) {
            return Err(SchleierError::UngueltigeClientId(
                "Steuerzeichen nicht erlaubt".into(),
            ));
        }
        Ok(Self(wert))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ClientId {
    type Error = SchleierError;

    fn try_from(wert: String) -> Result<Self, Self::Error> {
        Self::neu(wert)
    }
}

impl From<ClientId> for String {
    fn from(id: ClientId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// VerbindungsId
// ---------------------------------------------------------------------------

/// Serverseitig vergebene ID einer einzelnen Transport-Verbindung
///
/// Unterscheidet zwei Verbindungen mit derselben ClientId.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerbindungsId(pub Uuid);

impl VerbindungsId {
    /// Erstellt eine neue zufaellige VerbindungsId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VerbindungsId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VerbindungsId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "verbindung:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Rolle & StreamArt
// ---------------------------------------------------------------------------

/// Rolle eines Clients innerhalb einer Sitzung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rolle {
    Host,
    Viewer,
}

impl std::fmt::Display for Rolle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Viewer => f.write_str("viewer"),
        }
    }
}

impl std::str::FromStr for Rolle {
    type Err = SchleierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(Self::Host),
            "viewer" => Ok(Self::Viewer),
            andere => Err(SchleierError::UnbekannteRolle(andere.to_string())),
        }
    }
}

/// Art eines verschluesselten Streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamArt {
    Chat,
    Media,
}

impl StreamArt {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Media => "media",
        }
    }
}

impl std::fmt::Display for StreamArt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.als_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
