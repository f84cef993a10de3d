//! schleier-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Schleier-Crates gemeinsam genutzt werden: validierte IDs fuer
//! Sitzungen, Clients und Verbindungen sowie Rollen und Stream-Arten.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{Result, SchleierError};
pub use types::{ClientId, Rolle, SessionId, StreamArt, VerbindungsId};
