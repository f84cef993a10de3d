//! schleier-relay – Relay-Broker fuer verschluesselte Sitzungen
//!
//! Dieser Crate bindet WebSocket-Verbindungen an Sitzungen, prueft
//! Frame-Zaehler gegen Replays und verteilt opake Frames an die anderen
//! Mitglieder einer Sitzung. Entschluesselt wird nie.
//!
//! ## Architektur
//!
//! ```text
//! WebSocket-Listener (relay_bedienen, /ws?sessionId=...)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |  State Machine: Ungebunden -> Gebunden -> Geschlossen
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     +-- SessionRegistry  (Sitzung -> gebundene Verbindungen)
//!     +-- ReplayGuard      (Sliding-Window pro Absender und Stream-Art)
//!     +-- KeyDirectory     (Rotation)
//!     +-- Fan-out          (begrenzte Send-Queues, Trennung bei Ueberlauf)
//!
//! Bereiniger – entfernt inaktive Sitzungen und schliesst deren Verbindungen
//! ```

pub mod broadcast;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod eviction;
pub mod registry;
pub mod replay;
pub mod state;
pub mod ws;

// Bequeme Re-Exporte
pub use broadcast::{SchliessGrund, SendeKanal};
pub use connection::ClientConnection;
pub use dispatcher::{Antwort, MessageDispatcher, VerbindungsKontext, Zustand};
pub use error::{RelayError, RelayResult};
pub use eviction::{Bereiniger, BereinigungsBericht};
pub use registry::{DuplikatStrategie, MitgliedHandle, SessionRegistry};
pub use replay::{ReplayEntscheidung, ReplayFenster, ReplayGuard};
pub use state::{RelayConfig, RelayState};
pub use ws::{relay_bedienen, relay_router};
