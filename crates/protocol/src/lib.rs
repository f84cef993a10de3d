//! schleier-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert alle Nachrichtentypen, die zwischen Client und
//! Relay ausgetauscht werden:
//! - `control` – JSON-Control-Umschlag mit Diskriminante `type`
//! - `frame` – opaker, verschluesselter Frame (Relay liest nur Metadaten)
//! - `wire` – Text-Codec mit Groessenlimit

pub mod control;
pub mod error;
pub mod frame;
pub mod wire;

pub use control::{
    ChatNachricht, ChatWeiterleitung, ClientNachricht, FehlerCode, FehlerMeldung, HelloAnfrage,
    MetrikNachricht, RotationsAnfrage, RotationsMeldung, ServerNachricht,
};
pub use error::ProtokollFehler;
pub use frame::{FrameUmschlag, FrameWeiterleitung, NONCE_LAENGE, TAG_LAENGE};
pub use wire::NachrichtenCodec;
