//! Wire-Format fuer WebSocket-Nachrichten
//!
//! Jede Transport-Nachricht (Text oder Binaer) enthaelt genau einen
//! JSON-Umschlag. Binaere Nachrichten werden als UTF-8-JSON interpretiert.
//! Ein Umschlag ohne `type`-Feld ist ein nackter Frame
//! (`kind, ivB64, aadB64, payloadB64, counter`); `"type":"frame"` wird
//! ebenfalls akzeptiert.
//! Die maximale Nachrichtengroesse ist konfigurierbar (Standard: 64 KiB).

use crate::control::{ClientNachricht, ServerNachricht};
use crate::error::ProtokollFehler;
use crate::frame::FrameUmschlag;

/// Standard-maximale Nachrichtengroesse (64 KiB)
pub const STANDARD_MAX_NACHRICHT_BYTES: usize = 64 * 1024;

/// Kodiert und dekodiert Umschlaege mit Groessenlimit
#[derive(Debug, Clone, Copy)]
pub struct NachrichtenCodec {
    max_bytes: usize,
}

impl NachrichtenCodec {
    /// Erstellt einen Codec mit Standard-Limit
    pub fn new() -> Self {
        Self {
            max_bytes: STANDARD_MAX_NACHRICHT_BYTES,
        }
    }

    /// Erstellt einen Codec mit benutzerdefinierter maximaler Groesse
    pub fn with_max_size(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Dekodiert eine Text-Nachricht
    pub fn dekodieren_text(&self, text: &str) -> Result<ClientNachricht, ProtokollFehler> {
        self.dekodieren_binaer(text.as_bytes())
    }

    /// Dekodiert eine binaere Nachricht (JSON-Bytes)
    ///
    /// Frames werden dabei zusaetzlich auf ihre Form geprueft.
    pub fn dekodieren_binaer(&self, bytes: &[u8]) -> Result<ClientNachricht, ProtokollFehler> {
        if bytes.len() > self.max_bytes {
            return Err(ProtokollFehler::ZuGross {
                laenge: bytes.len(),
                maximum: self.max_bytes,
            });
        }
        let wert: serde_json::Value = serde_json::from_slice(bytes)?;
        let nachricht = if wert.get("type").is_some() {
            serde_json::from_value::<ClientNachricht>(wert)?
        } else {
            ClientNachricht::Frame(serde_json::from_value::<FrameUmschlag>(wert)?)
        };
        if let ClientNachricht::Frame(ref frame) = nachricht {
            frame.pruefen()?;
        }
        Ok(nachricht)
    }

    /// Kodiert eine Relay-Nachricht als JSON-Text
    pub fn kodieren(&self, nachricht: &ServerNachricht) -> Result<String, ProtokollFehler> {
        let json = serde_json::to_string(nachricht)?;
        if json.len() > self.max_bytes {
            return Err(ProtokollFehler::ZuGross {
                laenge: json.len(),
                maximum: self.max_bytes,
            });
        }
        Ok(json)
    }
}

impl Default for NachrichtenCodec {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{FehlerCode, RotationsMeldung};

    #[test]
    fn default_max_size() {
        assert_eq!(NachrichtenCodec::default().max_bytes(), STANDARD_MAX_NACHRICHT_BYTES);
    }

    #[test]
    fn text_dekodieren() {
        let codec = NachrichtenCodec::new();
        let nachricht = codec.dekodieren_text(r#"{"type":"metric","ts":1}"#).unwrap();
        assert_eq!(nachricht.typ_name(), "metric");
    }

    #[test]
    fn zu_grosse_nachricht_abgelehnt() {
        let codec = NachrichtenCodec::with_max_size(16);
        let ergebnis = codec.dekodieren_text(r#"{"type":"chat","text":"viel zu lang"}"#);
        assert!(matches!(ergebnis, Err(ProtokollFehler::ZuGross { maximum: 16, .. })));
    }

    #[test]
    fn kaputtes_json_abgelehnt() {
        let codec = NachrichtenCodec::new();
        assert!(matches!(
            codec.dekodieren_text("{kein json"),
            Err(ProtokollFehler::Json(_))
        ));
    }

    #[test]
    fn binaerer_frame_mit_kaputter_nonce_abgelehnt() {
        let codec = NachrichtenCodec::new();
        let json = br#"{"type":"frame","kind":"chat","ivB64":"AAAA","aadB64":"Y2hhdDox","payloadB64":"AAAAAAAAAAAAAAAAAAAAAA==","counter":1}"#;
        assert!(matches!(
            codec.dekodieren_binaer(json),
            Err(ProtokollFehler::FeldLaenge { feld: "ivB64", .. })
        ));
    }

    #[test]
    fn frame_ohne_type_feld_wird_als_frame_dekodiert() {
        let codec = NachrichtenCodec::new();
        let json = r#"{"kind":"media","ivB64":"AAAAAAAAAAAAAAAA","aadB64":"bWVkaWE6Nw==","payloadB64":"AAAAAAAAAAAAAAAAAAAAAA==","counter":7}"#;
        match codec.dekodieren_text(json).unwrap() {
            ClientNachricht::Frame(frame) => assert_eq!(frame.counter, 7),
            andere => panic!("Frame erwartet, bekommen: {}", andere.typ_name()),
        }

        let mit_typ = format!(r#"{{"type":"frame",{}"#, &json[1..]);
        assert_eq!(codec.dekodieren_text(&mit_typ).unwrap().typ_name(), "frame");
    }

    #[test]
    fn unbekannter_typ_bleibt_fehler() {
        let codec = NachrichtenCodec::new();
        assert!(matches!(
            codec.dekodieren_text(r#"{"type":"teleport","kind":"chat"}"#),
            Err(ProtokollFehler::Json(_))
        ));
        // ohne type und ohne Frame-Felder
        assert!(codec.dekodieren_text(r#"{"ts":1}"#).is_err());
    }

    #[test]
    fn kodieren_und_limit() {
        let codec = NachrichtenCodec::new();
        let json = codec
            .kodieren(&ServerNachricht::KeyRotated(RotationsMeldung { epoch: 1 }))
            .unwrap();
        assert_eq!(json, r#"{"type":"keyRotated","epoch":1}"#);

        let klein = NachrichtenCodec::with_max_size(8);
        assert!(klein
            .kodieren(&ServerNachricht::fehler(FehlerCode::Timeout, "zu lang"))
            .is_err());
    }
}
