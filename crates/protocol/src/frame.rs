//! Opaker Frame-Umschlag
//!
//! Ein Frame ist eine verschluesselte Einheit (AEAD). Das Relay liest genau
//! die Felder `kind`, `ivB64`, `aadB64`, `payloadB64` und `counter`, prueft
//! deren Form und leitet sie unveraendert weiter. Entschluesselt wird nie.
//!
//! ## Pruefungen
//! - `ivB64`: Base64, exakt 12 Bytes Nonce
//! - `aadB64`: Base64, nicht leer (bindet mindestens `kind:counter`)
//! - `payloadB64`: Base64, Chiffrat inklusive 16 Byte Authentifizierungs-Tag

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use schleier_core::{ClientId, StreamArt};
use serde::{Deserialize, Serialize};

use crate::error::ProtokollFehler;

/// Laenge der AEAD-Nonce in Bytes
pub const NONCE_LAENGE: usize = 12;

/// Laenge des AEAD-Authentifizierungs-Tags in Bytes
pub const TAG_LAENGE: usize = 16;

/// Frame wie vom Client gesendet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameUmschlag {
    pub kind: StreamArt,
    #[serde(alias = "nonce")]
    pub iv_b64: String,
    pub aad_b64: String,
    pub payload_b64: String,
    pub counter: u64,
}

impl FrameUmschlag {
    /// Prueft die Form der relay-sichtbaren Felder
    ///
    /// Der Inhalt bleibt uninterpretiert; nur Kodierung und Laengen werden
    /// geprueft, damit offensichtlich kaputte Frames nicht verteilt werden.
    pub fn pruefen(&self) -> Result<(), ProtokollFehler> {
        let nonce = dekodieren("ivB64", &self.iv_b64)?;
        if nonce.len() != NONCE_LAENGE {
            return Err(ProtokollFehler::FeldLaenge {
                feld: "ivB64",
                grund: format!("erwartet {} Bytes, erhalten {}", NONCE_LAENGE, nonce.len()),
            });
        }

        let aad = dekodieren("aadB64", &self.aad_b64)?;
        if aad.is_empty() {
            return Err(ProtokollFehler::FeldLaenge {
                feld: "aadB64",
                grund: "darf nicht leer sein".into(),
            });
        }

        let payload = dekodieren("payloadB64", &self.payload_b64)?;
        if payload.len() < TAG_LAENGE {
            return Err(ProtokollFehler::FeldLaenge {
                feld: "payloadB64",
                grund: format!(
                    "mindestens {} Bytes (Tag) erwartet, erhalten {}",
                    TAG_LAENGE,
                    payload.len()
                ),
            });
        }

        Ok(())
    }
}

fn dekodieren(feld: &'static str, wert: &str) -> Result<Vec<u8>, ProtokollFehler> {
    STANDARD
        .decode(wert)
        .map_err(|fehler| ProtokollFehler::Base64 { feld, fehler })
}

/// Frame wie vom Relay an die Sitzungs-Peers verteilt
///
/// `clientId` wird vom Relay aus der gebundenen Verbindung gesetzt, damit
/// Empfaenger Zaehler pro Absender fuehren koennen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameWeiterleitung {
    pub client_id: ClientId,
    pub kind: StreamArt,
    pub iv_b64: String,
    pub aad_b64: String,
    pub payload_b64: String,
    pub counter: u64,
}

impl FrameWeiterleitung {
    pub fn neu(absender: ClientId, frame: FrameUmschlag) -> Self {
        Self {
            client_id: absender,
            kind: frame.kind,
            iv_b64: frame.iv_b64,
            aad_b64: frame.aad_b64,
            payload_b64: frame.payload_b64,
            counter: frame.counter,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn gueltiger_frame(counter: u64) -> FrameUmschlag {
        FrameUmschlag {
            kind: StreamArt::Chat,
            iv_b64: STANDARD.encode([7u8; NONCE_LAENGE]),
            aad_b64: STANDARD.encode(format!("chat:{counter}")),
            payload_b64: STANDARD.encode([1u8; 40]),
            counter,
        }
    }

    #[test]
    fn gueltiger_frame_besteht_pruefung() {
        assert!(gueltiger_frame(1).pruefen().is_ok());
    }

    #[test]
    fn falsche_nonce_laenge() {
        let mut frame = gueltiger_frame(1);
        frame.iv_b64 = STANDARD.encode([0u8; 8]);
        assert!(matches!(
            frame.pruefen(),
            Err(ProtokollFehler::FeldLaenge { feld: "ivB64", .. })
        ));
    }

    #[test]
    fn leere_aad_abgelehnt() {
        let mut frame = gueltiger_frame(1);
        frame.aad_b64 = String::new();
        assert!(frame.pruefen().is_err());
    }

    #[test]
    fn payload_kuerzer_als_tag_abgelehnt() {
        let mut frame = gueltiger_frame(1);
        frame.payload_b64 = STANDARD.encode([0u8; TAG_LAENGE - 1]);
        assert!(frame.pruefen().is_err());
    }

    #[test]
    fn kaputtes_base64_abgelehnt() {
        let mut frame = gueltiger_frame(1);
        frame.payload_b64 = "%%%".into();
        assert!(matches!(
            frame.pruefen(),
            Err(ProtokollFehler::Base64 { feld: "payloadB64", .. })
        ));
    }

    #[test]
    fn nonce_alias_wird_akzeptiert() {
        let json = format!(
            r#"{{"kind":"media","nonce":"{}","aadB64":"{}","payloadB64":"{}","counter":5}}"#,
            STANDARD.encode([0u8; 12]),
            STANDARD.encode("media:5"),
            STANDARD.encode([0u8; 16]),
        );
        let frame: FrameUmschlag = serde_json::from_str(&json).unwrap();
        assert_eq!(frame.kind, StreamArt::Media);
        assert_eq!(frame.counter, 5);
        assert!(frame.pruefen().is_ok());
    }

    #[test]
    fn weiterleitung_uebernimmt_felder() {
        let frame = gueltiger_frame(9);
        let weiter = FrameWeiterleitung::neu(ClientId::neu("v1").unwrap(), frame.clone());
        assert_eq!(weiter.counter, 9);
        assert_eq!(weiter.payload_b64, frame.payload_b64);
        assert_eq!(weiter.client_id.as_str(), "v1");
    }
}
