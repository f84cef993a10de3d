//! Control-Protokoll (JSON-Textnachrichten)
//!
//! Definiert alle Steuerungsnachrichten, die ueber die WebSocket-Verbindung
//! zwischen Client und Relay ausgetauscht werden.
//!
//! ## Design
//! - Tagged Enums mit Diskriminante `type` fuer typsichere Nachrichtentypen
//! - Feldnamen in camelCase (Browser-Clients)
//! - Client->Relay und Relay->Client sind getrennte Enums: eine vom Client
//!   gesendete Relay-Nachricht (`pong`, `keyRotated`, ...) ist nicht
//!   dekodierbar und damit ein Protokollfehler

use schleier_core::{ClientId, Rolle, SessionId};
use serde::{Deserialize, Serialize};

use crate::frame::{FrameUmschlag, FrameWeiterleitung};

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Standardisierte Fehler-Codes fuer `error`-Nachrichten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FehlerCode {
    ProtocolError,
    NotFound,
    DuplicateClient,
    Overloaded,
    SessionEvicted,
    Timeout,
    Shutdown,
}

// ---------------------------------------------------------------------------
// Client -> Relay
// ---------------------------------------------------------------------------

/// Bindet die Verbindung an eine Sitzung
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloAnfrage {
    pub role: Rolle,
    pub session_id: SessionId,
    pub client_id: ClientId,
}

/// Klartext-Chat ueber den Control-Kanal (Legacy-Pfad, unverschluesselt)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatNachricht {
    pub text: String,
    /// Vom Client behauptete ID; das Relay ersetzt sie durch die gebundene
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<f64>,
}

/// Liveness-Probe, wird sofort mit `pong` beantwortet
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetrikNachricht {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<f64>,
}

/// Bitte um Schluesselrotation der gebundenen Sitzung
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RotationsAnfrage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Alle Nachrichten, die ein Client an das Relay senden darf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientNachricht {
    Hello(HelloAnfrage),
    Chat(ChatNachricht),
    Metric(MetrikNachricht),
    Rotate(RotationsAnfrage),
    Frame(FrameUmschlag),
}

impl ClientNachricht {
    /// Kurzname fuer Logs (entspricht der `type`-Diskriminante)
    pub fn typ_name(&self) -> &'static str {
        match self {
            Self::Hello(_) => "hello",
            Self::Chat(_) => "chat",
            Self::Metric(_) => "metric",
            Self::Rotate(_) => "rotate",
            Self::Frame(_) => "frame",
        }
    }
}

// ---------------------------------------------------------------------------
// Relay -> Client
// ---------------------------------------------------------------------------

/// Weitergeleiteter Klartext-Chat mit der vom Relay gestempelten Client-ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatWeiterleitung {
    pub text: String,
    pub client_id: ClientId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<f64>,
}

/// Benachrichtigung ueber eine neue Schluessel-Epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationsMeldung {
    pub epoch: u64,
}

/// Fehlermeldung vor (oder statt) dem Schliessen der Verbindung
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FehlerMeldung {
    pub code: FehlerCode,
    pub message: String,
}

/// Alle Nachrichten, die das Relay an Clients sendet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerNachricht {
    Pong,
    Chat(ChatWeiterleitung),
    Frame(FrameWeiterleitung),
    KeyRotated(RotationsMeldung),
    Error(FehlerMeldung),
}

impl ServerNachricht {
    /// Erstellt eine Fehlermeldung
    pub fn fehler(code: FehlerCode, message: impl Into<String>) -> Self {
        Self::Error(FehlerMeldung {
            code,
            message: message.into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use schleier_core::StreamArt;

    #[test]
    fn hello_dekodieren() {
        let json = r#"{"type":"hello","role":"host","sessionId":"demo","clientId":"h1"}"#;
        let nachricht: ClientNachricht = serde_json::from_str(json).unwrap();
        match nachricht {
            ClientNachricht::Hello(h) => {
                assert_eq!(h.role, Rolle::Host);
                assert_eq!(h.session_id.as_str(), "demo");
                assert_eq!(h.client_id.as_str(), "h1");
            }
            andere => panic!("Falscher Typ: {:?}", andere),
        }
    }

    #[test]
    fn hello_mit_ungueltiger_sitzung_schlaegt_fehl() {
        let json = r#"{"type":"hello","role":"host","sessionId":"","clientId":"h1"}"#;
        assert!(serde_json::from_str::<ClientNachricht>(json).is_err());
    }

    #[test]
    fn rotate_ohne_grund() {
        let nachricht: ClientNachricht = serde_json::from_str(r#"{"type":"rotate"}"#).unwrap();
        assert_eq!(nachricht, ClientNachricht::Rotate(RotationsAnfrage::default()));
    }

    #[test]
    fn metric_mit_zeitstempel() {
        let nachricht: ClientNachricht =
            serde_json::from_str(r#"{"type":"metric","ts":1700000000000}"#).unwrap();
        assert_eq!(nachricht.typ_name(), "metric");
    }

    #[test]
    fn relay_nachricht_vom_client_ist_ungueltig() {
        assert!(serde_json::from_str::<ClientNachricht>(r#"{"type":"pong"}"#).is_err());
        assert!(serde_json::from_str::<ClientNachricht>(r#"{"type":"keyRotated","epoch":1}"#).is_err());
        assert!(serde_json::from_str::<ClientNachricht>(r#"{"text":"ohne typ"}"#).is_err());
    }

    #[test]
    fn pong_serialisierung() {
        let json = serde_json::to_string(&ServerNachricht::Pong).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }

    #[test]
    fn key_rotated_serialisierung() {
        let json =
            serde_json::to_string(&ServerNachricht::KeyRotated(RotationsMeldung { epoch: 3 }))
                .unwrap();
        assert_eq!(json, r#"{"type":"keyRotated","epoch":3}"#);
    }

    #[test]
    fn fehler_serialisierung() {
        let json = serde_json::to_string(&ServerNachricht::fehler(
            FehlerCode::ProtocolError,
            "hello erwartet",
        ))
        .unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains(r#""code":"PROTOCOL_ERROR""#));
    }

    #[test]
    fn frame_weiterleitung_traegt_absender() {
        let weiter = FrameWeiterleitung {
            client_id: ClientId::neu("h1").unwrap(),
            kind: StreamArt::Media,
            iv_b64: "AAAAAAAAAAAAAAAA".into(),
            aad_b64: "bWVkaWE6MQ==".into(),
            payload_b64: "AAAAAAAAAAAAAAAAAAAAAA==".into(),
            counter: 1,
        };
        let json = serde_json::to_string(&ServerNachricht::Frame(weiter)).unwrap();
        assert!(json.contains(r#""type":"frame""#));
        assert!(json.contains(r#""clientId":"h1""#));
        assert!(json.contains(r#""ivB64""#));
    }
}
