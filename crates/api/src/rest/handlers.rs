//! REST-Handler fuer Sitzungs-Endpunkte

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use schleier_core::SessionId;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::rest::ApiState;

/// Request-Body fuer `/session` und `/join`
///
/// Der Body wird unabhaengig vom Content-Type als JSON gelesen, damit
/// Browser-Clients ihn als `text/plain` ohne Preflight schicken koennen.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SitzungsAnfrage {
    #[serde(default)]
    pub session_id: Option<String>,
    /// Nur fuer `/join`: Schluessel einer bestimmten Epoch anfordern
    #[serde(default)]
    pub epoch: Option<u64>,
}

/// Antwort mit dem Schluessel einer Sitzung
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SchluesselAntwort {
    pub session_id: String,
    pub epoch: u64,
    pub key_b64: String,
    /// Gleicher Wert wie `key_b64`, fuer aeltere Clients
    pub aes_key_b64: String,
}

impl SchluesselAntwort {
    fn neu(session_id: &SessionId, epoch: u64, key_b64: String) -> Self {
        Self {
            session_id: session_id.to_string(),
            epoch,
            aes_key_b64: key_b64.clone(),
            key_b64,
        }
    }
}

fn anfrage_lesen(body: &[u8]) -> ApiResult<(SessionId, Option<u64>)> {
    let anfrage: SitzungsAnfrage =
        serde_json::from_slice(body).map_err(|_| ApiError::FehlendeSitzungsId)?;
    let roh = anfrage
        .session_id
        .filter(|id| !id.is_empty())
        .ok_or(ApiError::FehlendeSitzungsId)?;
    let session_id =
        SessionId::neu(roh).map_err(|e| ApiError::UngueltigeSitzungsId(e.to_string()))?;
    Ok((session_id, anfrage.epoch))
}

/// POST /session – Schluessel holen oder in Epoch 0 erzeugen
pub async fn sitzung_erstellen(
    State(state): State<ApiState>,
    body: Bytes,
) -> ApiResult<Json<SchluesselAntwort>> {
    let (session_id, _) = anfrage_lesen(&body)?;
    let stand = state.schluessel.hole_oder_erzeuge(&session_id)?;
    state
        .metriken
        .aktive_sitzungen
        .set(state.schluessel.anzahl() as i64);

    tracing::debug!(session = %session_id, epoch = stand.epoch, "Sitzungsschluessel ausgegeben");
    Ok(Json(SchluesselAntwort::neu(
        &session_id,
        stand.epoch,
        stand.material.als_base64(),
    )))
}

/// POST /join – Schluessel einer bestehenden Sitzung, optional fuer eine Epoch
pub async fn sitzung_beitreten(
    State(state): State<ApiState>,
    body: Bytes,
) -> ApiResult<Json<SchluesselAntwort>> {
    let (session_id, epoch) = anfrage_lesen(&body)?;
    let stand = match epoch {
        Some(epoch) => state.schluessel.schluessel_fuer_epoch(&session_id, epoch)?,
        None => state.schluessel.hole(&session_id)?,
    };
    state.schluessel.aktivitaet_melden(&session_id);

    tracing::debug!(session = %session_id, epoch = stand.epoch, "Beitritt zu Sitzung");
    Ok(Json(SchluesselAntwort::neu(
        &session_id,
        stand.epoch,
        stand.material.als_base64(),
    )))
}

/// OPTIONS – Preflight ohne CORS-Anfrage-Header, leere Antwort
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// Jede andere Methode
pub async fn methode_nicht_erlaubt() -> impl IntoResponse {
    ApiError::MethodeNichtErlaubt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anfrage_mit_epoch() {
        let (id, epoch) = anfrage_lesen(br#"{"sessionId":"demo","epoch":3}"#).unwrap();
        assert_eq!(id.as_str(), "demo");
        assert_eq!(epoch, Some(3));
    }

    #[test]
    fn fehlende_oder_leere_session_id() {
        for body in [&b""[..], b"{}", br#"{"sessionId":""}"#, b"kein json"] {
            assert!(matches!(
                anfrage_lesen(body),
                Err(ApiError::FehlendeSitzungsId)
            ));
        }
    }

    #[test]
    fn ungueltige_session_id() {
        let lang = format!(r#"{{"sessionId":"{}"}}"#, "x".repeat(500));
        assert!(matches!(
            anfrage_lesen(lang.as_bytes()),
            Err(ApiError::UngueltigeSitzungsId(_))
        ));
    }

    #[test]
    fn antwort_enthaelt_beide_schluesselfelder() {
        let id = SessionId::neu("demo").unwrap();
        let json = serde_json::to_value(SchluesselAntwort::neu(&id, 2, "QUJD".into())).unwrap();
        assert_eq!(json["sessionId"], "demo");
        assert_eq!(json["epoch"], 2);
        assert_eq!(json["keyB64"], "QUJD");
        assert_eq!(json["aesKeyB64"], "QUJD");
    }
}
