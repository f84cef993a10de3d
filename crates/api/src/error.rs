//! Fehlertypen fuer die Schluessel-API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use schleier_keys::SchluesselError;
use serde_json::json;
use thiserror::Error;

/// Alle Fehler, die ein Handler der Schluessel-API liefern kann
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("sessionId fehlt im Request-Body")]
    FehlendeSitzungsId,

    #[error("Ungueltige sessionId: {0}")]
    UngueltigeSitzungsId(String),

    #[error("Unbekannte Sitzung: {0}")]
    NichtGefunden(String),

    #[error("Methode nicht erlaubt")]
    MethodeNichtErlaubt,

    #[error("Interner Fehler: {0}")]
    Intern(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// HTTP-Statuscode fuer REST-Fehler
    pub fn http_status(&self) -> u16 {
        match self {
            Self::FehlendeSitzungsId | Self::UngueltigeSitzungsId(_) => 400,
            Self::NichtGefunden(_) => 404,
            Self::MethodeNichtErlaubt => 405,
            Self::Intern(_) => 500,
        }
    }

    /// Fehlertext im `error`-Feld der Antwort
    ///
    /// Bestehende Browser-Clients vergleichen diese Texte, sie bleiben daher
    /// englisch und enthalten keine internen Details.
    pub fn meldung(&self) -> &'static str {
        match self {
            Self::FehlendeSitzungsId => "Missing sessionId",
            Self::UngueltigeSitzungsId(_) => "Invalid sessionId",
            Self::NichtGefunden(_) => "Unknown sessionId",
            Self::MethodeNichtErlaubt => "Method not allowed",
            Self::Intern(_) => "Internal error",
        }
    }
}

impl From<SchluesselError> for ApiError {
    fn from(e: SchluesselError) -> Self {
        match e {
            SchluesselError::NichtGefunden(id) => Self::NichtGefunden(id),
            andere => Self::Intern(andere.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Intern(details) = &self {
            tracing::error!(fehler = %details, "Interner Fehler in der Schluessel-API");
        }
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({ "error": self.meldung() }))).into_response()
    }
}
