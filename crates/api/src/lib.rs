//! schleier-api – HTTP-Schnittstelle des Schluessel-Verzeichnisses
//!
//! Endpunkte (jeweils auch unter `/api/...` erreichbar):
//! - `POST /session` – Schluessel holen oder erzeugen
//! - `POST /join`    – Schluessel einer bestehenden Sitzung abfragen
//!
//! Alle Antworten tragen CORS-Header, damit Browser-Clients von beliebigen
//! Origins zugreifen koennen.

pub mod error;
pub mod rest;

pub use error::{ApiError, ApiResult};
pub use rest::server::{api_bedienen, api_router, SchluesselApiKonfig};
pub use rest::ApiState;
