//! Route-Definitionen fuer die Schluessel-API

use axum::{
    routing::{post, MethodRouter},
    Router,
};

use crate::rest::{handlers, ApiState};

/// Erstellt den Router mit allen Sitzungs-Endpunkten
///
/// `/api/session` und `/api/join` sind Aliase fuer aeltere Clients.
pub fn sitzungs_router() -> Router<ApiState> {
    let sitzung = || -> MethodRouter<ApiState> {
        post(handlers::sitzung_erstellen)
            .options(handlers::preflight)
            .fallback(handlers::methode_nicht_erlaubt)
    };
    let beitritt = || -> MethodRouter<ApiState> {
        post(handlers::sitzung_beitreten)
            .options(handlers::preflight)
            .fallback(handlers::methode_nicht_erlaubt)
    };

    Router::new()
        .route("/session", sitzung())
        .route("/join", beitritt())
        .route("/api/session", sitzung())
        .route("/api/join", beitritt())
}
