//! REST-Interface des Schluessel-Verzeichnisses

pub mod handlers;
pub mod routes;
pub mod server;

use std::sync::Arc;

use schleier_keys::KeyDirectory;
use schleier_observability::SchleierMetrics;

/// Axum-State fuer die Schluessel-API
#[derive(Clone)]
pub struct ApiState {
    pub schluessel: Arc<KeyDirectory>,
    pub metriken: SchleierMetrics,
}

impl ApiState {
    pub fn neu(schluessel: Arc<KeyDirectory>, metriken: SchleierMetrics) -> Self {
        Self {
            schluessel,
            metriken,
        }
    }
}
