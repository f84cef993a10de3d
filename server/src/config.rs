//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context};
use schleier_api::SchluesselApiKonfig;
use schleier_keys::KeyDirectoryConfig;
use schleier_relay::replay::MAX_FENSTER;
use schleier_relay::{DuplikatStrategie, RelayConfig};
use serde::{Deserialize, Serialize};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Schluessel-Lebenszyklus
    pub schluessel: SchluesselEinstellungen,
    /// Relay-Broker
    pub relay: RelayEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer alle Listener
    pub bind_adresse: String,
    /// Port fuer den WebSocket-Relay
    pub relay_port: u16,
    /// Port fuer die HTTP-Schluessel-API
    pub schluessel_port: u16,
    /// CORS-Origins fuer die Schluessel-API (leer = alle erlaubt)
    pub cors_origins: Vec<String>,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            relay_port: 8080,
            schluessel_port: 8081,
            cors_origins: vec![],
        }
    }
}

/// Schluessel-Lebenszyklus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchluesselEinstellungen {
    /// Sitzungen ohne Aktivitaet werden nach dieser Zeit entfernt
    pub sitzung_ttl_sek: u64,
    /// Wie lange der Schluessel der Vor-Epoch nach einer Rotation abrufbar bleibt
    pub gnadenfrist_sek: u64,
    /// Intervall des Bereinigungs-Tasks
    pub bereinigung_intervall_sek: u64,
}

impl Default for SchluesselEinstellungen {
    fn default() -> Self {
        Self {
            sitzung_ttl_sek: 30 * 60,
            gnadenfrist_sek: 10,
            bereinigung_intervall_sek: 30,
        }
    }
}

/// Relay-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayEinstellungen {
    pub send_queue_groesse: usize,
    /// Breite des Replay-Fensters (1..=64)
    pub replay_fenster: u32,
    /// Klartext-Chat auch an den Absender zurueckschicken
    pub chat_an_absender: bool,
    /// "ablehnen" oder "ersetzen"
    pub duplikat_strategie: DuplikatStrategie,
    pub keepalive_sek: u64,
    pub verbindungs_timeout_sek: u64,
    pub max_nachricht_bytes: usize,
    pub max_clients: usize,
    /// Nach einer Rotation `keyRotated` an alle Mitglieder senden
    pub rotation_melden: bool,
}

impl Default for RelayEinstellungen {
    fn default() -> Self {
        let standard = RelayConfig::default();
        Self {
            send_queue_groesse: standard.send_queue_groesse,
            replay_fenster: standard.replay_fenster,
            chat_an_absender: standard.chat_an_absender,
            duplikat_strategie: standard.duplikat_strategie,
            keepalive_sek: standard.keepalive.as_secs(),
            verbindungs_timeout_sek: standard.verbindungs_timeout.as_secs(),
            max_nachricht_bytes: standard.max_nachricht_bytes,
            max_clients: standard.max_clients,
            rotation_melden: standard.rotation_melden,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .with_context(|| format!("Konfigurationsfehler in '{pfad}'"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.pruefen()?;
        Ok(config)
    }

    /// Parst eine Konfiguration aus einem TOML-String
    pub fn aus_toml(inhalt: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(inhalt)?)
    }

    /// Prueft Wertebereiche, die serde nicht abdeckt
    pub fn pruefen(&self) -> anyhow::Result<()> {
        let relay = &self.relay;
        if relay.replay_fenster == 0 || relay.replay_fenster > MAX_FENSTER {
            bail!(
                "relay.replay_fenster muss zwischen 1 und {} liegen (ist {})",
                MAX_FENSTER,
                relay.replay_fenster
            );
        }
        if relay.send_queue_groesse == 0 {
            bail!("relay.send_queue_groesse muss groesser 0 sein");
        }
        if relay.max_clients == 0 {
            bail!("relay.max_clients muss groesser 0 sein");
        }
        if relay.max_nachricht_bytes < 1024 {
            bail!("relay.max_nachricht_bytes muss mindestens 1024 sein");
        }
        if relay.verbindungs_timeout_sek <= relay.keepalive_sek {
            bail!("relay.verbindungs_timeout_sek muss groesser als keepalive_sek sein");
        }
        if self.schluessel.sitzung_ttl_sek == 0 {
            bail!("schluessel.sitzung_ttl_sek muss groesser 0 sein");
        }
        if !schleier_observability::logging::log_level_gueltig(&self.logging.level) {
            bail!("Unbekanntes Log-Level '{}'", self.logging.level);
        }
        if !schleier_observability::logging::log_format_gueltig(&self.logging.format) {
            bail!("Unbekanntes Log-Format '{}'", self.logging.format);
        }
        // Adressen einmal parsen, damit Tippfehler beim Start auffallen
        self.relay_bind_adresse()?;
        Ok(())
    }

    fn adresse(&self, port: u16) -> anyhow::Result<SocketAddr> {
        let text = format!("{}:{}", self.netzwerk.bind_adresse, port);
        text.parse()
            .with_context(|| format!("Ungueltige Bind-Adresse '{text}'"))
    }

    /// Bind-Adresse fuer den WebSocket-Relay
    pub fn relay_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        self.adresse(self.netzwerk.relay_port)
    }

    /// Bind-Adresse fuer die HTTP-Schluessel-API
    pub fn schluessel_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        self.adresse(self.netzwerk.schluessel_port)
    }

    /// Bind-Adresse fuer den Observability-Server
    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        self.adresse(self.observability.port)
    }

    pub fn key_directory_config(&self) -> KeyDirectoryConfig {
        KeyDirectoryConfig {
            gnadenfrist: Duration::from_secs(self.schluessel.gnadenfrist_sek),
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        let relay = &self.relay;
        RelayConfig {
            send_queue_groesse: relay.send_queue_groesse,
            replay_fenster: relay.replay_fenster,
            chat_an_absender: relay.chat_an_absender,
            duplikat_strategie: relay.duplikat_strategie,
            keepalive: Duration::from_secs(relay.keepalive_sek),
            verbindungs_timeout: Duration::from_secs(relay.verbindungs_timeout_sek),
            max_nachricht_bytes: relay.max_nachricht_bytes,
            max_clients: relay.max_clients,
            rotation_melden: relay.rotation_melden,
            sitzung_ttl: Duration::from_secs(self.schluessel.sitzung_ttl_sek),
            bereinigung_intervall: Duration::from_secs(self.schluessel.bereinigung_intervall_sek),
        }
    }

    pub fn api_konfig(&self) -> anyhow::Result<SchluesselApiKonfig> {
        Ok(SchluesselApiKonfig {
            bind_addr: self.schluessel_bind_adresse()?,
            cors_origins: self.netzwerk.cors_origins.clone(),
        })
    }
}
