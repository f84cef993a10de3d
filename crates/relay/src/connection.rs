//! Client-Connection – Verwaltet eine einzelne WebSocket-Verbindung
//!
//! Jede Verbindung laeuft in einem eigenen tokio-Task. Die Schleife
//! multiplext eingehende Nachrichten, die eigene Send-Queue, das
//! Schliess-Signal (Verdraengung, Ueberlast, Ersetzen), den Keepalive
//! und das Shutdown-Signal.
//!
//! ## Keepalive
//! - Relay sendet alle `keepalive` einen WebSocket-Ping
//! - Kommt innerhalb von `verbindungs_timeout` nichts an, wird getrennt

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use schleier_core::{SessionId, VerbindungsId};
use schleier_protocol::{ClientNachricht, ProtokollFehler, ServerNachricht};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::broadcast::{SchliessGrund, SendeKanal};
use crate::dispatcher::{Antwort, MessageDispatcher, VerbindungsKontext};
use crate::state::{RelayState, VerbindungsPlatz};

/// WebSocket-Close-Code fuer einen Schliessgrund
fn close_code(grund: &SchliessGrund) -> u16 {
    match grund {
        SchliessGrund::Protokoll(_) => 1002,
        SchliessGrund::DoppelterClient => 1008,
        SchliessGrund::Ueberlastet => 1013,
        SchliessGrund::Shutdown => 1001,
        SchliessGrund::SitzungVerdraengt | SchliessGrund::Timeout => 1000,
    }
}

/// Verarbeitet eine einzelne WebSocket-Verbindung
pub struct ClientConnection {
    state: Arc<RelayState>,
    erwartete_sitzung: Option<SessionId>,
    _platz: VerbindungsPlatz,
}

impl ClientConnection {
    pub fn neu(
        state: Arc<RelayState>,
        erwartete_sitzung: Option<SessionId>,
        platz: VerbindungsPlatz,
    ) -> Self {
        Self {
            state,
            erwartete_sitzung,
            _platz: platz,
        }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis der Transport endet, ein Schliessgrund eintritt oder ein
    /// Shutdown-Signal eingeht.
    pub async fn verarbeiten(self, mut socket: WebSocket, mut shutdown_rx: watch::Receiver<bool>) {
        let config = Arc::clone(&self.state.config);
        let verbindung_id = VerbindungsId::new();
        let (kanal, mut empfang) = SendeKanal::neu(verbindung_id, config.send_queue_groesse);
        let mut ctx = VerbindungsKontext::neu(kanal, self.erwartete_sitzung.clone());
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));

        let takt = config.keepalive.max(Duration::from_secs(1));
        let mut keepalive = interval_at(Instant::now() + takt, takt);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut letzter_empfang = Instant::now();

        tracing::debug!(verbindung = %verbindung_id, "Neue Verbindung");

        let grund: Option<SchliessGrund> = loop {
            tokio::select! {
                // Eingehende Nachricht vom Client
                eingang = socket.recv() => {
                    let nachricht = match eingang {
                        Some(Ok(Message::Text(text))) => self.state.codec.dekodieren_text(&text),
                        Some(Ok(Message::Binary(bytes))) => self.state.codec.dekodieren_binaer(&bytes),
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                            letzter_empfang = Instant::now();
                            continue;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::debug!(verbindung = %verbindung_id, "Verbindung vom Client geschlossen");
                            break None;
                        }
                        Some(Err(e)) => {
                            tracing::debug!(verbindung = %verbindung_id, fehler = %e, "WebSocket-Lesefehler");
                            break None;
                        }
                    };
                    letzter_empfang = Instant::now();

                    match self.verarbeite_eingang(&dispatcher, &mut ctx, nachricht) {
                        Antwort::Keine => {}
                        Antwort::Direkt(antwort) => {
                            // Hinter bereits eingereihtem Fan-out
                            if let Some(text) = self.state.kodieren(&antwort) {
                                ctx.kanal.senden(text);
                            }
                        }
                        Antwort::Schliessen(grund) => break Some(grund),
                    }
                }

                // Ausgehende Nachricht aus dem Fan-out
                Some(ausgehend) = empfang.rx.recv() => {
                    if let Err(e) = socket.send(Message::Text(ausgehend.to_string())).await {
                        tracing::debug!(verbindung = %verbindung_id, fehler = %e, "Senden fehlgeschlagen");
                        break None;
                    }
                }

                // Schliess-Signal (Verdraengung, Ueberlast, Ersetzen)
                Ok(()) = empfang.schliess_rx.changed() => {
                    let signal = empfang.schliess_rx.borrow_and_update().clone();
                    if let Some(grund) = signal {
                        break Some(grund);
                    }
                }

                // Keepalive-Ping und Timeout
                _ = keepalive.tick() => {
                    if letzter_empfang.elapsed() >= config.verbindungs_timeout {
                        tracing::warn!(verbindung = %verbindung_id, "Verbindungs-Timeout");
                        break Some(SchliessGrund::Timeout);
                    }
                    if socket.send(Message::Ping(Vec::new())).await.is_err() {
                        break None;
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(verbindung = %verbindung_id, "Shutdown-Signal – Verbindung wird getrennt");
                        break Some(SchliessGrund::Shutdown);
                    }
                }
            }
        };

        // Mitgliedschaft zuerst freigeben, damit kein Fan-out mehr ankommt
        dispatcher.trennen(&mut ctx);

        let label = match &grund {
            Some(grund) => {
                self.abschied_senden(&mut socket, grund).await;
                grund.label()
            }
            None => "transport",
        };
        self.state
            .metriken
            .verbindungen_getrennt
            .with_label_values(&[label])
            .inc();

        tracing::debug!(verbindung = %verbindung_id, grund = label, "Verbindungs-Task beendet");
    }

    fn verarbeite_eingang(
        &self,
        dispatcher: &MessageDispatcher,
        ctx: &mut VerbindungsKontext,
        nachricht: Result<ClientNachricht, ProtokollFehler>,
    ) -> Antwort {
        match nachricht {
            Ok(nachricht) => dispatcher.dispatch(ctx, nachricht),
            Err(e) => {
                tracing::debug!(fehler = %e, "Ungueltige Nachricht");
                Antwort::Schliessen(SchliessGrund::Protokoll(e.to_string()))
            }
        }
    }

    async fn direkt_senden(&self, socket: &mut WebSocket, nachricht: &ServerNachricht) -> bool {
        match self.state.kodieren(nachricht) {
            Some(text) => socket.send(Message::Text(text.to_string())).await.is_ok(),
            None => true,
        }
    }

    /// Sendet den `error`-Umschlag und einen Close-Frame
    async fn abschied_senden(&self, socket: &mut WebSocket, grund: &SchliessGrund) {
        let fehler = ServerNachricht::fehler(grund.code(), grund.meldung());
        let _ = self.direkt_senden(socket, &fehler).await;
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: close_code(grund),
                reason: grund.label().into(),
            })))
            .await;
    }
}
