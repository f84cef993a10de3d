//! Message-Dispatcher – Verarbeitet dekodierte Client-Nachrichten
//!
//! Der Dispatcher kennt den Zustand der Verbindung (`Zustand`) und
//! entscheidet pro Nachricht, ob geantwortet, verteilt oder geschlossen
//! wird. Er fuehrt selbst keine IO aus; Antworten und Schliessgruende gehen
//! an die `ClientConnection` zurueck.
//!
//! ## State Machine
//! ```text
//! Ungebunden --hello--> Gebunden --(Transport-Ende | Fehler | Verdraengung)--> Geschlossen
//!      |                                                                          ^
//!      +-------------------- alles ausser hello -------------------------------->+
//! ```

use schleier_core::SessionId;
use schleier_protocol::{
    ChatNachricht, ChatWeiterleitung, ClientNachricht, FehlerCode, FrameUmschlag,
    FrameWeiterleitung, HelloAnfrage, RotationsAnfrage, RotationsMeldung, ServerNachricht,
};
use std::sync::Arc;

use crate::broadcast::{an_mitglieder_senden, SchliessGrund, SendeKanal};
use crate::registry::MitgliedHandle;
use crate::state::RelayState;

// ---------------------------------------------------------------------------
// Verbindungszustand
// ---------------------------------------------------------------------------

/// Zustand einer Relay-Verbindung
#[derive(Debug, Clone)]
pub enum Zustand {
    /// Verbunden, noch kein gueltiges `hello`
    Ungebunden,
    /// An eine Sitzung gebunden (Sitzung und Rolle sind unveraenderlich)
    Gebunden(MitgliedHandle),
    /// Terminal
    Geschlossen,
}

/// Zustand, den der Dispatcher pro Verbindung fuehrt
pub struct VerbindungsKontext {
    pub kanal: SendeKanal,
    pub zustand: Zustand,
    /// Aus `/ws?sessionId=...`; `hello.sessionId` muss dazu passen
    pub erwartete_sitzung: Option<SessionId>,
}

impl VerbindungsKontext {
    pub fn neu(kanal: SendeKanal, erwartete_sitzung: Option<SessionId>) -> Self {
        Self {
            kanal,
            zustand: Zustand::Ungebunden,
            erwartete_sitzung,
        }
    }

    pub fn ist_gebunden(&self) -> bool {
        matches!(self.zustand, Zustand::Gebunden(_))
    }
}

/// Ergebnis der Verarbeitung einer Nachricht
#[derive(Debug, PartialEq)]
pub enum Antwort {
    Keine,
    /// Nur an den Absender, ueber dessen Send-Queue
    Direkt(ServerNachricht),
    /// Verbindung schliessen
    Schliessen(SchliessGrund),
}

// ---------------------------------------------------------------------------
// MessageDispatcher
// ---------------------------------------------------------------------------

/// Verteilt Client-Nachrichten an Registry, Replay-Schutz und Schluessel-Verzeichnis
pub struct MessageDispatcher {
    state: Arc<RelayState>,
}

impl MessageDispatcher {
    pub fn neu(state: Arc<RelayState>) -> Self {
        Self { state }
    }

    /// Verarbeitet eine dekodierte Nachricht im aktuellen Verbindungszustand
    ///
    /// Eine bereits zum Schliessen markierte Verbindung (ersetzt, verdraengt,
    /// Shutdown) verarbeitet nichts mehr, auch keine noch gepufferten Frames.
    pub fn dispatch(&self, ctx: &mut VerbindungsKontext, nachricht: ClientNachricht) -> Antwort {
        if ctx.kanal.ist_geschlossen() {
            return Antwort::Keine;
        }
        let gebunden = match &ctx.zustand {
            Zustand::Gebunden(handle) => Some(handle.clone()),
            Zustand::Ungebunden => None,
            Zustand::Geschlossen => return Antwort::Keine,
        };

        let Some(handle) = gebunden else {
            return match nachricht {
                ClientNachricht::Hello(hello) => self.hello(ctx, hello),
                andere => Antwort::Schliessen(SchliessGrund::Protokoll(format!(
                    "hello erwartet, erhalten: {}",
                    andere.typ_name()
                ))),
            };
        };

        self.state.schluessel.aktivitaet_melden(&handle.session_id);
        tracing::trace!(
            session = %handle.session_id,
            client = %handle.client_id,
            typ = nachricht.typ_name(),
            "Nachricht empfangen"
        );

        match nachricht {
            ClientNachricht::Hello(_) => Antwort::Schliessen(SchliessGrund::Protokoll(
                "Verbindung ist bereits gebunden".into(),
            )),
            ClientNachricht::Metric(_) => Antwort::Direkt(ServerNachricht::Pong),
            ClientNachricht::Chat(chat) => self.chat(&handle, chat),
            ClientNachricht::Rotate(anfrage) => self.rotieren(&handle, anfrage),
            ClientNachricht::Frame(frame) => self.frame(&handle, frame),
        }
    }

    /// Beendet die Mitgliedschaft der Verbindung (idempotent)
    ///
    /// Die Replay-Fenster des Clients werden auch dann verworfen, wenn die
    /// Sitzung schon verdraengt wurde. Nur eine neuere Verbindung mit
    /// derselben Client-ID behaelt ihre Fenster.
    pub fn trennen(&self, ctx: &mut VerbindungsKontext) {
        let vorher = std::mem::replace(&mut ctx.zustand, Zustand::Geschlossen);
        if let Zustand::Gebunden(handle) = vorher {
            self.state.registry.verlassen(&handle);
            let nachfolger = self
                .state
                .registry
                .verbindung_von(&handle.session_id, &handle.client_id)
                .filter(|id| *id != handle.verbindung_id());
            if nachfolger.is_none() {
                self.state
                    .replay
                    .client_vergessen(&handle.session_id, &handle.client_id);
            }
            self.state.metriken.verbundene_clients.dec();
            tracing::info!(
                session = %handle.session_id,
                client = %handle.client_id,
                "Client getrennt"
            );
        }
    }

    // -----------------------------------------------------------------------
    // Handler
    // -----------------------------------------------------------------------

    fn hello(&self, ctx: &mut VerbindungsKontext, hello: HelloAnfrage) -> Antwort {
        if let Some(erwartet) = &ctx.erwartete_sitzung {
            if *erwartet != hello.session_id {
                return Antwort::Schliessen(SchliessGrund::Protokoll(
                    "sessionId weicht von der Verbindungs-URL ab".into(),
                ));
            }
        }

        let beitritt = match self.state.registry.beitreten(
            &hello.session_id,
            &hello.client_id,
            hello.role,
            &ctx.kanal,
        ) {
            Ok(beitritt) => beitritt,
            Err(e) => {
                tracing::warn!(
                    session = %hello.session_id,
                    client = %hello.client_id,
                    fehler = %e,
                    "hello abgelehnt"
                );
                return Antwort::Schliessen(SchliessGrund::Protokoll(e.to_string()));
            }
        };

        // Die neue Verbindung beginnt mit frischen Zaehlern
        if beitritt.ersetzt.is_some() {
            self.state
                .replay
                .client_vergessen(&hello.session_id, &hello.client_id);
        }

        self.state.schluessel.aktivitaet_melden(&hello.session_id);
        self.state.metriken.verbundene_clients.inc();
        tracing::info!(
            session = %hello.session_id,
            client = %hello.client_id,
            rolle = %hello.role,
            verbindung = %beitritt.handle.verbindung_id(),
            "Client an Sitzung gebunden"
        );

        ctx.zustand = Zustand::Gebunden(beitritt.handle);
        Antwort::Keine
    }

    fn chat(&self, handle: &MitgliedHandle, chat: ChatNachricht) -> Antwort {
        let weiter = ServerNachricht::Chat(ChatWeiterleitung {
            text: chat.text,
            client_id: handle.client_id.clone(),
            ts: chat.ts,
        });
        let Some(text) = self.state.kodieren(&weiter) else {
            return Antwort::Keine;
        };

        let ausgenommen = (!self.state.config.chat_an_absender).then(|| handle.verbindung_id());
        let mitglieder = self.state.registry.mitglieder(&handle.session_id);
        let gesendet = an_mitglieder_senden(&mitglieder, text, ausgenommen);

        self.state.metriken.chat_nachrichten.inc();
        tracing::debug!(session = %handle.session_id, empfaenger = gesendet, "Chat verteilt");
        Antwort::Keine
    }

    fn rotieren(&self, handle: &MitgliedHandle, anfrage: RotationsAnfrage) -> Antwort {
        let stand = match self.state.schluessel.rotieren(&handle.session_id) {
            Ok(stand) => stand,
            Err(e) if e.ist_nicht_gefunden() => {
                return Antwort::Direkt(ServerNachricht::fehler(
                    FehlerCode::NotFound,
                    "Fuer diese Sitzung existiert kein Schluessel",
                ));
            }
            Err(e) => {
                tracing::error!(session = %handle.session_id, fehler = %e, "Rotation fehlgeschlagen");
                return Antwort::Keine;
            }
        };

        self.state.metriken.rotationen.inc();
        tracing::info!(
            session = %handle.session_id,
            client = %handle.client_id,
            epoch = stand.epoch,
            grund = anfrage.reason.as_deref().unwrap_or("-"),
            "Rotation angefordert"
        );

        if self.state.config.rotation_melden {
            let meldung = ServerNachricht::KeyRotated(RotationsMeldung { epoch: stand.epoch });
            if let Some(text) = self.state.kodieren(&meldung) {
                let mitglieder = self.state.registry.mitglieder(&handle.session_id);
                an_mitglieder_senden(&mitglieder, text, None);
            }
        }
        Antwort::Keine
    }

    fn frame(&self, handle: &MitgliedHandle, frame: FrameUmschlag) -> Antwort {
        let entscheidung = self.state.replay.pruefen(
            &handle.session_id,
            &handle.client_id,
            frame.kind,
            frame.counter,
        );
        if !entscheidung.ist_akzeptiert() {
            self.state
                .metriken
                .frames_abgelehnt
                .with_label_values(&[entscheidung.label()])
                .inc();
            tracing::debug!(
                session = %handle.session_id,
                client = %handle.client_id,
                art = %frame.kind,
                counter = frame.counter,
                grund = entscheidung.label(),
                "Frame verworfen"
            );
            return Antwort::Keine;
        }

        let weiter = ServerNachricht::Frame(FrameWeiterleitung::neu(handle.client_id.clone(), frame));
        let Some(text) = self.state.kodieren(&weiter) else {
            return Antwort::Keine;
        };
        let mitglieder = self.state.registry.mitglieder(&handle.session_id);
        an_mitglieder_senden(&mitglieder, text, Some(handle.verbindung_id()));

        self.state.metriken.frames_weitergeleitet.inc();
        Antwort::Keine
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
