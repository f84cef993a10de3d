//! Integrationstests des WebSocket-Relays mit echtem Client

mod common;

use common::{
    binden, close_code, empfangen, frame, nackter_frame, post, senden, senden_binaer,
    senden_text, server_starten, synchronisieren, verbinden, WARTEZEIT,
};
use futures_util::StreamExt;
use schleier_relay::DuplikatStrategie;
use serde_json::json;
use std::time::Duration;
use tokio_tungstenite::tungstenite::{self, Message};

#[tokio::test]
async fn ungebundene_verbindung_wird_abgelehnt() {
    let server = server_starten(|_| {}).await;
    let mut ws = verbinden(server.relay_addr, Some("demo")).await;

    senden(&mut ws, frame("media", 1)).await;
    let fehler = empfangen(&mut ws).await.unwrap();
    assert_eq!(fehler["type"], "error");
    assert_eq!(fehler["code"], "PROTOCOL_ERROR");
    assert_eq!(close_code(&mut ws).await, Some(1002));

    server.beenden().await;
}

#[tokio::test]
async fn sitzung_aus_url_muss_zu_hello_passen() {
    let server = server_starten(|_| {}).await;
    let mut ws = verbinden(server.relay_addr, Some("demo")).await;

    senden(
        &mut ws,
        json!({"type": "hello", "role": "viewer", "sessionId": "andere", "clientId": "v1"}),
    )
    .await;
    assert_eq!(empfangen(&mut ws).await.unwrap()["code"], "PROTOCOL_ERROR");

    server.beenden().await;
}

#[tokio::test]
async fn frame_erreicht_genau_die_anderen_mitglieder() {
    let server = server_starten(|_| {}).await;
    let addr = server.relay_addr;
    let mut host = verbinden(addr, Some("demo")).await;
    let mut v1 = verbinden(addr, Some("demo")).await;
    let mut v2 = verbinden(addr, Some("demo")).await;
    let mut fremd = verbinden(addr, Some("andere")).await;
    binden(&mut host, "demo", "h1", "host").await;
    binden(&mut v1, "demo", "v1", "viewer").await;
    binden(&mut v2, "demo", "v2", "viewer").await;
    binden(&mut fremd, "andere", "x1", "viewer").await;

    senden(&mut host, frame("media", 1)).await;
    for viewer in [&mut v1, &mut v2] {
        let weiter = empfangen(viewer).await.unwrap();
        assert_eq!(weiter["type"], "frame");
        assert_eq!(weiter["clientId"], "h1");
        assert_eq!(weiter["kind"], "media");
        assert_eq!(weiter["counter"], 1);
    }

    // Der Absender bekommt sein Frame nicht zurueck: als naechstes kommt das Chat-Echo
    senden(&mut host, json!({"type": "chat", "text": "hallo"})).await;
    let echo = empfangen(&mut host).await.unwrap();
    assert_eq!(echo["type"], "chat");

    // Andere Sitzungen sehen weder Frame noch Chat
    synchronisieren(&mut fremd).await;

    server.beenden().await;
}

#[tokio::test]
async fn chat_wird_mit_gebundener_client_id_gestempelt() {
    let server = server_starten(|_| {}).await;
    let mut host = verbinden(server.relay_addr, None).await;
    let mut viewer = verbinden(server.relay_addr, None).await;
    binden(&mut host, "demo", "h1", "host").await;
    binden(&mut viewer, "demo", "v1", "viewer").await;

    senden(
        &mut viewer,
        json!({"type": "chat", "text": "hi", "clientId": "gefaelscht", "ts": 1.5}),
    )
    .await;
    for ws in [&mut host, &mut viewer] {
        let chat = empfangen(ws).await.unwrap();
        assert_eq!(chat["type"], "chat");
        assert_eq!(chat["text"], "hi");
        assert_eq!(chat["clientId"], "v1");
        assert_eq!(chat["ts"], 1.5);
    }

    server.beenden().await;
}

#[tokio::test]
async fn chat_ohne_echo_an_absender() {
    let server = server_starten(|c| c.relay.chat_an_absender = false).await;
    let mut host = verbinden(server.relay_addr, None).await;
    let mut viewer = verbinden(server.relay_addr, None).await;
    binden(&mut host, "demo", "h1", "host").await;
    binden(&mut viewer, "demo", "v1", "viewer").await;

    senden(&mut host, json!({"type": "chat", "text": "eins"})).await;
    senden(&mut host, json!({"type": "metric"})).await;
    assert_eq!(empfangen(&mut viewer).await.unwrap()["text"], "eins");
    // Ohne Echo ist die naechste Nachricht fuer den Host das pong
    assert_eq!(empfangen(&mut host).await.unwrap()["type"], "pong");

    server.beenden().await;
}

#[tokio::test]
async fn doppelte_und_veraltete_frames_werden_verworfen() {
    let server = server_starten(|c| c.relay.replay_fenster = 4).await;
    let mut host = verbinden(server.relay_addr, None).await;
    let mut viewer = verbinden(server.relay_addr, None).await;
    binden(&mut host, "demo", "h1", "host").await;
    binden(&mut viewer, "demo", "v1", "viewer").await;

    for counter in [1, 2, 3, 2, 10, 5, 9, 9, 11] {
        senden(&mut host, frame("media", counter)).await;
    }
    // Ein anderer Stream hat einen eigenen Zaehlerraum
    senden(&mut host, frame("chat", 1)).await;

    let mut erhalten = Vec::new();
    for _ in 0..7 {
        let weiter = empfangen(&mut viewer).await.unwrap();
        erhalten.push((weiter["kind"].as_str().unwrap().to_string(), weiter["counter"].as_u64().unwrap()));
    }
    let media: Vec<u64> = erhalten.iter().filter(|(k, _)| k == "media").map(|(_, c)| *c).collect();
    assert_eq!(media, vec![1, 2, 3, 10, 9, 11]);
    assert!(erhalten.contains(&("chat".to_string(), 1)));

    let abgelehnt = &server.relay.metriken.frames_abgelehnt;
    assert_eq!(abgelehnt.with_label_values(&["duplikat"]).get(), 2);
    assert_eq!(abgelehnt.with_label_values(&["veraltet"]).get(), 1);

    server.beenden().await;
}

#[tokio::test]
async fn doppelter_client_wird_abgelehnt() {
    let server = server_starten(|c| c.relay.duplikat_strategie = DuplikatStrategie::Ablehnen).await;
    let mut erste = verbinden(server.relay_addr, None).await;
    binden(&mut erste, "demo", "v1", "viewer").await;

    let mut zweite = verbinden(server.relay_addr, None).await;
    senden(
        &mut zweite,
        json!({"type": "hello", "role": "viewer", "sessionId": "demo", "clientId": "v1"}),
    )
    .await;
    assert_eq!(empfangen(&mut zweite).await.unwrap()["code"], "PROTOCOL_ERROR");
    assert_eq!(close_code(&mut zweite).await, Some(1002));

    // Die bestehende Verbindung bleibt gebunden
    synchronisieren(&mut erste).await;
    assert_eq!(server.relay.registry.mitglieder_anzahl(), 1);

    server.beenden().await;
}

#[tokio::test]
async fn doppelter_client_ersetzt_alte_verbindung() {
    let server = server_starten(|c| c.relay.duplikat_strategie = DuplikatStrategie::Ersetzen).await;
    let mut host = verbinden(server.relay_addr, None).await;
    let mut alt = verbinden(server.relay_addr, None).await;
    binden(&mut host, "demo", "h1", "host").await;
    binden(&mut alt, "demo", "v1", "viewer").await;

    let mut neu = verbinden(server.relay_addr, None).await;
    binden(&mut neu, "demo", "v1", "viewer").await;

    let fehler = empfangen(&mut alt).await.unwrap();
    assert_eq!(fehler["code"], "DUPLICATE_CLIENT");
    assert_eq!(close_code(&mut alt).await, Some(1008));

    senden(&mut host, frame("media", 1)).await;
    assert_eq!(empfangen(&mut neu).await.unwrap()["counter"], 1);

    server.beenden().await;
}

#[tokio::test]
async fn rotation_wird_allen_mitgliedern_gemeldet() {
    let server = server_starten(|_| {}).await;
    let (_, vorher) = post(server.api_addr, "/session", json!({"sessionId": "demo"})).await;

    let mut host = verbinden(server.relay_addr, Some("demo")).await;
    let mut viewer = verbinden(server.relay_addr, Some("demo")).await;
    binden(&mut host, "demo", "h1", "host").await;
    binden(&mut viewer, "demo", "v1", "viewer").await;

    senden(&mut host, json!({"type": "rotate", "reason": "manuell"})).await;
    for ws in [&mut host, &mut viewer] {
        let meldung = empfangen(ws).await.unwrap();
        assert_eq!(meldung, json!({"type": "keyRotated", "epoch": 1}));
    }

    let (status, nachher) = post(server.api_addr, "/join", json!({"sessionId": "demo"})).await;
    assert_eq!(status, 200);
    assert_eq!(nachher["epoch"], 1);
    assert_ne!(nachher["keyB64"], vorher["keyB64"]);

    server.beenden().await;
}

#[tokio::test]
async fn rotation_ohne_schluessel_liefert_not_found() {
    let server = server_starten(|_| {}).await;
    let mut host = verbinden(server.relay_addr, None).await;
    binden(&mut host, "ohne-schluessel", "h1", "host").await;

    senden(&mut host, json!({"type": "rotate"})).await;
    let fehler = empfangen(&mut host).await.unwrap();
    assert_eq!(fehler["type"], "error");
    assert_eq!(fehler["code"], "NOT_FOUND");

    // Die Verbindung bleibt offen
    synchronisieren(&mut host).await;
    server.beenden().await;
}

#[tokio::test]
async fn ungueltiges_json_schliesst_die_verbindung() {
    let server = server_starten(|_| {}).await;
    let mut ws = verbinden(server.relay_addr, None).await;
    binden(&mut ws, "demo", "h1", "host").await;

    senden_text(&mut ws, "{kein json").await;
    assert_eq!(empfangen(&mut ws).await.unwrap()["code"], "PROTOCOL_ERROR");
    assert_eq!(close_code(&mut ws).await, Some(1002));

    server.beenden().await;
}

#[tokio::test]
async fn shutdown_trennt_verbundene_clients() {
    let server = server_starten(|_| {}).await;
    let mut ws = verbinden(server.relay_addr, None).await;
    binden(&mut ws, "demo", "h1", "host").await;

    let beenden = tokio::spawn(server.beenden());
    let fehler = empfangen(&mut ws).await.unwrap();
    assert_eq!(fehler["code"], "SHUTDOWN");
    assert_eq!(close_code(&mut ws).await, Some(1001));
    beenden.await.unwrap();
}

#[tokio::test]
async fn frame_ohne_type_feld_wird_weitergeleitet() {
    let server = server_starten(|_| {}).await;
    let mut host = verbinden(server.relay_addr, Some("demo")).await;
    let mut viewer = verbinden(server.relay_addr, Some("demo")).await;
    binden(&mut host, "demo", "h1", "host").await;
    binden(&mut viewer, "demo", "v1", "viewer").await;

    senden(&mut host, nackter_frame("media", 1)).await;
    senden_binaer(&mut host, nackter_frame("media", 2)).await;
    for counter in [1, 2] {
        let weiter = empfangen(&mut viewer).await.unwrap();
        assert_eq!(weiter["type"], "frame");
        assert_eq!(weiter["clientId"], "h1");
        assert_eq!(weiter["counter"], counter);
    }

    // Die Verbindung des Absenders bleibt offen
    synchronisieren(&mut host).await;
    server.beenden().await;
}

#[tokio::test]
async fn pong_kommt_nach_bereits_verteilten_frames() {
    let server = server_starten(|_| {}).await;
    let mut host = verbinden(server.relay_addr, None).await;
    let mut viewer = verbinden(server.relay_addr, None).await;
    binden(&mut host, "demo", "h1", "host").await;
    binden(&mut viewer, "demo", "v1", "viewer").await;

    for counter in 1..=3 {
        senden(&mut host, frame("chat", counter)).await;
    }
    // Danach liegen alle drei Frames in der Queue des Viewers
    synchronisieren(&mut host).await;

    senden(&mut viewer, json!({"type": "metric"})).await;
    for counter in 1..=3 {
        let weiter = empfangen(&mut viewer).await.unwrap();
        assert_eq!(weiter["type"], "frame");
        assert_eq!(weiter["counter"], counter);
    }
    assert_eq!(empfangen(&mut viewer).await.unwrap()["type"], "pong");

    server.beenden().await;
}

#[tokio::test]
async fn stummer_client_wird_nach_timeout_getrennt() {
    let server = server_starten(|c| {
        c.relay.keepalive_sek = 1;
        c.relay.verbindungs_timeout_sek = 2;
    })
    .await;
    let mut ws = verbinden(server.relay_addr, None).await;
    binden(&mut ws, "demo", "h1", "host").await;

    // Ohne Lesen beantwortet der Client keine Pings
    tokio::time::sleep(Duration::from_secs(4)).await;

    let getrennt = &server.relay.metriken.verbindungen_getrennt;
    assert_eq!(getrennt.with_label_values(&["timeout"]).get(), 1);
    assert_eq!(server.relay.registry.mitglieder_anzahl(), 0);
    assert_eq!(server.relay.metriken.verbundene_clients.get(), 0);

    // Der Client sieht nur noch Pings, den Abschied und das Ende
    let mut codes = Vec::new();
    loop {
        match tokio::time::timeout(WARTEZEIT, ws.next()).await.unwrap() {
            Some(Ok(Message::Text(text))) => {
                let nachricht: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                codes.push(nachricht["code"].as_str().unwrap_or_default().to_string());
            }
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
            Some(Ok(_)) => continue,
        }
    }
    assert!(codes.iter().all(|c| c == "TIMEOUT"), "unerwartet: {codes:?}");

    server.beenden().await;
}

#[tokio::test]
async fn verbindung_ueber_max_clients_bekommt_503() {
    let server = server_starten(|c| c.relay.max_clients = 1).await;
    let url = format!("ws://{}/ws?sessionId=demo", server.relay_addr);

    let mut erste = verbinden(server.relay_addr, Some("demo")).await;
    binden(&mut erste, "demo", "h1", "host").await;

    match tokio_tungstenite::connect_async(url.as_str()).await {
        Err(tungstenite::Error::Http(antwort)) => assert_eq!(antwort.status().as_u16(), 503),
        Err(e) => panic!("unerwarteter Fehler: {e}"),
        Ok(_) => panic!("zweite Verbindung haette abgelehnt werden muessen"),
    }

    // Nach dem Trennen ist der Platz wieder frei
    drop(erste);
    let mut frei = false;
    for _ in 0..50 {
        if let Ok((mut ws, _)) = tokio_tungstenite::connect_async(url.as_str()).await {
            binden(&mut ws, "demo", "h2", "host").await;
            frei = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(frei);

    server.beenden().await;
}
