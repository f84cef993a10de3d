//! Gemeinsame Helfer fuer die Integrationstests
//!
//! Startet einen vollstaendigen Server auf freien Ports und stellt einen
//! minimalen HTTP-Client sowie einen WebSocket-Client bereit.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use schleier_server::config::ServerConfig;
use schleier_server::{LaufenderServer, Server};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub const WARTEZEIT: Duration = Duration::from_secs(5);

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Startet einen Server auf 127.0.0.1 mit zufaelligen Ports
pub async fn server_starten(anpassen: impl FnOnce(&mut ServerConfig)) -> LaufenderServer {
    let mut config = ServerConfig::default();
    config.netzwerk.bind_adresse = "127.0.0.1".into();
    config.netzwerk.relay_port = 0;
    config.netzwerk.schluessel_port = 0;
    config.observability.aktiviert = false;
    anpassen(&mut config);
    Server::neu(config).binden().await.unwrap()
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Sendet eine HTTP/1.1-Anfrage und liefert Status, Header-Block und JSON-Body
pub async fn http(
    addr: SocketAddr,
    methode: &str,
    pfad: &str,
    body: &str,
    zusatz_header: &[(&str, &str)],
) -> (u16, String, Value) {
    let mut anfrage = format!(
        "{methode} {pfad} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: {}\r\n",
        body.len()
    );
    for (name, wert) in zusatz_header {
        anfrage.push_str(&format!("{name}: {wert}\r\n"));
    }
    anfrage.push_str("\r\n");
    anfrage.push_str(body);

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(anfrage.as_bytes()).await.unwrap();
    let mut antwort = Vec::new();
    tokio::time::timeout(WARTEZEIT, stream.read_to_end(&mut antwort))
        .await
        .unwrap()
        .unwrap();

    let text = String::from_utf8(antwort).unwrap();
    let (kopf, rumpf) = text.split_once("\r\n\r\n").unwrap();
    let status: u16 = kopf.split_whitespace().nth(1).unwrap().parse().unwrap();
    let json = if rumpf.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(rumpf).unwrap()
    };
    (status, kopf.to_ascii_lowercase(), json)
}

pub async fn post(addr: SocketAddr, pfad: &str, body: Value) -> (u16, Value) {
    let (status, _, json) = http(addr, "POST", pfad, &body.to_string(), &[]).await;
    (status, json)
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

pub async fn verbinden(addr: SocketAddr, session: Option<&str>) -> Ws {
    let url = match session {
        Some(s) => format!("ws://{addr}/ws?sessionId={s}"),
        None => format!("ws://{addr}/ws"),
    };
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

pub async fn senden(ws: &mut Ws, nachricht: Value) {
    senden_text(ws, &nachricht.to_string()).await;
}

pub async fn senden_text(ws: &mut Ws, text: &str) {
    ws.send(Message::text(text.to_string())).await.unwrap();
}

pub async fn senden_binaer(ws: &mut Ws, nachricht: Value) {
    ws.send(Message::binary(nachricht.to_string().into_bytes()))
        .await
        .unwrap();
}

/// Naechste Text-Nachricht als JSON; `None` bei Close oder Transport-Ende
pub async fn empfangen(ws: &mut Ws) -> Option<Value> {
    loop {
        let naechste = tokio::time::timeout(WARTEZEIT, ws.next())
            .await
            .expect("keine Nachricht innerhalb der Wartezeit");
        match naechste {
            Some(Ok(Message::Text(text))) => return Some(serde_json::from_str(text.as_str()).unwrap()),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(andere)) => panic!("unerwartete Nachricht: {andere:?}"),
        }
    }
}

/// Wartet auf den Close-Frame und liefert dessen Code
pub async fn close_code(ws: &mut Ws) -> Option<u16> {
    loop {
        let naechste = tokio::time::timeout(WARTEZEIT, ws.next())
            .await
            .expect("kein Close innerhalb der Wartezeit");
        match naechste {
            Some(Ok(Message::Close(frame))) => return frame.map(|f| u16::from(f.code)),
            Some(Ok(_)) => continue,
            None | Some(Err(_)) => return None,
        }
    }
}

/// Sendet `hello` und wartet ueber `metric`/`pong`, bis es verarbeitet ist
pub async fn binden(ws: &mut Ws, session: &str, client: &str, rolle: &str) {
    senden(
        ws,
        json!({"type": "hello", "role": rolle, "sessionId": session, "clientId": client}),
    )
    .await;
    synchronisieren(ws).await;
}

/// `metric` senden und auf `pong` warten; alles davor muss verarbeitet sein
pub async fn synchronisieren(ws: &mut Ws) {
    senden(ws, json!({"type": "metric"})).await;
    let antwort = empfangen(ws).await.expect("Verbindung unerwartet geschlossen");
    assert_eq!(antwort["type"], "pong", "unerwartet: {antwort}");
}

/// Ein Frame mit gueltiger Form und `type`-Feld
pub fn frame(art: &str, counter: u64) -> Value {
    json!({
        "type": "frame",
        "kind": art,
        "ivB64": STANDARD.encode([7u8; 12]),
        "aadB64": STANDARD.encode(format!("{art}|{counter}")),
        "payloadB64": STANDARD.encode([counter as u8; 32]),
        "counter": counter,
    })
}

/// Ein Frame als eigener Umschlag, ohne `type`-Feld
pub fn nackter_frame(art: &str, counter: u64) -> Value {
    let mut umschlag = frame(art, counter);
    if let Some(felder) = umschlag.as_object_mut() {
        felder.remove("type");
    }
    umschlag
}
