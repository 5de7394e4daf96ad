//! End-to-end tests against a real listener and real WebSocket clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use briefcast_bus::{BroadcastBus, InMemoryBus};
use briefcast_core::{EventRecord, EventType, SessionId, Severity, SourceAgent};
use briefcast_server::{BriefcastServer, ServerConfig};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn boot_with(config: ServerConfig) -> (SocketAddr, Arc<BriefcastServer>, Arc<InMemoryBus>) {
    let bus = Arc::new(InMemoryBus::new());
    let server = Arc::new(BriefcastServer::new(config, bus.clone(), None));
    let (addr, _handle) = server.listen().await.unwrap();
    (addr, server, bus)
}

async fn boot_server() -> (SocketAddr, Arc<BriefcastServer>, Arc<InMemoryBus>) {
    boot_with(ServerConfig::default()).await
}

async fn connect(addr: SocketAddr, session: &str) -> WsStream {
    let (ws, _) = connect_async(format!("ws://{addr}/ws/{session}"))
        .await
        .expect("connect failed");
    ws
}

/// Read the next JSON text frame, skipping anything else.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("read error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("frame is not JSON");
        }
    }
}

/// Connect and consume the `connected` frame.
async fn join(addr: SocketAddr, session: &str) -> WsStream {
    let mut ws = connect(addr, session).await;
    let frame = read_json(&mut ws).await;
    assert_eq!(frame["type"], "connected");
    ws
}

async fn send_json(ws: &mut WsStream, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

fn event(agent: SourceAgent, summary: &str) -> EventRecord {
    EventRecord::builder(EventType::Insight, agent, Severity::Warning, "incident-42")
        .summary(summary)
        .build()
        .unwrap()
}

async fn wait_until(server: &BriefcastServer, check: impl Fn(&BriefcastServer) -> bool) {
    timeout(TIMEOUT, async {
        while !check(server) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn connected_frame_comes_first() {
    let (addr, server, _bus) = boot_server().await;
    let mut ws = connect(addr, "sess-1").await;

    let frame = read_json(&mut ws).await;
    assert_eq!(frame["type"], "connected");
    assert_eq!(frame["session_id"], "sess-1");
    assert!(frame["timestamp"].is_string());

    wait_until(&server, |s| s.registry().total_connections() == 1).await;
    assert!(server.registry().has_bridge(&SessionId::from("sess-1")).await);
}

#[tokio::test]
async fn two_clients_receive_events_in_order() {
    let (addr, server, _bus) = boot_server().await;
    let mut a = join(addr, "s").await;
    let mut b = join(addr, "s").await;
    wait_until(&server, |s| s.registry().total_connections() == 2).await;

    let sid = SessionId::from("s");
    let e1 = event(SourceAgent::BurnAnalyst, "one");
    let e2 = event(SourceAgent::TrailAssessor, "two");
    assert!(server.publisher().publish(&sid, &e1).await);
    assert!(server.publisher().publish(&sid, &e2).await);

    for ws in [&mut a, &mut b] {
        let got1 = read_json(ws).await;
        let got2 = read_json(ws).await;
        assert_eq!(got1["event_id"], e1.event_id().as_str());
        assert_eq!(got2["event_id"], e2.event_id().as_str());
        assert_eq!(EventRecord::from_json(&got1.to_string()).unwrap(), e1);
    }
}

#[tokio::test]
async fn subscribe_filters_one_connection_only() {
    let (addr, server, _bus) = boot_server().await;
    let mut a = join(addr, "s").await;
    let mut b = join(addr, "s").await;
    wait_until(&server, |s| s.registry().total_connections() == 2).await;

    send_json(
        &mut a,
        serde_json::json!({"type": "subscribe", "agents": ["burn_analyst"], "event_types": []}),
    )
    .await;
    // let the read loop apply the filter
    tokio::time::sleep(Duration::from_millis(100)).await;

    let sid = SessionId::from("s");
    assert!(server.publisher().publish(&sid, &event(SourceAgent::TrailAssessor, "trail")).await);
    assert!(server.publisher().publish(&sid, &event(SourceAgent::BurnAnalyst, "burn")).await);

    assert_eq!(read_json(&mut b).await["content"]["summary"], "trail");
    assert_eq!(read_json(&mut b).await["content"]["summary"], "burn");
    // a skips the trail_assessor event entirely
    assert_eq!(read_json(&mut a).await["content"]["summary"], "burn");
}

#[tokio::test]
async fn publish_after_last_disconnect_leaks_no_bridge() {
    let (addr, server, bus) = boot_server().await;
    let mut ws = join(addr, "gone").await;
    wait_until(&server, |s| s.registry().active_bridges() == 1).await;

    ws.close(None).await.unwrap();
    drop(ws);

    wait_until(&server, |s| {
        s.registry().active_bridges() == 0 && s.registry().session_count() == 0
    })
    .await;

    let sid = SessionId::from("gone");
    assert!(server.publisher().publish(&sid, &event(SourceAgent::NepaAdvisor, "late")).await);
    assert_eq!(bus.channel_count(), 0);
    assert!(!server.registry().has_bridge(&sid).await);
}

#[tokio::test]
async fn unknown_and_malformed_frames_keep_connection_open() {
    let (addr, server, _bus) = boot_server().await;
    let mut ws = join(addr, "s").await;

    send_json(&mut ws, serde_json::json!({"type": "time_travel", "to": 1999})).await;
    ws.send(Message::Text(String::from("{{ nope").into())).await.unwrap();
    ws.send(Message::Binary(vec![0xff, 0x00].into())).await.unwrap();

    let sid = SessionId::from("s");
    assert!(server.publisher().publish(&sid, &event(SourceAgent::CruisingAssistant, "still here")).await);
    assert_eq!(read_json(&mut ws).await["content"]["summary"], "still here");
    assert_eq!(server.registry().total_connections(), 1);
}

#[tokio::test]
async fn sessions_do_not_leak_into_each_other() {
    let (addr, server, _bus) = boot_server().await;
    let mut a = join(addr, "alpha").await;
    let mut b = join(addr, "beta").await;
    wait_until(&server, |s| s.registry().session_count() == 2).await;

    assert!(
        server
            .publisher()
            .publish(&SessionId::from("beta"), &event(SourceAgent::BurnAnalyst, "beta only"))
            .await
    );
    assert!(
        server
            .publisher()
            .publish(&SessionId::from("alpha"), &event(SourceAgent::BurnAnalyst, "alpha only"))
            .await
    );

    assert_eq!(read_json(&mut b).await["content"]["summary"], "beta only");
    assert_eq!(read_json(&mut a).await["content"]["summary"], "alpha only");
}

#[tokio::test]
async fn heartbeat_pings_arrive() {
    let config = ServerConfig {
        heartbeat_interval_ms: 50,
        ..ServerConfig::default()
    };
    let (addr, _server, _bus) = boot_with(config).await;
    let mut ws = join(addr, "hb").await;

    let frame = read_json(&mut ws).await;
    assert_eq!(frame["type"], "ping");
    send_json(&mut ws, serde_json::json!({"type": "pong"})).await;
    assert_eq!(read_json(&mut ws).await["type"], "ping");
}

#[tokio::test]
async fn silent_client_is_dropped_after_pong_timeout() {
    let config = ServerConfig {
        heartbeat_interval_ms: 50,
        pong_timeout_ms: Some(120),
        ..ServerConfig::default()
    };
    let (addr, server, _bus) = boot_with(config).await;
    let _ws = join(addr, "quiet").await;
    wait_until(&server, |s| s.registry().total_connections() == 1).await;

    // never answer the pings
    wait_until(&server, |s| {
        s.registry().total_connections() == 0 && s.registry().active_bridges() == 0
    })
    .await;
}

#[tokio::test]
async fn http_publish_reaches_websocket_client() {
    let (addr, _server, _bus) = boot_server().await;
    let mut ws = join(addr, "http").await;

    let body = event(SourceAgent::RecoveryCoordinator, "from http").to_json().unwrap();
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "POST /api/sessions/http/events HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    tokio::io::AsyncWriteExt::write_all(&mut stream, request.as_bytes())
        .await
        .unwrap();
    let mut response = String::new();
    let _ = tokio::io::AsyncReadExt::read_to_string(&mut stream, &mut response)
        .await
        .unwrap();
    assert!(response.starts_with("HTTP/1.1 202"), "{response}");

    assert_eq!(read_json(&mut ws).await["content"]["summary"], "from http");
}

#[tokio::test]
async fn graceful_shutdown_closes_clients() {
    let (addr, server, bus) = boot_server().await;
    let mut ws = join(addr, "bye").await;
    wait_until(&server, |s| s.registry().total_connections() == 1).await;

    assert!(server.shutdown_gracefully(Vec::new()).await);

    let closed = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                None | Some(Err(_) | Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    assert_eq!(server.registry().active_bridges(), 0);
    assert!(bus.is_closed());
}
