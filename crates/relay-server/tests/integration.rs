//! End-to-end relay tests using real WebSocket clients.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use relay_server::config::ServerConfig;
use relay_server::server::RelayServer;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        heartbeat_interval_secs: 0,
        ..ServerConfig::default()
    }
}

/// Boot a test server and return the WS URL + server.
async fn boot_server(config: ServerConfig) -> (String, RelayServer) {
    let server = RelayServer::new(config);
    let (addr, _handle) = server.listen().await.unwrap();
    (format!("ws://{addr}/ws"), server)
}

/// Connect and wait until the server has registered the new session.
async fn connect(url: &str, server: &RelayServer) -> WsStream {
    let before = server.registry().len();
    let (ws, _) = connect_async(url).await.unwrap();
    wait_for_count(server, before + 1).await;
    ws
}

async fn wait_for_count(server: &RelayServer, n: usize) {
    timeout(TIMEOUT, async {
        while server.registry().len() != n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("registry never reached {n} connections"));
}

/// Next data frame, skipping control frames.
async fn recv_data(ws: &mut WsStream) -> Message {
    timeout(TIMEOUT, async {
        loop {
            match ws.next().await.unwrap().unwrap() {
                msg @ (Message::Text(_) | Message::Binary(_)) => return msg,
                _ => {}
            }
        }
    })
    .await
    .unwrap()
}

/// Assert nothing arrives within a short window.
async fn assert_silent(ws: &mut WsStream) {
    let res = timeout(Duration::from_millis(200), ws.next()).await;
    assert!(res.is_err(), "unexpected frame: {res:?}");
}

#[tokio::test]
async fn binary_frame_reaches_every_other_client() {
    let (url, server) = boot_server(test_config()).await;
    let mut a = connect(&url, &server).await;
    let mut b = connect(&url, &server).await;
    let mut c = connect(&url, &server).await;

    a.send(Message::Binary(vec![0x01, 0x02].into())).await.unwrap();

    assert_eq!(recv_data(&mut b).await, Message::Binary(vec![0x01, 0x02].into()));
    assert_eq!(recv_data(&mut c).await, Message::Binary(vec![0x01, 0x02].into()));
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn text_frame_stays_text() {
    let (url, server) = boot_server(test_config()).await;
    let mut a = connect(&url, &server).await;
    let mut b = connect(&url, &server).await;

    let offer = r#"{"type":"offer","sdp":"v=0"}"#;
    a.send(Message::Text(offer.into())).await.unwrap();

    assert_eq!(recv_data(&mut b).await, Message::Text(offer.into()));
}

#[tokio::test]
async fn lone_client_receives_nothing() {
    let (url, server) = boot_server(test_config()).await;
    let mut a = connect(&url, &server).await;

    a.send(Message::Text("anyone?".into())).await.unwrap();
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn dropped_client_is_removed_and_others_keep_relaying() {
    let (url, server) = boot_server(test_config()).await;
    let mut a = connect(&url, &server).await;
    let mut b = connect(&url, &server).await;
    let mut c = connect(&url, &server).await;

    a.send(Message::Binary(vec![0x01, 0x02].into())).await.unwrap();
    assert_eq!(recv_data(&mut b).await, Message::Binary(vec![0x01, 0x02].into()));
    assert_eq!(recv_data(&mut c).await, Message::Binary(vec![0x01, 0x02].into()));

    // B vanishes without a close handshake.
    drop(b);
    wait_for_count(&server, 2).await;

    c.send(Message::Binary(vec![0xFF].into())).await.unwrap();
    // A never sees its own frame, so C's is the first to arrive.
    assert_eq!(recv_data(&mut a).await, Message::Binary(vec![0xFF].into()));
}

#[tokio::test]
async fn graceful_close_unregisters() {
    let (url, server) = boot_server(test_config()).await;
    let mut a = connect(&url, &server).await;
    let _b = connect(&url, &server).await;

    a.close(None).await.unwrap();
    wait_for_count(&server, 1).await;
}

#[tokio::test]
async fn failure_of_one_client_is_isolated() {
    let (url, server) = boot_server(test_config()).await;
    let a = connect(&url, &server).await;
    let mut b = connect(&url, &server).await;
    let mut c = connect(&url, &server).await;

    drop(a);
    wait_for_count(&server, 2).await;

    b.send(Message::Text("b->c".into())).await.unwrap();
    assert_eq!(recv_data(&mut c).await, Message::Text("b->c".into()));
    c.send(Message::Text("c->b".into())).await.unwrap();
    assert_eq!(recv_data(&mut b).await, Message::Text("c->b".into()));
}

#[tokio::test]
async fn messages_arrive_in_send_order() {
    let (url, server) = boot_server(test_config()).await;
    let mut a = connect(&url, &server).await;
    let mut b = connect(&url, &server).await;

    for i in 0..50u8 {
        a.send(Message::Binary(vec![i].into())).await.unwrap();
    }
    for i in 0..50u8 {
        assert_eq!(recv_data(&mut b).await, Message::Binary(vec![i].into()));
    }
}

#[tokio::test]
async fn connection_limit_refuses_extra_clients() {
    let (url, server) = boot_server(ServerConfig {
        max_connections: 1,
        ..test_config()
    })
    .await;
    let _a = connect(&url, &server).await;

    let err = connect_async(&url).await.unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(resp) => {
            assert_eq!(resp.status(), 503);
        }
        other => panic!("expected HTTP 503, got {other:?}"),
    }
    assert_eq!(server.registry().len(), 1);
}

#[tokio::test]
async fn oversized_message_closes_sender_only() {
    let (url, server) = boot_server(ServerConfig {
        max_message_size: 16,
        ..test_config()
    })
    .await;
    let mut a = connect(&url, &server).await;
    let mut b = connect(&url, &server).await;

    a.send(Message::Binary(vec![0u8; 64].into())).await.unwrap();
    wait_for_count(&server, 1).await;

    assert_silent(&mut b).await;
}

#[tokio::test]
async fn shutdown_sends_going_away() {
    let (url, server) = boot_server(test_config()).await;
    let mut a = connect(&url, &server).await;

    server.shutdown().shutdown();

    let frame = timeout(TIMEOUT, async {
        loop {
            match a.next().await {
                Some(Ok(Message::Close(frame))) => return frame,
                Some(Ok(_)) => {}
                other => panic!("expected close frame, got {other:?}"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(frame.map(|f| f.code), Some(CloseCode::Away));
    wait_for_count(&server, 0).await;
}

#[tokio::test]
async fn silent_client_is_disconnected() {
    let (url, server) = boot_server(ServerConfig {
        heartbeat_interval_secs: 1,
        heartbeat_timeout_secs: 1,
        ..test_config()
    })
    .await;
    let a = connect(&url, &server).await;

    // Never polling `a` means its pongs are never sent.
    timeout(Duration::from_secs(10), async {
        while server.registry().len() != 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .unwrap();
    drop(a);
}

#[tokio::test]
async fn health_reports_live_connections() {
    let (url, server) = boot_server(test_config()).await;
    let _a = connect(&url, &server).await;
    let _b = connect(&url, &server).await;

    let addr = url.trim_start_matches("ws://").trim_end_matches("/ws");
    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 2);
}
