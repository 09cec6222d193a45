use std::net::SocketAddr;
use std::time::Duration;

use frames::awareness::{AwarenessMessage, PeerPresence, decode_awareness, encode_awareness};
use frames::sync::{SyncMessage, decode_sync, encode_sync, step1_frame};
use frames::{Cursor, PeerId, Shape, ShapeRecord, Tag, Version, split_frame};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::*;
use crate::config::RelayConfig;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// HELPERS
// =============================================================================

async fn spawn_relay() -> (SocketAddr, AppState) {
    let state = AppState::new(RelayConfig::default());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let addr = listener.local_addr().expect("listener addr");
    let app = crate::routes::app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("relay server failed");
    });
    (addr, state)
}

async fn next_binary(client: &mut Client) -> Vec<u8> {
    loop {
        let msg = timeout(Duration::from_secs(1), client.next())
            .await
            .expect("ws receive timed out")
            .expect("ws stream ended")
            .expect("ws receive failed");
        match msg {
            WsMessage::Binary(bytes) => return bytes.to_vec(),
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            other => panic!("unexpected ws message: {other:?}"),
        }
    }
}

/// Connect and consume the join replay up to and including Step1.
async fn join(addr: SocketAddr, path: &str) -> (Client, Vec<Vec<u8>>) {
    let (mut client, _) = connect_async(format!("ws://{addr}{path}")).await.expect("ws connect");
    let mut replayed = Vec::new();
    loop {
        let frame = next_binary(&mut client).await;
        if frame == step1_frame() {
            return (client, replayed);
        }
        replayed.push(frame);
    }
}

async fn send(client: &mut Client, frame: Vec<u8>) {
    client.send(WsMessage::Binary(frame.into())).await.expect("ws send");
}

async fn assert_silent(client: &mut Client) {
    assert!(
        timeout(Duration::from_millis(150), client.next()).await.is_err(),
        "expected no frame"
    );
}

fn update(peer: &str) -> (ShapeRecord, Vec<u8>) {
    let record = ShapeRecord::live(Uuid::new_v4(), Version::new(1, peer), Shape::rect(1.0, 2.0, 3.0, 4.0));
    let frame = encode_sync(&SyncMessage::Update(vec![record.clone()])).expect("encode update");
    (record, frame)
}

fn presence(peer: &str) -> Vec<u8> {
    encode_awareness(&AwarenessMessage::Update(PeerPresence {
        peer_id: PeerId::new(peer),
        display_name: "Brave Bear".into(),
        color: "#ef4444".into(),
        cursor: Some(Cursor { x: 4.0, y: 8.0 }),
    }))
}

// =============================================================================
// RELAY OVER A REAL SOCKET
// =============================================================================

#[tokio::test]
async fn update_reaches_peer_in_same_room() {
    let (addr, _) = spawn_relay().await;
    let (mut a, replay_a) = join(addr, "/demo").await;
    let (mut b, _) = join(addr, "/demo").await;
    assert!(replay_a.is_empty());

    let (record, frame) = update("A");
    send(&mut a, frame).await;

    let received = next_binary(&mut b).await;
    let (tag, body) = split_frame(&received).expect("split");
    assert_eq!(tag, Tag::Sync);
    assert_eq!(decode_sync(body).expect("decode").message, SyncMessage::Update(vec![record]));
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn rooms_do_not_leak_across_paths() {
    let (addr, _) = spawn_relay().await;
    let (mut a, _) = join(addr, "/room-a").await;
    let (mut b, _) = join(addr, "/room-b").await;

    send(&mut a, update("A").1).await;
    assert_silent(&mut b).await;
}

#[tokio::test]
async fn root_path_joins_default_room() {
    let (addr, state) = spawn_relay().await;
    let (mut a, _) = join(addr, "/").await;
    let (mut b, _) = join(addr, "/default").await;

    send(&mut a, update("A").1).await;
    assert_eq!(next_binary(&mut b).await.first(), Some(&frames::TAG_SYNC));
    assert_eq!(state.room_stats("default").await.map(|s| s.clients), Some(2));
}

#[tokio::test]
async fn late_joiner_gets_history_and_presence() {
    let (addr, _) = spawn_relay().await;
    let (mut a, _) = join(addr, "/demo").await;
    let (mut witness, _) = join(addr, "/demo").await;
    let (_, first) = update("A");
    let (_, second) = update("A");
    let hello = presence("A");
    send(&mut a, first.clone()).await;
    send(&mut a, second.clone()).await;
    send(&mut a, hello.clone()).await;

    // Once the witness has all three, the relay has buffered them.
    for expected in [&first, &second, &hello] {
        assert_eq!(&next_binary(&mut witness).await, expected);
    }

    let (mut late, replayed) = join(addr, "/demo").await;
    assert_eq!(replayed, vec![first, second]);
    assert_eq!(next_binary(&mut late).await, hello);
    assert_silent(&mut late).await;
}

#[tokio::test]
async fn close_broadcasts_leave_for_last_announced_peer() {
    let (addr, _) = spawn_relay().await;
    let (mut a, _) = join(addr, "/demo").await;
    let (mut b, _) = join(addr, "/demo").await;

    send(&mut a, presence("peer-a")).await;
    assert_eq!(next_binary(&mut b).await, presence("peer-a"));

    a.close(None).await.expect("close");
    let leave = next_binary(&mut b).await;
    assert_eq!(
        decode_awareness(&leave[1..]).expect("decode leave"),
        AwarenessMessage::Leave(PeerId::new("peer-a"))
    );
}

#[tokio::test]
async fn healthz_reports_ok() {
    let (addr, _) = spawn_relay().await;
    let mut stream = TcpStream::connect(addr).await.expect("tcp connect");
    stream
        .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .expect("write request");
    let mut response = String::new();
    stream.read_to_string(&mut response).await.expect("read response");
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains("\"status\":\"ok\""), "{response}");
}
