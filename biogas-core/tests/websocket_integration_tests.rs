//! WebSocket connector against a loopback server
//!
//! These tests verify:
//! 1. Frames pushed by a real server land in the sensor snapshot
//! 2. A server-side close triggers an automatic retry that recovers
//! 3. Outbound JSON reaches the server as a text frame
//! 4. An unreachable endpoint ends up retrying, not panicking

use biogas_core::core::ConnectionStatus;
use biogas_core::data::{SensorFeed, SensorFeedConfig};
use biogas_core::resilience::BackoffConfig;
use biogas_core::testing::{batch_frame, sensor_batch};
use biogas_core::transport::WsConnector;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

fn feed_config(addr: SocketAddr) -> SensorFeedConfig {
    let mut config = SensorFeedConfig::new(format!("ws://{}/ws/dataSensor/", addr));
    config.feed.backoff = BackoffConfig::aggressive().without_jitter();
    config
}

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

#[tokio::test]
async fn test_frames_reach_snapshot() {
    let (listener, addr) = bind().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let frame = batch_frame(&sensor_batch(&[("temperatura", &[35.5, 35.7]), ("ph", &[7.1])]));
        ws.send(Message::Text(frame.into())).await.unwrap();
        // Hold the connection open until the client leaves
        while let Some(Ok(_)) = ws.next().await {}
    });

    let feed = SensorFeed::spawn(feed_config(addr), WsConnector::new());
    wait_until(|| feed.snapshot().len() == 2).await;

    let snapshot = feed.snapshot();
    let temperature: Vec<f64> = snapshot.get("temperatura").unwrap().values().collect();
    assert_eq!(temperature, vec![35.5, 35.7]);
    assert!(feed.is_connected());

    feed.shutdown().await;
}

#[tokio::test]
async fn test_server_close_triggers_retry() {
    let (listener, addr) = bind().await;

    tokio::spawn(async move {
        // First connection: accept and close right away
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.close(None).await.unwrap();
        drop(ws);

        // Second connection: deliver data
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let frame = batch_frame(&sensor_batch(&[("humedad", &[61.0])]));
        ws.send(Message::Text(frame.into())).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let feed = SensorFeed::spawn(feed_config(addr), WsConnector::new());
    wait_until(|| feed.snapshot().contains("humedad")).await;

    assert_eq!(feed.status(), ConnectionStatus::Connected);
    assert_eq!(feed.retry_count(), 0);

    feed.shutdown().await;
}

#[tokio::test]
async fn test_outbound_json_reaches_server() {
    let (listener, addr) = bind().await;
    let (received_tx, mut received_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                let _ = received_tx.send(text.to_string());
            }
        }
    });

    let feed = SensorFeed::spawn(feed_config(addr), WsConnector::new());
    wait_until(|| feed.is_connected()).await;

    feed.send_json(&serde_json::json!({"subscribe": "Biogestor"}));

    let received = tokio::time::timeout(WAIT, received_rx.recv())
        .await
        .expect("server saw no frame")
        .unwrap();
    assert_eq!(received, r#"{"subscribe":"Biogestor"}"#);

    feed.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_endpoint_retries() {
    // Bind then drop to get a port nobody listens on
    let (listener, addr) = bind().await;
    drop(listener);

    let feed = SensorFeed::spawn(feed_config(addr), WsConnector::new());
    wait_until(|| feed.retry_count() >= 2).await;

    assert!(!feed.is_connected());
    feed.shutdown().await;
}
