//! Test helpers for E2E tests.
//!
//! Provides a relay started on a random port and a raw WebSocket TestClient
//! that buffers frames so tests can wait for one message type without
//! losing the others.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use roomcast::{Config, WebServer};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a test configuration bound to a random local port.
pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config
}

/// Start a relay with the default test configuration.
pub async fn start_server() -> SocketAddr {
    start_server_with(create_test_config()).await
}

/// Start a relay with a custom configuration.
pub async fn start_server_with(config: Config) -> SocketAddr {
    let server = WebServer::new(&config).expect("Failed to create server");
    server.run_with_addr().await.expect("Failed to start server")
}

/// WebSocket URL of a started relay.
pub fn ws_url(addr: SocketAddr) -> String {
    format!("ws://{addr}/ws")
}

/// Raw protocol client.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pending: VecDeque<Value>,
    next_request_id: u64,
}

impl TestClient {
    /// Connect to the relay at the given address.
    pub async fn connect(addr: SocketAddr) -> Self {
        let (ws, _) = tokio_tungstenite::connect_async(ws_url(addr))
            .await
            .expect("Failed to connect");
        Self {
            ws,
            pending: VecDeque::new(),
            next_request_id: 1,
        }
    }

    /// Send a JSON frame.
    pub async fn send_json(&mut self, value: Value) {
        self.send_raw(&value.to_string()).await;
    }

    /// Send a raw text frame.
    pub async fn send_raw(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string()))
            .await
            .expect("Failed to send frame");
    }

    /// Send a request and wait for its acknowledgment.
    pub async fn request(&mut self, mut body: Value) -> Value {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        body["request_id"] = json!(request_id);
        self.send_json(body).await;

        loop {
            let ack = self.recv_type("ack").await;
            if ack["request_id"] == json!(request_id) {
                return ack;
            }
        }
    }

    /// Join a room and wait for the acknowledgment.
    pub async fn join(&mut self, room_id: &str, name: &str) -> Value {
        self.request(json!({
            "type": "join",
            "room_id": room_id,
            "identity": {"display_name": name, "avatar_ref": ""},
        }))
        .await
    }

    /// Send a chat message and wait for the acknowledgment.
    pub async fn message(&mut self, room_id: &str, text: &str, correlation: Value) -> Value {
        self.request(json!({
            "type": "message",
            "room_id": room_id,
            "text": text,
            "client_correlation_id": correlation,
        }))
        .await
    }

    async fn recv_frame(&mut self, deadline: Instant) -> Option<Value> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, self.ws.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => {
                    return Some(serde_json::from_str(&text).expect("Server sent invalid JSON"));
                }
                Ok(Some(Ok(_))) => continue,
                Ok(Some(Err(_))) | Ok(None) | Err(_) => return None,
            }
        }
    }

    /// Wait for the next frame of a given type, buffering the others.
    pub async fn recv_type(&mut self, ty: &str) -> Value {
        if let Some(pos) = self.pending.iter().position(|v| v["type"] == ty) {
            if let Some(value) = self.pending.remove(pos) {
                return value;
            }
        }

        let deadline = Instant::now() + DEFAULT_TIMEOUT;
        loop {
            let value = self
                .recv_frame(deadline)
                .await
                .unwrap_or_else(|| panic!("Timed out waiting for {ty}"));
            if value["type"] == ty {
                return value;
            }
            self.pending.push_back(value);
        }
    }

    /// Wait for a presence update listing `count` members.
    pub async fn recv_presence(&mut self, count: usize) -> Value {
        loop {
            let presence = self.recv_type("presence_update").await;
            if presence["members"].as_array().map(Vec::len) == Some(count) {
                return presence;
            }
        }
    }

    /// Check that no frame of a given type arrives within `window`.
    pub async fn expect_none(&mut self, ty: &str, window: Duration) -> bool {
        if self.pending.iter().any(|v| v["type"] == ty) {
            return false;
        }
        let deadline = Instant::now() + window;
        while let Some(value) = self.recv_frame(deadline).await {
            if value["type"] == ty {
                return false;
            }
            self.pending.push_back(value);
        }
        true
    }

    /// Close the connection.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
