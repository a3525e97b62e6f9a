//! In-process mock of the hub side of the websocket API
//!
//! The hub runs on its own task. Every frame the client sends is recorded
//! (including the auth frame) and passed to a responder, whose return value
//! is written back verbatim.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use ha_client::{ConnectOptions, HassClient};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

pub const HA_VERSION: &str = "2024.1.0";
pub const TOKEN: &str = "secret-token";

/// How the mock hub treats the handshake
#[derive(Debug, Clone)]
pub enum AuthMode {
    /// Send `auth_required` and accept only this token
    Token(String),
    /// Send `auth_ok` straight away
    Open,
}

pub type Responder = Box<dyn FnMut(&Value) -> Vec<Value> + Send>;

enum Control {
    Push(Value),
    Disconnect,
}

pub struct MockHub {
    control: mpsc::UnboundedSender<Control>,
    received: mpsc::UnboundedReceiver<Value>,
}

impl MockHub {
    /// Start a hub over an in-memory pipe and connect a client to it
    pub async fn pair(
        auth: AuthMode,
        options: ConnectOptions,
        responder: Responder,
    ) -> (ha_client::ClientResult<HassClient>, MockHub) {
        let (client_io, hub_io) = tokio::io::duplex(64 * 1024);
        let hub = Self::spawn(hub_io, auth, responder);

        let (stream, _) = tokio_tungstenite::client_async("ws://hub.test/api/websocket", client_io)
            .await
            .expect("websocket upgrade over duplex");
        let client = HassClient::from_stream(stream, &options).await;
        (client, hub)
    }

    /// Connected client plus hub using token auth and the auto responder
    pub async fn connected() -> (HassClient, MockHub) {
        Self::connected_with(auto_responder()).await
    }

    pub async fn connected_with(responder: Responder) -> (HassClient, MockHub) {
        let (client, mut hub) = Self::pair(
            AuthMode::Token(TOKEN.to_string()),
            ConnectOptions::new().token(TOKEN),
            responder,
        )
        .await;
        let client = client.expect("client should authenticate");
        // Discard the auth frame
        let auth = hub.next_frame().await;
        assert_eq!(auth["type"], "auth");
        (client, hub)
    }

    /// Start a hub on a local TCP port for exercising `HassClient::connect`
    pub async fn listen(auth: AuthMode, responder: Responder) -> (MockHub, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (received_tx, received_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            if let Ok((socket, _)) = listener.accept().await {
                serve(socket, auth, responder, control_rx, received_tx).await;
            }
        });

        (
            MockHub {
                control: control_tx,
                received: received_rx,
            },
            addr,
        )
    }

    fn spawn<S>(io: S, auth: AuthMode, responder: Responder) -> MockHub
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (received_tx, received_rx) = mpsc::unbounded_channel();
        tokio::spawn(serve(io, auth, responder, control_rx, received_tx));
        MockHub {
            control: control_tx,
            received: received_rx,
        }
    }

    /// Next frame the client sent; panics after a second of silence
    pub async fn next_frame(&mut self) -> Value {
        tokio::time::timeout(Duration::from_secs(1), self.received.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("hub stopped")
    }

    /// Next frame if one arrives within `wait`
    pub async fn try_next_frame(&mut self, wait: Duration) -> Option<Value> {
        tokio::time::timeout(wait, self.received.recv())
            .await
            .ok()
            .flatten()
    }

    /// Every frame that arrives until the client goes quiet
    pub async fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Some(frame) = self.try_next_frame(Duration::from_millis(100)).await {
            frames.push(frame);
        }
        frames
    }

    /// Whether the client side of the connection goes away within `wait`
    ///
    /// Frames still arriving in the meantime are discarded.
    pub async fn closed_within(&mut self, wait: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            match tokio::time::timeout_at(deadline, self.received.recv()).await {
                Ok(Some(_)) => continue,
                Ok(None) => return true,
                Err(_) => return false,
            }
        }
    }

    /// Write a frame to the client
    pub fn push(&self, frame: Value) {
        let _ = self.control.send(Control::Push(frame));
    }

    /// Drop the connection from the hub side
    pub fn disconnect(&self) {
        let _ = self.control.send(Control::Disconnect);
    }
}

async fn serve<S>(
    io: S,
    auth: AuthMode,
    mut responder: Responder,
    mut control: mpsc::UnboundedReceiver<Control>,
    received: mpsc::UnboundedSender<Value>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let Ok(mut ws) = tokio_tungstenite::accept_async(io).await else {
        return;
    };

    match auth {
        AuthMode::Open => {
            let _ = ws.send(text(json!({"type": "auth_ok", "ha_version": HA_VERSION}))).await;
        }
        AuthMode::Token(expected) => {
            let _ = ws
                .send(text(json!({"type": "auth_required", "ha_version": HA_VERSION})))
                .await;
            let Some(frame) = next_json(&mut ws).await else {
                return;
            };
            let _ = received.send(frame.clone());
            if frame["type"] == "auth" && frame["access_token"] == expected.as_str() {
                let _ = ws.send(text(json!({"type": "auth_ok", "ha_version": HA_VERSION}))).await;
            } else {
                let _ = ws
                    .send(text(json!({"type": "auth_invalid", "message": "Invalid access token or password"})))
                    .await;
                let _ = ws.close(None).await;
                return;
            }
        }
    }

    loop {
        tokio::select! {
            frame = next_json(&mut ws) => {
                let Some(frame) = frame else { break };
                let _ = received.send(frame.clone());
                for reply in responder(&frame) {
                    if ws.send(text(reply)).await.is_err() {
                        return;
                    }
                }
            }
            ctl = control.recv() => match ctl {
                Some(Control::Push(frame)) => {
                    if ws.send(text(frame)).await.is_err() {
                        return;
                    }
                }
                Some(Control::Disconnect) | None => {
                    let _ = ws.close(None).await;
                    break;
                }
            },
        }
    }
}

async fn next_json<S>(ws: &mut tokio_tungstenite::WebSocketStream<S>) -> Option<Value>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        match ws.next().await? {
            Ok(Message::Text(body)) => return serde_json::from_str(&body).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

fn text(frame: Value) -> Message {
    Message::Text(frame.to_string())
}

/// Answers every command with an empty success, and `ping` with `pong`
pub fn auto_responder() -> Responder {
    Box::new(|frame| match frame["type"].as_str() {
        Some("ping") => vec![json!({"id": frame["id"], "type": "pong"})],
        Some(_) if frame.get("id").is_some() => vec![success(&frame["id"], Value::Null)],
        _ => vec![],
    })
}

/// Records frames but never answers
pub fn silent_responder() -> Responder {
    Box::new(|_| vec![])
}

pub fn success(id: &Value, result: Value) -> Value {
    json!({"id": id, "type": "result", "success": true, "result": result})
}

pub fn failure(id: &Value, code: &str, message: &str) -> Value {
    json!({
        "id": id,
        "type": "result",
        "success": false,
        "error": {"code": code, "message": message}
    })
}

pub fn state_json(entity_id: &str, state: &str) -> Value {
    json!({
        "entity_id": entity_id,
        "state": state,
        "attributes": {},
        "last_changed": "2024-01-01T00:00:00Z",
        "last_updated": "2024-01-01T00:00:00Z",
        "context": {"id": "01HQ0000000000000000000000", "user_id": null}
    })
}

pub fn state_changed_frame(subscription: u64, entity_id: &str, from: &str, to: &str) -> Value {
    json!({
        "id": subscription,
        "type": "event",
        "event": {
            "event_type": "state_changed",
            "data": {
                "entity_id": entity_id,
                "old_state": state_json(entity_id, from),
                "new_state": state_json(entity_id, to)
            },
            "origin": "LOCAL",
            "time_fired": "2024-01-01T00:00:00Z",
            "context": {"id": "01HQ0000000000000000000000", "user_id": null}
        }
    })
}
