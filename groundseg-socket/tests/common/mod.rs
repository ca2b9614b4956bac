//! Scriptable WebSocket server for integration tests.
//!
//! Every accepted connection and every received frame is reported on an
//! event channel. Tests can push frames to, or close, all live connections.
//! With `echo_activity` set, each non-ping request is acknowledged by
//! broadcasting `{"activity": {"<id>": {...}}}`.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Accepted(usize),
    Frame { conn: usize, body: Value },
    Closed(usize),
}

#[derive(Debug, Clone)]
pub enum Push {
    Text(String),
    Close,
}

pub struct TestServer {
    pub url: String,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
    push: broadcast::Sender<Push>,
}

impl TestServer {
    pub async fn start(echo_activity: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (event_tx, events) = mpsc::unbounded_channel();
        let (push, _) = broadcast::channel(64);
        let connections = Arc::new(AtomicUsize::new(0));

        let push_tx = push.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let conn = connections.fetch_add(1, Ordering::SeqCst) + 1;
                let event_tx = event_tx.clone();
                let push_rx = push_tx.subscribe();
                tokio::spawn(handle_connection(stream, conn, event_tx, push_rx, echo_activity));
            }
        });

        Self { url, events, push }
    }

    /// Send a text frame to every live connection.
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.push.send(Push::Text(text.into()));
    }

    pub fn push_json(&self, value: Value) {
        self.push_text(value.to_string());
    }

    /// Close every live connection from the server side.
    pub fn close_all(&self) {
        let _ = self.push.send(Push::Close);
    }

    /// Next event, or `None` after `wait`.
    pub async fn next_event(&mut self, wait: Duration) -> Option<ServerEvent> {
        timeout(wait, self.events.recv()).await.ok().flatten()
    }

    /// Skip events until a frame arrives; returns its body.
    pub async fn next_frame(&mut self, wait: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            match self.next_event(left).await? {
                ServerEvent::Frame { body, .. } => return Some(body),
                _ => continue,
            }
        }
    }

    /// Skip events until a connection is accepted; returns its number.
    pub async fn next_accept(&mut self, wait: Duration) -> Option<usize> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            match self.next_event(left).await? {
                ServerEvent::Accepted(conn) => return Some(conn),
                _ => continue,
            }
        }
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    conn: usize,
    events: mpsc::UnboundedSender<ServerEvent>,
    mut push: broadcast::Receiver<Push>,
    echo_activity: bool,
) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut sender, mut receiver) = ws.split();
    let _ = events.send(ServerEvent::Accepted(conn));

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let body: Value = serde_json::from_str(text.as_str()).unwrap_or(Value::Null);
                    let ack = ack_for(&body, echo_activity);
                    let _ = events.send(ServerEvent::Frame { conn, body });
                    if let Some(ack) = ack {
                        if sender.send(Message::Text(ack.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            pushed = push.recv() => match pushed {
                Ok(Push::Text(text)) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(Push::Close) => {
                    let _ = sender.close().await;
                    break;
                }
                Err(_) => break,
            },
        }
    }

    let _ = events.send(ServerEvent::Closed(conn));
}

fn ack_for(body: &Value, echo_activity: bool) -> Option<Value> {
    if !echo_activity || body["category"] == json!("ping") {
        return None;
    }
    let id = body["id"].as_str()?;
    Some(json!({ "activity": { id: { "category": body["category"].clone() } } }))
}
